/* Logger initialization */
use std::{panic, thread};

use tracing::{error, level_filters::LevelFilter};
use tracing_appender::non_blocking::WorkerGuard;

use crate::CargoEnv;

pub struct LoggerGuards {
    pub _tracing_guard: WorkerGuard,
}

pub struct Logger {}

impl Logger {
    pub fn init(cargo_env: CargoEnv) -> LoggerGuards {
        let file_logger = tracing_appender::rolling::daily("logs", "daily.log");
        let console_logger = std::io::stdout();

        // info in dev is plenty, debug in production is what actually gets
        // read when a stream misbehaves
        let max_level = match cargo_env {
            CargoEnv::Development => LevelFilter::INFO,
            CargoEnv::Production => LevelFilter::DEBUG,
        };

        let (non_blocking, guard) = match cargo_env {
            CargoEnv::Development => tracing_appender::non_blocking(console_logger),
            CargoEnv::Production => tracing_appender::non_blocking(file_logger),
        };

        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(max_level)
            .with(fmt_layer)
            .init();

        // panics should land in the same sink as everything else
        panic::set_hook(Box::new(|info| {
            let thread = thread::current();
            let thread = thread.name().unwrap_or("unknown");

            let msg = match info.payload().downcast_ref::<&'static str>() {
                Some(s) => *s,
                None => match info.payload().downcast_ref::<String>() {
                    Some(s) => &**s,
                    None => "Box<Any>",
                },
            };

            let backtrace = backtrace::Backtrace::new();

            match info.location() {
                Some(location) => {
                    error!(
                        target: "panic", "thread '{}' panicked at '{}': {}:{}\n{:?}",
                        thread,
                        msg,
                        location.file(),
                        location.line(),
                        backtrace
                    );
                }
                None => {
                    error!(
                        target: "panic", "thread '{}' panicked at '{}'\n{:?}",
                        thread,
                        msg,
                        backtrace
                    );
                }
            }
        }));

        LoggerGuards {
            _tracing_guard: guard,
        }
    }
}
