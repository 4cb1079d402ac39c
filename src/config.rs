#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum, default_value = "development")]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // remote master playlist the channel directory is built from
    #[clap(long, env)]
    pub playlist_url: String,

    // local .m3u file served by the legacy /channels endpoint
    #[clap(long, env, default_value = "local.m3u")]
    pub local_playlist_path: String,

    // how long a downloaded master playlist stays valid (6h)
    #[clap(long, env, default_value = "21600")]
    pub playlist_ttl_secs: u64,

    // TTL of the proxied-response cache
    #[clap(long, env, default_value = "180")]
    pub cache_ttl_secs: u64,

    // manual redirect hop bound, chains longer than this are rejected
    #[clap(long, env, default_value = "8")]
    pub max_redirects: u32,

    // per-request upstream timeout
    #[clap(long, env, default_value = "30")]
    pub request_timeout_secs: u64,

    // the upstream gates on the Origin/Referer of its own embedding site, so
    // every outbound request carries these
    #[clap(long, env, default_value = "https://live-mirror-01.ott.tricolor.tv")]
    pub upstream_origin: String,

    #[clap(long, env, default_value = "https://live-mirror-01.ott.tricolor.tv/")]
    pub upstream_referer: String,

    #[clap(long, env, default_value = "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7")]
    pub accept_language: String,

    // used when the client sends no User-Agent of its own
    #[clap(
        long,
        env,
        default_value = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
    )]
    pub fallback_user_agent: String,

    // this should be either * for allowing everything, or a comma seperated list of domains like
    // example.com,something.com
    #[clap(long, env, default_value = "*")]
    pub cors_origin: String,
}

impl Default for AppConfig {
    // defaults aren't really needed here but it's here as a bad fallback
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            playlist_url: "http://localhost/playlist.m3u".to_string(),
            local_playlist_path: "local.m3u".to_string(),
            playlist_ttl_secs: 21600,
            cache_ttl_secs: 180,
            max_redirects: 8,
            request_timeout_secs: 30,
            upstream_origin: "https://live-mirror-01.ott.tricolor.tv".to_string(),
            upstream_referer: "https://live-mirror-01.ott.tricolor.tv/".to_string(),
            accept_language: "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            fallback_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            cors_origin: "*".to_string(),
        }
    }
}
