pub mod channels_controller;
pub mod health_controller;
pub mod proxy_controller;

pub use channels_controller::ChannelsController;
pub use health_controller::HealthController;
pub use proxy_controller::ProxyController;
