pub mod settings;

pub use settings::{AppSettings, AuthConfig, BrokerConfig, DatabaseConfig, ServerConfig};
