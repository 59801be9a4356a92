use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// Port of the HTTP surface (`/health`).
    pub port: u16,
    /// Port of the signaling WebSocket listener.
    pub ws_port: u16,
    pub workers: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebSocketConfig {
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
}

impl WebSocketConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
    pub max_age: u32,
}

impl CorsConfig {
    pub fn allow_any_origin(&self) -> bool {
        !self.enabled || self.allowed_origins.iter().any(|o| o == "*")
    }

    /// Browsers always send `Origin` on a WebSocket upgrade; native clients
    /// usually don't, and are let through.
    pub fn allows_origin(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(_) if self.allow_any_origin() => true,
            Some(origin) => self.allowed_origins.iter().any(|o| o == origin),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub websocket: WebSocketConfig,
    pub cors: CorsConfig,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Self::with_defaults(Config::builder(), "development")?
            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // E.g., `APP_SERVER__WS_PORT=5001` would set `Settings.server.ws_port`
            .add_source(Self::environment_source())
            .build()?;

        s.try_deserialize()
    }

    /// Defaults only; never reads files or the process environment.
    pub fn new_for_test() -> Result<Self, ConfigError> {
        Self::with_defaults(Config::builder(), "test")?
            .set_override("server.port", 0)?
            .set_override("server.ws_port", 0)?
            .set_override("server.workers", 1)?
            .build()?
            .try_deserialize()
    }

    fn with_defaults(
        builder: ConfigBuilder<DefaultState>,
        environment: &str,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        builder
            .set_default("environment", environment)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.ws_port", 8081)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("websocket.heartbeat_interval_secs", 30)?
            .set_default("websocket.heartbeat_timeout_secs", 40)?
            .set_default("cors.enabled", true)?
            .set_default("cors.allowed_origins", vec!["http://localhost:5173"])?
            .set_default("cors.max_age", 3600)
    }

    fn environment_source() -> Environment {
        Environment::with_prefix("app")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("cors.allowed_origins")
            .try_parsing(true)
    }

    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.ws_port)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
