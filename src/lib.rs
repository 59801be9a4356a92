pub mod config;
pub mod error;
pub mod signaling;
pub mod websocket;

use std::sync::Arc;
use actix_web::{web, HttpResponse};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use signaling::{HubHandle, HubStats, SessionRegistry, SignalingHub};
pub use websocket::WebSocketServer;

/// Health check endpoint handler
/// Returns server status, timestamp and live signaling counts
pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let stats = state.hub.stats().await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connections": stats.connections,
        "sessions": stats.sessions,
        "readySessions": stats.ready_sessions,
    })))
}

/// Application state shared with the HTTP workers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub hub: HubHandle,
}

impl AppState {
    pub fn new(config: Settings, hub: HubHandle) -> Self {
        Self {
            config: Arc::new(config),
            hub,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_state_clone() {
        let config = Settings::new_for_test().expect("Failed to load test config");
        let (hub, _task) = SignalingHub::spawn(SessionRegistry::new());
        let state = AppState::new(config, hub);

        let cloned = state.clone();

        assert!(Arc::ptr_eq(&state.config, &cloned.config));
        assert_eq!(cloned.hub.stats().await.unwrap(), HubStats::default());
    }
}
