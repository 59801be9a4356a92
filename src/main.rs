use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use interview_signal_server::{
    health_check, AppState, SessionRegistry, Settings, SignalingHub, WebSocketServer,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[actix_web::main]
async fn main() -> interview_signal_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let config = Settings::new()?;
    info!("Configuration loaded successfully ({})", config.environment);

    let (hub, hub_task) = SignalingHub::spawn(SessionRegistry::new());

    let ws_listener = tokio::net::TcpListener::bind(config.ws_addr()).await?;
    let ws_server = Arc::new(WebSocketServer::new(hub.clone(), &config));
    let ws_task = tokio::spawn(ws_server.run(ws_listener));

    let http_listener = std::net::TcpListener::bind(config.http_addr())?;
    info!("HTTP server listening on http://{}", config.http_addr());

    let state = web::Data::new(AppState::new(config.clone(), hub));
    let cors_config = config.cors.clone();

    HttpServer::new(move || {
        let cors = if cors_config.allow_any_origin() {
            Cors::default()
                .allow_any_origin()
                .allowed_methods(vec!["GET"])
        } else {
            cors_config
                .allowed_origins
                .iter()
                .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
                .allowed_methods(vec!["GET"])
        };

        App::new()
            .wrap(cors.max_age(cors_config.max_age as usize))
            .app_data(state.clone())
            .route("/health", web::get().to(health_check))
    })
    .listen(http_listener)?
    .workers(config.server.workers as usize)
    .run()
    .await?;

    info!("HTTP server stopped, shutting down signaling");
    ws_task.abort();
    hub_task.abort();

    Ok(())
}
