mod config;
mod db;
mod error;
mod routes;
mod services;
mod state;
mod store;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::AppConfig::from_env().expect("invalid configuration");

    let store = store::connect(&config.store)
        .await
        .expect("store init failed");
    tracing::info!(backend = config.store.kind(), "store connected");

    let state = state::AppState::new(store, config.display_offset).with_max_views(config.max_views);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.bind_addr, config.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = config.port, bind = %config.bind_addr, "reagent archive listening");
    axum::serve(listener, app).await.expect("server failed");
}
