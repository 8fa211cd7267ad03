mod app;
mod auth;
mod config;
mod error;
mod extract;
mod notify;
mod response;
mod state;
#[cfg(test)]
mod testing;
mod tours;
mod visibility;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "tourbook=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = state::AppState::init().await?;
    tracing::info!(
        environment = ?state.config.environment,
        mail_webhook = state.config.mail.webhook_url.is_some(),
        "state ready"
    );

    app::serve(app::build_app(state)).await
}
