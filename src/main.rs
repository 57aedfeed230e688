use dataset_gateway::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Default to info, RUST_LOG overrides
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load configuration
    let config = AppConfig::load()?;
    log::info!(
        "configuration loaded: server={}:{}, default remote={}",
        config.server.host,
        config.server.port,
        config.remote.default_remote
    );

    dataset_gateway::run_server(&config).await
}
