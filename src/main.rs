use netguard_lib::config::EnvConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("panic in netguard: {info}");
        default_hook(info);
    }));

    let env = EnvConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| env.log_level.clone().into()))
        .init();

    let config_path = PathBuf::from("./netguard.config.yaml");
    let (router, mut supervisor) = netguard_lib::bootstrap(env.clone(), config_path).await?;

    let addr = format!("{}:{}", env.backend_host, env.backend_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "netguard listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    };

    axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;

    supervisor.stop();
    Ok(())
}
