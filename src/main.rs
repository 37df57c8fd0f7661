use actor_framework::tracing::setup_tracing;
use anyhow::Context;
use axum::Router;
use cafeteria_pipeline::{CafeteriaSystem, PipelineConfig};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = PipelineConfig::from_env();
    setup_tracing(&config.log_level);

    let system = CafeteriaSystem::start(config.clone())
        .await
        .context("starting pipeline")?;

    let services = [
        ("gateway", config.gateway_port, system.gateway_router()),
        ("stock-ledger", config.stock_port, system.stock_router()),
        ("kitchen", config.kitchen_port, system.kitchen_router()),
        ("notification-relay", config.notify_port, system.relay_router()),
    ];

    let (stop, stopped) = watch::channel(false);
    let mut servers = JoinSet::new();
    for (name, port, router) in services {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("binding {name} to port {port}"))?;
        info!(service = name, port, "Listening");
        servers.spawn(serve(name, listener, router, stopped.clone()));
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutdown requested");
    let _ = stop.send(true);
    while let Some(result) = servers.join_next().await {
        result.context("server task")??;
    }

    system.shutdown().await?;
    Ok(())
}

async fn serve(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    mut stopped: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = stopped.wait_for(|stop| *stop).await;
        })
        .await
        .with_context(|| format!("{name} server"))
}
