use mc_keeper::config::ManagerConfig;
use mc_keeper::orchestrator::{Notification, ServerManager};
use mc_keeper::server::{java, EngineKind, ServerConfig};
use mc_keeper::store::MemoryStore;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    tracing::info!("mc-keeper starting");

    let config = Arc::new(ManagerConfig::load()?);

    match java::detect(&config.defaults.java_path).await {
        Ok(info) if info.major < java::RECOMMENDED_JAVA_MAJOR => tracing::warn!(
            "Java {} found, Minecraft needs Java {}+",
            info.version,
            java::RECOMMENDED_JAVA_MAJOR
        ),
        Ok(info) => tracing::info!("Using Java {} at {}", info.version, config.defaults.java_path),
        Err(e) => tracing::warn!("Java check failed: {}", e),
    }

    match config.effective_empty_minutes() {
        0 => tracing::info!("Auto-shutdown disabled"),
        m => tracing::info!("Auto-shutdown after {} idle minute(s)", m),
    }

    let store = Arc::new(MemoryStore::new());
    let manager = ServerManager::new(config.clone(), store.clone());

    manager.notifications().subscribe_async(None, |n: Notification| async move {
        match n {
            Notification::ServerCrashed { server, exit_code } => {
                tracing::error!("[notify] '{}' crashed (exit code {})", server, exit_code)
            }
            other => tracing::info!("[notify] {:?}", other),
        }
    });

    // server picked by name; unknown names get a fresh record
    let name = std::env::var("MC_KEEPER_SERVER").unwrap_or_else(|_| "survival".to_string());
    let server = match store.find_by_name(&name).await {
        Some(s) => s,
        None => {
            let version = std::env::var("MC_KEEPER_VERSION").unwrap_or_else(|_| "1.20.4".to_string());
            let mut s = ServerConfig::new(&name, &version, EngineKind::Vanilla, &config.paths.servers_dir);
            s.ram_min = config.defaults.ram_min.clone();
            s.ram_max = config.defaults.ram_max.clone();
            store.insert_server(s.clone()).await;
            s
        }
    };
    manager.activate(&server.id).await?;

    manager.start().await?;
    if manager.wait_until_ready(config.timeouts.ready()).await {
        tracing::info!("Server '{}' ready on port {}", server.name, server.port);
    } else {
        tracing::warn!("Server '{}' not ready after {:?}, still waiting in background", server.name, config.timeouts.ready());
    }

    let mut phase = manager.subscribe_phase();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, stopping server");
            if let Err(e) = manager.stop(None).await {
                tracing::error!("Stop failed: {}", e);
            }
        }
        _ = phase.wait_for(|p| *p == mc_keeper::server::ServerPhase::Stopped) => {
            tracing::info!("Server process ended");
        }
    }

    tracing::info!("mc-keeper shutting down");
    Ok(())
}
