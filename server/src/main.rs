use clap::Parser;
use log::{error, info};
use server::bank::ServoBank;
use server::config::ServerArgs;
use server::network::Server;
use std::sync::Arc;
use tokio::sync::watch;

/// Parses arguments, builds the servo bank and serves until interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerArgs::parse().into_config()?;

    // No hardware bindings ship with the server; boards are simulated
    let bank = Arc::new(ServoBank::simulated(config.layout)?);

    let server = match Server::bind(&config.bind_addr, Arc::clone(&bank)).await {
        Ok(server) => server.with_accept_poll(config.accept_poll),
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    server.run(shutdown_rx).await?;
    info!("Server stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
