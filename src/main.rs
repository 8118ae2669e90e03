use actix_web::{middleware::Logger, web, App, HttpServer};
use clap::Parser;
use log::{error, info};
use std::process::ExitCode;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use durability_monitor::app_state::AppState;
use durability_monitor::config::{Cli, RuntimeConfig};
use durability_monitor::monitor::prepare;
use durability_monitor::web::handlers;
use durability_monitor::logging;

#[actix_web::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log_config);

    let config = match RuntimeConfig::load(cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let monitor = match prepare(&config).await {
        Ok(monitor) => monitor,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let engine = monitor.engine.spawn(cancel.clone());
    let app_state = web::Data::new(AppState::new(monitor.status));

    let bind_addr = config.bind_addr();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(app_state.clone())
            .configure(handlers::configure)
    })
    .disable_signals()
    .bind(&bind_addr);

    let server = match server {
        Ok(server) => server.run(),
        Err(e) => {
            error!("Failed to bind {}: {}", bind_addr, e);
            cancel.cancel();
            if let Err(e) = engine.wait().await {
                error!("{}", e);
            }
            return ExitCode::FAILURE;
        }
    };
    let server_handle = server.handle();
    let mut server_task = actix_web::rt::spawn(server);
    info!("Starting web server on {}", bind_addr);

    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut server_task => {
            error!("Web server stopped unexpectedly: {:?}", result);
        }
    }

    cancel.cancel();
    let outcome = engine.wait().await;
    server_handle.stop(true).await;

    match outcome {
        Ok(()) => {
            info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Shutdown failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
