use tracing::info;

use sluice::config::{load_routes, Config};
use sluice::filters::FilterRegistry;
use sluice::routing::RouteTable;
use sluice::{Server, PKG_VERSION};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::from_env()?;

    sluice::logging::init(&config.logging);
    info!(version = PKG_VERSION, "starting sluice");
    config.log_summary();

    // Construct every route up front; a bad routes file refuses to start.
    let registry = FilterRegistry::with_builtin();
    let routes = match &config.server.routes_file {
        Some(path) => RouteTable::build(load_routes(path)?, &registry)?,
        None => RouteTable::empty(),
    };

    if routes.is_empty() {
        info!("no routes configured, every request will get 404");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let server = Server::new(config.server, routes);
        let shutdown = server.shutdown_handle();

        tokio::spawn(async move {
            wait_for_signal().await;
            info!("termination signal received");
            let _ = shutdown.send(true);
        });

        server.run().await?;
        info!("server stopped");
        Ok(())
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        // fall back to ctrl-c only
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
