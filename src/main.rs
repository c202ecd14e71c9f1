use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info, warn};

mod cache;
mod config;
mod samples;
mod server;
mod watcher;

use crate::config::Config;
use crate::samples::SampleLibrary;
use crate::server::AppState;
use crate::watcher::Invalidator;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("strudel_sampler=debug".parse()?),
        )
        .init();

    info!("🎵 Iniciando Strudel Sampler v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(config.port).await;
    }

    info!("{}", config.summary());

    let library = Arc::new(SampleLibrary::new(
        &config.samples_dir,
        config.cache_ttl,
        config.cache_limit(),
        config.metadata_concurrency,
    ));

    // Hot reload: el watcher invalida la caché y avisa a /livereload
    let mut invalidator = None;
    let mut reload = None;
    if config.hot_reload {
        let (sender, _) = broadcast::channel(64);
        match Invalidator::spawn(library.clone(), sender.clone()) {
            Ok(running) => {
                if !running.is_recursive() {
                    warn!("Hot reload only sees changes in the top-level sample folder");
                }
                invalidator = Some(running);
                reload = Some(sender);
            }
            Err(e) => {
                error!("❌ Error al iniciar el watcher: {}", e);
                info!("🔄 Continuando sin hot reload - la caché expira por TTL");
            }
        }
    }

    let app = server::router(AppState {
        library,
        public_url: config.public_url.clone(),
        port: Some(config.port),
        reload,
    });

    // Único error fatal: no poder abrir el puerto
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("🚀 Servidor escuchando en http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(invalidator) = invalidator {
        invalidator.stop();
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Error al registrar Ctrl+C: {:?}", e);
        std::future::pending::<()>().await;
    }
    info!("⚠️ Señal de shutdown recibida, cerrando...");
}

/// Consulta `/stats` en el puerto local; pensado para el healthcheck de Docker.
async fn health_check(port: u16) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build health check client")?;

    let response = client
        .get(format!("http://127.0.0.1:{port}/stats"))
        .send()
        .await
        .context("Health check request failed")?
        .error_for_status()
        .context("Health check failed")?;

    println!("OK ({})", response.status());
    Ok(())
}
