//! Asset Server - multi-tenant image uploads with on-demand variants.
//!
//! This binary starts the HTTP server and configures all components.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use asset_server::{
    config::Config,
    directory::FileDirectory,
    server::{create_router, RouterConfig},
    storage::{OriginalStore, VariantStore},
    upload::UploadService,
    variant::{ImageRenderer, VariantService},
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    print_banner();

    let workers = config.workers();

    info!("Configuration:");
    info!("  Storage root: {}", config.root.display());
    info!("  Tenants file: {}", config.directory_file.display());
    info!("  Public URL: {}", config.base_url);
    info!(
        "  Transforms: {} worker(s), max {}px",
        workers, config.max_dimension
    );
    info!(
        "  Uploads: up to {}MB",
        config.max_upload_bytes / (1024 * 1024)
    );

    // Load tenant directory
    let directory = match FileDirectory::load(&config.directory_file) {
        Ok(directory) => directory,
        Err(e) => {
            error!("Failed to load tenant directory: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if directory.is_empty() {
        warn!(
            "Tenant directory {} lists no tenants; uploads will be refused",
            config.directory_file.display()
        );
    }

    if let Err(e) = tokio::fs::create_dir_all(&config.root).await {
        error!(
            "Failed to create storage root {}: {}",
            config.root.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    // Build services
    let variant_service = VariantService::new(
        OriginalStore::new(&config.root),
        VariantStore::new(&config.root),
        ImageRenderer::new().with_max_dimension(config.max_dimension),
        workers,
    )
    .with_max_dimension(config.max_dimension);

    let upload_service = UploadService::new(
        OriginalStore::new(&config.root),
        Arc::new(directory),
        config.base_url.clone(),
    );

    // Create router
    let router = create_router(variant_service, upload_service, build_router_config(&config));

    // Bind and serve
    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!(
        "    curl -F image=@photo.png -F userSecret=<secret> http://{}/<tenant>/upload",
        addr
    );
    info!("    curl http://{}/<tenant>/<name>.webp?w=300&h=200", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    let service = router.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, service).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Print the startup banner.
fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("");
    info!(" █████╗ ███████╗███████╗███████╗████████╗");
    info!("██╔══██╗██╔════╝██╔════╝██╔════╝╚══██╔══╝");
    info!("███████║███████╗███████╗█████╗     ██║   ");
    info!("██╔══██║╚════██║╚════██║██╔══╝     ██║   ");
    info!("██║  ██║███████║███████║███████╗   ██║   ");
    info!("╚═╝  ╚═╝╚══════╝╚══════╝╚══════╝   ╚═╝   ");
    info!("");
    info!("                 asset-server v{}", version);
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "asset_server=debug,tower_http=debug"
    } else {
        "asset_server=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_max_upload_bytes(config.max_upload_bytes);

    // Apply CORS origins
    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    // Apply tracing setting
    router_config.with_tracing(!config.no_tracing)
}
