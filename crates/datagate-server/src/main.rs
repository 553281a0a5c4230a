//! DataGate Server
//!
//! Multi-tenant data gateway exposing generic CRUD and query routes over
//! MongoDB, MySQL and Firestore. The tenant is chosen by the first path
//! segment under the mount prefix.
//!
//! Usage:
//! ```bash
//! # With config file
//! datagate-server --config config.yaml
//!
//! # Override the tenants file
//! datagate-server --config config.yaml --tenants ~/.datagate/tenants.json
//!
//! # Validate the tenants file without serving
//! datagate-server --tenants tenants.yaml check-tenants
//! ```
//!
//! Test with:
//! ```bash
//! curl http://localhost:3000/api/<token>/users
//!
//! curl http://localhost:3000/api/<token>/users/query \
//!   -H "Content-Type: application/json" \
//!   -d '{"method": "find", "args": [{}], "paging": {"page": 1, "limit": 10}}'
//! ```

mod app;
mod config;

use clap::{Parser, Subcommand};
use config::ServerConfig;
use datagate_config_file::FileTenantSource;
use datagate_core::TenantRegistry;
use datagate_firestore::FirestoreConnector;
use datagate_mongodb::MongoConnector;
use datagate_mysql::MySqlConnector;
use datagate_observability::Metrics;
use datagate_pool::PoolManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// DataGate Server - multi-tenant data gateway
#[derive(Parser)]
#[command(name = "datagate-server")]
#[command(about = "Multi-tenant CRUD gateway over MongoDB, MySQL and Firestore", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file (YAML or TOML)
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "DATAGATE_CONFIG",
        global = true
    )]
    config: Option<String>,

    /// Path to the tenants file, overriding `tenants_file`
    #[arg(short, long, value_name = "FILE", global = true)]
    tenants: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway (default if no command specified)
    Serve,
    /// Load and validate the tenants file, then print a summary
    CheckTenants,
}

fn init_tracing(config: &ServerConfig) -> anyhow::Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::new(format!("{}", log_level));

    // Driver chatter stays at WARN unless SQL logging is asked for
    if !config.logging.log_sql_queries {
        for directive in ["sqlx=warn", "mongodb=warn"] {
            match directive.parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => eprintln!("Failed to set log filter '{}': {}", directive, e),
            }
        }
    }

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn load_registry(path: &str) -> datagate_core::Result<TenantRegistry> {
    let source = FileTenantSource::new(path)?;
    TenantRegistry::load(&source).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(shellexpand::tilde(path).as_ref())?,
        None => ServerConfig::default(),
    };
    config.merge_env()?;
    if let Some(tenants) = cli.tenants {
        config.tenants_file = tenants;
    }

    init_tracing(&config)?;

    let registry = match load_registry(&config.tenants_file).await {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("Failed to load tenants from {}: {}", config.tenants_file, e);
            std::process::exit(1);
        }
    };

    if let Some(Commands::CheckTenants) = cli.command {
        println!("{} tenants in {}", registry.len(), config.tenants_file);
        for tenant in registry.iter() {
            println!("  {:<24} {}", tenant.display_id, tenant.backend);
        }
        return Ok(());
    }

    info!("Initializing DataGate with {} tenants", registry.len());

    let metrics = Arc::new(Metrics::new()?);
    metrics.set_tenants_registered(registry.len());

    let mongo = Arc::new(MongoConnector::new());
    let pools = Arc::new(
        PoolManager::new()
            .with_connector(mongo.clone())
            .with_connector(Arc::new(MySqlConnector::new()))
            .with_connector(Arc::new(FirestoreConnector::new()?))
            .with_metrics(metrics.clone()),
    );

    if config.eager_connect {
        info!("Eager connect enabled, connecting every tenant");
        pools.warm_up(&registry).await;
    }

    let app = app::build_app(&config, registry, pools.clone(), metrics)?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!("DataGate listening on http://{}", addr);
    info!("   Tenant routes: http://{}{}/{{token}}/...", addr, config.mount_prefix);
    info!("   Health check:       http://{}/healthz", addr);
    info!("   Readiness check:    http://{}/readyz", addr);
    info!("   Prometheus metrics: http://{}/metrics", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Closing backend connections");
    pools.shutdown().await;
    mongo.shutdown_shared().await;

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
