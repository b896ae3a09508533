#[cfg(feature = "rest-api")]
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kube_vip_watcher::controller::{
    collect_inventory, supervise, Context, Dispatcher, KubeClusterApi, ReconnectBudget,
    WatcherConfig,
};
use kube_vip_watcher::lock::ProcessLock;
use kube_vip_watcher::logging::{init_logging, LogFormat, LoggingConfig};
use kube_vip_watcher::Error;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the watcher
    Run(RunArgs),
    /// Show version and build information
    Version,
    /// List balanced services with their priority and current holder
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Idle timeout for the pod watch in seconds (0 = API server default)
    #[arg(long, env = "WATCH_TIMEOUT_SECONDS", default_value_t = 0)]
    watch_timeout_secs: u32,

    /// Watch sessions shorter than this count as fast reconnects
    #[arg(long, env = "RECONNECT_THRESHOLD_SECONDS", default_value_t = 10)]
    reconnect_threshold_secs: u64,

    /// Consecutive fast reconnects tolerated before exiting
    #[arg(long, env = "MAX_FAST_RECONNECTS", default_value_t = 5)]
    max_fast_reconnects: u32,

    /// Log VIP moves without patching leases or services
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Name of the single-instance lock
    #[arg(long, env = "LOCK_NAME", default_value = "kube-vip-watcher")]
    lock_name: String,

    /// Run without the single-instance lock
    #[arg(long)]
    no_lock: bool,

    /// Console log format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Also write JSON logs to this file
    #[arg(long, env = "LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Also send JSON logs to this syslog server (host:port, UDP)
    #[arg(long, env = "SYSLOG_SERVER")]
    syslog_server: Option<String>,

    /// Listen address for /health and /metrics
    #[cfg(feature = "rest-api")]
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Only list services in this namespace
    #[arg(long, short)]
    namespace: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let result = match args.command {
        Commands::Version => {
            println!("kube-vip-watcher v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            println!("Git SHA: {}", env!("GIT_SHA"));
            println!("Rust Version: {}", env!("RUST_VERSION"));
            Ok(())
        }
        Commands::Info(info_args) => run_info(info_args).await,
        Commands::Run(run_args) => run_watcher(run_args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("kube-vip-watcher: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run_info(args: InfoArgs) -> Result<(), Error> {
    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;
    let api = KubeClusterApi::new(client);

    let entries = collect_inventory(&api, args.namespace.as_deref()).await?;
    println!("Balanced services: {}", entries.len());
    for entry in &entries {
        let marker = if entry.on_primary() { "*" } else { " " };
        println!("{} {}", marker, entry);
    }
    Ok(())
}

async fn run_watcher(args: RunArgs) -> Result<(), Error> {
    let _log_guard = init_logging(&LoggingConfig {
        format: args.log_format,
        file: args.log_file.clone(),
        syslog_server: args.syslog_server.clone(),
    })?;

    info!("Starting kube-vip-watcher v{}", env!("CARGO_PKG_VERSION"));

    let config = WatcherConfig {
        watch_timeout_secs: args.watch_timeout_secs,
        reconnect_threshold: Duration::from_secs(args.reconnect_threshold_secs),
        max_fast_reconnects: args.max_fast_reconnects,
        dry_run: args.dry_run,
    };
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e);
    }
    if config.dry_run {
        warn!("Dry-run mode: VIP moves are logged but not applied");
    }

    let _lock = if args.no_lock {
        warn!("Running without process lock");
        None
    } else {
        match ProcessLock::acquire(&args.lock_name) {
            Ok(lock) => Some(lock),
            Err(e) => {
                error!("Cannot start: {}", e);
                return Err(e);
            }
        }
    };

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;
    info!("Connected to Kubernetes cluster");

    #[cfg(feature = "rest-api")]
    {
        let addr = args.metrics_addr;
        tokio::spawn(async move {
            if let Err(e) = kube_vip_watcher::rest_api::run_server(addr).await {
                error!("REST API server error: {:?}", e);
            }
        });
    }

    let budget = ReconnectBudget::from_config(&config);
    let dispatcher = Dispatcher::new(Arc::new(Context::new(KubeClusterApi::new(client), config)));

    tokio::select! {
        result = supervise(budget, || dispatcher.run_session()) => match result {
            Ok(never) => match never {},
            Err(e) => {
                error!("Watcher stopped: {}", e);
                Err(e)
            }
        },
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
