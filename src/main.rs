use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ServerBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use httpconnect::adapters::{ConnectionTracker, HttpConnectHandler, MethodNotAllowed};
use httpconnect::config::AppConfig;
use httpconnect::domain::{TunnelConfig, TunnelService};
use httpconnect::ports::TrackingPort;

const NOFILE_LIMIT: u64 = 65536;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[clap(version = env!("HTTPCONNECT_VERSION"), author = env!("CARGO_PKG_AUTHORS"))]
pub struct Opts {
    /// Address to listen on
    #[clap(long, short = 'b')]
    bind: Option<String>,

    /// Seconds without traffic before a tunnel is closed, 0 disables the timeout
    #[clap(long)]
    idle_timeout: Option<u64>,

    /// Comma separated list of ports CONNECT may reach, every port when unset
    #[clap(long)]
    allowed_ports: Option<String>,

    /// Configuration file, defaults to the platform config directory
    #[clap(long, short = 'c')]
    config: Option<PathBuf>,

    /// Produce debug output
    #[clap(long, short = 'd')]
    debug: bool,
}

fn tunnel_config(opts: &Opts, app_config: &AppConfig) -> httpconnect::domain::Result<TunnelConfig> {
    let idle_timeout = opts.idle_timeout.unwrap_or(app_config.idle_timeout_secs);
    let builder = TunnelConfig::builder()
        .idle_timeout(Duration::from_secs(idle_timeout))
        .allowed_ports(app_config.allowed_ports.iter().copied());

    match &opts.allowed_ports {
        Some(csv) => Ok(builder.allowed_ports_csv(csv)?.build()),
        None => Ok(builder.build()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::parse();

    let default_level = if opts.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match rlimit::increase_nofile_limit(NOFILE_LIMIT) {
        Ok(limit) => log::debug!("Open files limit set to {}", limit),
        Err(e) => log::warn!("Unable to raise open files limit: {}", e),
    }

    let app_config = AppConfig::load(opts.config.as_deref())?;
    let config = tunnel_config(&opts, &app_config)?;
    let bind = opts.bind.clone().unwrap_or_else(|| app_config.bind.clone());

    info!(
        "Tunnels close after {:?} idle, allowed ports {:?}",
        config.idle_timeout(),
        config.allowed_ports()
    );

    let tracker = Arc::new(ConnectionTracker::new());
    tracker.start_cleanup();
    let tracker_port: Arc<dyn TrackingPort> = tracker.clone();

    let service = TunnelService::new(config, tracker_port);
    let handler = Arc::new(HttpConnectHandler::new(MethodNotAllowed, service));

    let listener = TcpListener::bind(&bind).await?;
    info!("Listening on {}", listener.local_addr()?);

    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Unable to accept connection: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let handler = handler.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let handler = handler.clone();
                async move { Ok::<_, hyper::Error>(handler.handle(req).await) }
            });

            if let Err(e) = ServerBuilder::new(TokioExecutor::new())
                .serve_connection_with_upgrades(io, service)
                .await
            {
                debug!("Error serving connection from {}: {}", remote, e);
            }
        });
    }
}
