//! mailpush daemon binary

use clap::Parser;
use futures::prelude::*;
use mailpush::config::DEFAULT_CONFIG_FILE;
use mailpush::delivery::r#impl::{ApnsDeliverer, ApnsEndpoint};
use mailpush::server::bind_unix_socket;
use mailpush::store::r#impl::JsonFileStore;
use mailpush::{Config, DispatchContext, Error, OutcomeHandler, PushServer, Registry, Scheduler};
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "mailpushd", version, about = "Push notification bridge between Dovecot and APNs")]
struct Cli {
    /// Configuration file
    #[arg(long, env = "MAILPUSH_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,

    /// Control socket path
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Registration database file
    #[arg(long)]
    database: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> mailpush::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path, true)?,
            None => Config::load(std::path::Path::new(DEFAULT_CONFIG_FILE), false)?,
        };
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(socket) = &self.socket {
            config.socket_path = socket.clone();
        }
        if let Some(database) = &self.database {
            config.database_file = database.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    let store = Arc::new(JsonFileStore::new(&config.database_file));
    log::info!("Loading registrations from {}", store.path().display());
    let registry = Arc::new(Registry::open(store, config.registry_flush_interval()).await?);

    let (certificate_file, key_file) = match (&config.certificate_file, &config.key_file) {
        (Some(cert), Some(key)) => (cert.clone(), key.clone()),
        _ => {
            return Err(Error::Config(
                "certificate_file and key_file must both be set".to_string(),
            )
            .into())
        }
    };
    let endpoint = if config.sandbox {
        ApnsEndpoint::Sandbox
    } else {
        ApnsEndpoint::Production
    };
    let deliverer = ApnsDeliverer::from_pem_files(
        certificate_file,
        key_file,
        config.topic().map(str::to_string),
        endpoint,
    )
    .await?;
    let topic = deliverer.topic().to_string();
    log::info!("Sending notifications for {} to {}", topic, endpoint.base_url());

    let scheduler = Arc::new(Scheduler::new(
        Arc::new(deliverer),
        OutcomeHandler::new(Arc::clone(&registry)),
        config.delay(),
    ));
    let context = DispatchContext::new(Arc::clone(&registry), Arc::clone(&scheduler), topic);
    let server = PushServer::new(context);

    let unix_listener = bind_unix_socket(&config.socket_path)?;
    let tcp_listener = match &config.listen_addr {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            log::info!("Listening on {}", addr);
            Some(listener)
        }
        None => None,
    };

    let signals = Signals::new([SIGTERM, SIGINT, SIGHUP])?;
    let handle = signals.handle();

    let mut tasks = vec![
        Arc::clone(&scheduler).spawn_sweeper(config.check_interval()),
        Arc::clone(&registry).spawn_stale_sweeper(config.stale_sweep_interval(), config.stale_max_age()),
    ];

    let server_unix = server.clone();
    tasks.push(tokio::spawn(async move {
        server_unix.listen_on_unix(unix_listener).await;
    }));

    if let Some(listener) = tcp_listener {
        let server_tcp = server.clone();
        tasks.push(tokio::spawn(async move {
            server_tcp.listen_on_tcp(listener).await;
        }));
    }

    // Wait for shutdown signal
    let mut signals = signals.fuse();
    if let Some(signal) = signals.next().await {
        let signal_name = match signal {
            SIGTERM => "SIGTERM",
            SIGINT => "SIGINT",
            SIGHUP => "SIGHUP",
            _ => "unknown signal",
        };
        log::info!("Received {}, shutting down", signal_name);
    }
    handle.close();

    for task in tasks {
        task.abort();
    }
    registry.flush().await;
    if let Err(e) = std::fs::remove_file(&config.socket_path) {
        log::warn!("Could not remove {}: {}", config.socket_path.display(), e);
    }

    log::info!("Shutdown complete");
    Ok(())
}
