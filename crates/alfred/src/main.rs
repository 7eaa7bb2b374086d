use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use alfred::api;
use alfred::config::Config;
use alfred::device::DeviceClass;
use alfred::device::Registry;
use alfred::device::Services;
use alfred::dispatch::DispatchRequest;
use alfred::dispatch::Dispatcher;
use alfred::dispatch::Status;
use clap::Parser;
use clap::Subcommand;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "alfred", version, about = "Local network smart-home device control")]
struct Cli {
    /// Config file (defaults to alfred.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API server
    Serve {
        /// Address to bind, overriding [api].listen
        #[arg(long)]
        listen: Option<String>,
        /// Port to bind, overriding [api].port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a single device action and print the response
    Action {
        /// outlet or light
        class: DeviceClass,
        brand: String,
        id: String,
        action: String,
        /// JSON body forwarded to the device
        #[arg(long)]
        payload: Option<String>,
        /// Bridge application key
        #[arg(long)]
        key: Option<String>,
        /// Bridge host for lights
        #[arg(long)]
        bridge: Option<String>,
    },
    /// Sweep the configured subnet for outlets
    Discover {
        #[arg(long, default_value = "kasa")]
        brand: String,
        /// Repeat the sweep every N seconds until Ctrl+C
        #[arg(long)]
        every: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(config.logging.filter())
        .init();

    match &cli.config {
        Some(path) => tracing::debug!("Loaded config from: {}", path.display()),
        None => tracing::debug!("Using default config location"),
    }

    let dispatcher = Dispatcher::new(Registry::new(Services::from_config(&config)?));

    match cli.command {
        Command::Serve { listen, port } => {
            let listen = listen.unwrap_or_else(|| config.api.listen.clone());
            let port = port.unwrap_or(config.api.port);
            serve(listen, port, dispatcher).await
        }
        Command::Action {
            class,
            brand,
            id,
            action,
            payload,
            key,
            bridge,
        } => {
            let mut request = DispatchRequest::new(class, brand, id, action);
            request.payload = payload.map(String::into_bytes);
            request.credential = key;
            request.bridge = bridge;

            let response = dispatcher.dispatch(request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if response.status == Status::Error {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Discover { brand, every } => discover(&dispatcher, &brand, every).await,
    }
}

async fn serve(listen: String, port: u16, dispatcher: Dispatcher) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let mut server =
        tokio::spawn(async move { api::serve(&listen, port, dispatcher, shutdown_rx).await });

    tracing::info!("alfred started, press Ctrl+C to exit");

    tokio::select! {
        result = &mut server => return result?,
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => tracing::info!("Received shutdown signal"),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        },
    }

    let _ = shutdown_tx.send(());
    server.await??;

    tracing::info!("alfred shutdown complete");
    Ok(())
}

async fn discover(dispatcher: &Dispatcher, brand: &str, every: Option<u64>) -> anyhow::Result<()> {
    let request = DispatchRequest::new(DeviceClass::Outlet, brand, "", "discover");

    let Some(secs) = every else {
        let response = dispatcher.dispatch(request).await;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        tracing::info!("Received shutdown signal");
    };
    repeat_until(Duration::from_secs(secs.max(1)), shutdown, || {
        let request = request.clone();
        async move {
            let response = dispatcher.dispatch(request).await;
            println!("{}", serde_json::to_string(&response)?);
            anyhow::Ok(())
        }
    })
    .await
}

/// Run `job` once per `period` until `shutdown` completes. A job still
/// running at shutdown is cancelled.
async fn repeat_until<F, Fut>(
    period: Duration,
    shutdown: impl Future<Output = ()>,
    mut job: F,
) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let mut interval = tokio::time::interval(period);
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            result = async {
                interval.tick().await;
                job().await
            } => result?,
        }
    }
}
