use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

use swiott::config::Config;
use swiott::protocol::dispatcher::{start_dispatcher, DispatcherConfig};
use swiott::protocol::session::{Session, SessionTimings};
use swiott::protocol::state::{ConnectionState, DeviceState, LogBuffer};
use swiott::transport;

mod console;

#[derive(Parser)]
#[command(name = "swiott")]
#[command(about = "Configuration and monitoring tool for SWIOTT parking sensors")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a sensor and run an interactive session
    Connect {
        /// Sensor serial to connect to (16 hex digits); overrides config
        #[arg(short, long)]
        device: Option<String>,
        /// Use a serial console on this port instead of BLE
        #[arg(short, long)]
        port: Option<String>,
    },
    /// Initialize a new configuration file
    Init,
    /// Run an interactive session with no hardware attached
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .init();

    info!("Starting swiott v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Init => {
            info!("Initializing new configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Connect { device, port } => {
            let config = load_config(&cli.config).await?;
            run_connect(config, device, port).await?;
        }
        Commands::Demo => {
            let config = load_config(&cli.config).await?;
            run_session(config, transport::demo_link(), true).await?;
        }
    }

    Ok(())
}

/// Load the config file, falling back to defaults when it does not exist yet.
/// A present-but-broken file is still an error.
async fn load_config(path: &str) -> Result<Config> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        Config::load(path).await
    } else {
        log::warn!("No config file at {}; using defaults (run 'swiott init' to create one)", path);
        Ok(Config::default())
    }
}

async fn run_connect(config: Config, device: Option<String>, port: Option<String>) -> Result<()> {
    let log = LogBuffer::shared();

    let link = match port {
        Some(port_name) => connect_serial(&config, &port_name, log.clone()).await?,
        None => connect_ble(&config, device.as_deref(), log.clone()).await?,
    };

    run_session_with_log(config, link, false, log).await
}

#[cfg(feature = "serial")]
async fn connect_serial(
    config: &Config,
    port_name: &str,
    log: swiott::protocol::state::SharedLog,
) -> Result<transport::Link> {
    transport::serial::connect(port_name, config.device.baud_rate, log).await
}

#[cfg(not(feature = "serial"))]
async fn connect_serial(
    _config: &Config,
    _port_name: &str,
    _log: swiott::protocol::state::SharedLog,
) -> Result<transport::Link> {
    anyhow::bail!("this build has no serial support (rebuild with --features serial)")
}

#[cfg(feature = "ble")]
async fn connect_ble(
    config: &Config,
    device: Option<&str>,
    log: swiott::protocol::state::SharedLog,
) -> Result<transport::Link> {
    let name = device.or_else(|| (!config.device.name.is_empty()).then_some(config.device.name.as_str()));
    let scan_timeout = std::time::Duration::from_secs(config.device.scan_timeout_secs);
    transport::ble::connect(name, scan_timeout, log).await
}

#[cfg(not(feature = "ble"))]
async fn connect_ble(
    _config: &Config,
    _device: Option<&str>,
    _log: swiott::protocol::state::SharedLog,
) -> Result<transport::Link> {
    anyhow::bail!("this build has no BLE support (rebuild with --features ble)")
}

async fn run_session(config: Config, link: transport::Link, demo: bool) -> Result<()> {
    run_session_with_log(config, link, demo, LogBuffer::shared()).await
}

async fn run_session_with_log(
    config: Config,
    link: transport::Link,
    demo: bool,
    log: swiott::protocol::state::SharedLog,
) -> Result<()> {
    let state = DeviceState::shared();
    if let Ok(mut st) = state.lock() {
        st.connection = ConnectionState::Connecting;
    }

    let dispatcher = start_dispatcher(
        DispatcherConfig { min_gap: config.session.command_gap(), demo },
        link.commands.clone(),
        log.clone(),
    );
    let timings = SessionTimings::from_config(&config.session, demo);
    let (session, handle) = Session::new(timings, dispatcher, link, state.clone(), log.clone());

    let session_task = tokio::spawn(session.run());
    console::run(handle, state, log, session_task).await
}
