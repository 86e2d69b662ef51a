use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use thatsapp_debugger::config::{self, ConsoleConfig};
use thatsapp_debugger::console::{self, Command, Console};
use thatsapp_debugger::mqtt::{RumqttConnector, Session};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "thatsapp-debugger",
    about = "Watch and poke ThatsApp traffic on an MQTT broker",
    version
)]
struct Cli {
    #[arg(long, env = "THATSAPP_DEBUGGER_CONFIG", help = "Config file to use")]
    config: Option<PathBuf>,

    #[arg(long, help = "Broker WebSocket URL, overrides the config file")]
    broker: Option<String>,

    #[arg(long, help = "MQTT client ID, generated when unset")]
    client_id: Option<String>,

    #[arg(long, help = "Connect right after startup")]
    connect: bool,

    #[arg(long, short = 'v', help = "Log at debug level")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(cli.verbose)?;

    let config_path = cli.config.clone().unwrap_or_else(config::default_path);
    info!("Using config file {}", config_path.display());
    let mut config = ConsoleConfig::load_or_init(&config_path).await?;
    apply_overrides(&mut config, &cli);

    let (session, events) = Session::new(RumqttConnector, config.session.clone());
    let auto_connect = config.broker.auto_connect;
    let mut console = Console::new(session, config);

    if auto_connect {
        if let console::Flow::Continue(out) = console.execute(Command::Connect {
            url: None,
            client_id: None,
        }) {
            out.iter().for_each(|line| println!("{line}"));
        }
    }

    console::run(console, events).await?;
    info!("Bye");
    Ok(())
}

fn apply_overrides(config: &mut ConsoleConfig, cli: &Cli) {
    if let Some(broker) = &cli.broker {
        config.broker.url = Some(broker.clone());
    }
    if let Some(client_id) = &cli.client_id {
        config.broker.client_id = Some(client_id.clone());
    }
    if cli.connect {
        config.broker.auto_connect = true;
    }
}

fn setup(verbose: bool) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env(if verbose { Level::DEBUG } else { Level::INFO });
    Ok(())
}

fn setup_logging_env(level: Level) {
    // stdout belongs to the console
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();
}
