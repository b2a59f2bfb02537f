//! mqtt-base - Main Entry Point
//!
//! Runs the base agent: it connects, logs every event it receives and
//! publishes nothing on refresh. Useful for checking broker settings and as
//! a template for real agents.

use async_trait::async_trait;
use clap::Parser;
use mqtt_base::app::{run_app, AppContext, MqttApp, EXIT_FAILURE};
use mqtt_base::config::BaseConfig;
use mqtt_base::error::{error_chain, AppError};
use mqtt_base::event::Event;
use mqtt_base::observability::{init_logging, LogFormat};
use std::path::PathBuf;
use std::process;
use tracing::info;

/// Base MQTT publishing agent
#[derive(Parser)]
#[command(name = "mqtt-base")]
#[command(about = "Event-driven MQTT publishing agent core")]
#[command(version)]
struct Cli {
    /// Load all settings from a TOML file instead of the command line
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the resolved configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    #[command(flatten)]
    base: BaseConfig,
}

/// Agent that only logs what it sees
struct BaseApp;

#[async_trait]
impl MqttApp for BaseApp {
    type Event = ();

    async fn handle_event(
        &mut self,
        event: Event<()>,
        _ctx: &AppContext<'_, ()>,
    ) -> Result<(), AppError> {
        info!(event = event.kind(), "received {:?}", event);
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mqtt-base: {}", error_chain(&*e));
            process::exit(EXIT_FAILURE);
        }
    };

    if cli.print_config {
        match toml::to_string_pretty(&config) {
            Ok(rendered) => {
                print!("{rendered}");
                process::exit(0);
            }
            Err(e) => {
                eprintln!("mqtt-base: cannot render configuration: {e}");
                process::exit(EXIT_FAILURE);
            }
        }
    }

    if let Err(e) = init_logging(config.debug, LogFormat::from_env(), config.logfile.as_deref()) {
        eprintln!("mqtt-base: cannot open log file: {e}");
        process::exit(EXIT_FAILURE);
    }

    info!("Starting mqtt-base v{}", env!("CARGO_PKG_VERSION"));
    let code = run_app(BaseApp, config).await;
    info!("Application shutdown complete");
    process::exit(code);
}

fn load_configuration(cli: &Cli) -> Result<BaseConfig, Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => BaseConfig::load_from_file(path)?,
        None => cli.base.clone(),
    };
    config.validate()?;
    Ok(config)
}
