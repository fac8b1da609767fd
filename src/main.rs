//! Cooling controller — main entry point.
//!
//! Builds the configuration from the command line, starts the
//! supervisor, and either runs the scripted self-test scenario
//! (`--test`) or runs interactively until Enter is pressed.

use std::io::BufRead;

use anyhow::Result;
use clap::Parser;
use log::info;

use coolloop::config::SystemConfig;
use coolloop::scenario;
use coolloop::system::CoolingSystem;

#[derive(Parser)]
#[command(name = "coolloop")]
#[command(about = "Coolant loop controller for power-electronics cooling", long_about = None)]
struct Cli {
    /// Temperature setpoint in °C (overrides the default target)
    #[arg(long)]
    setpoint: Option<f64>,

    /// Emit a per-tick status line
    #[arg(long)]
    debug: bool,

    /// Run the scripted self-test scenario, then exit
    #[arg(long)]
    test: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.debug { "debug" } else { "info" }),
    )
    .init();

    let mut config = SystemConfig::default();
    if let Some(setpoint) = cli.setpoint {
        config.temp_target = setpoint;
    }
    config.validate()?;

    info!("=== Coolant Loop Controller ===");
    info!("Temperature setpoint: {:.1}°C", config.temp_target);
    if cli.debug {
        info!("config: {}", serde_json::to_string(&config)?);
    }

    let mut system = CoolingSystem::new(config);
    system.set_debug(cli.debug);
    system.start();

    let exit_ok = if cli.test {
        info!("Running scripted scenario");
        scenario::run(&system)
    } else {
        info!("System running. Press Enter to stop.");
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        true
    };

    system.stop();
    info!("Shutdown complete. Final state: {:?}", system.state());

    if !exit_ok {
        anyhow::bail!("scenario checkpoints failed");
    }
    Ok(())
}
