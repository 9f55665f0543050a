//! midifx CLI - run MIDI effect chains

use clap::{Parser, Subcommand};
use midifx::chain::run_with_restart;
use midifx::demo::{build_demo, DemoOptions};
use midifx::midi_input::list_input_ports;
use midifx::midi_output::list_output_ports;
use midifx::{ChainConfig, EventLog, RestartPolicy, RunOutcome};
use std::path::PathBuf;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "midifx")]
#[command(about = "Concurrent MIDI effect chains", long_about = None)]
struct Cli {
    /// Log every queued event
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chain described in a TOML file
    Run {
        /// Chain configuration
        config: PathBuf,
    },

    /// Run the generative feedback demo
    Demo {
        /// MIDI file with the seed phrase
        #[arg(long)]
        in_path: PathBuf,

        /// Send to this MIDI output port
        #[arg(long)]
        send: Option<String>,

        /// Write everything played to a MIDI file in this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Stop after this many logged events
        #[arg(long)]
        max_out: Option<usize>,
    },

    /// List MIDI input and output ports
    Devices,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.debug { Level::DEBUG } else { Level::INFO })
        .init();

    match cli.command {
        Commands::Run { config } => {
            let config = ChainConfig::load(&config)?;
            let log = EventLog::new();
            let policy = config.restart_policy()?;
            let outcome = run_with_restart(|| config.build(&log), policy).await?;
            report(&outcome);
        }

        Commands::Demo {
            in_path,
            send,
            out_dir,
            max_out,
        } => {
            if send.is_none() && out_dir.is_none() {
                info!("Neither --send nor --out-dir given, the demo will run silently");
            }
            let options = DemoOptions {
                in_path,
                send,
                out_dir,
                max_out,
            };
            let log = EventLog::new();
            let outcome =
                run_with_restart(|| build_demo(&options, &log), RestartPolicy::default()).await?;
            report(&outcome);
        }

        Commands::Devices => {
            println!("Inputs:");
            for name in list_input_ports()? {
                println!("  {}", name);
            }
            println!("Outputs:");
            for name in list_output_ports()? {
                println!("  {}", name);
            }
        }
    }

    Ok(())
}

fn report(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Interrupted => info!("Interrupted"),
        RunOutcome::Stopped(reason) => info!("Stopped: {}", reason),
        RunOutcome::Finished => info!("All nodes finished"),
    }
}
