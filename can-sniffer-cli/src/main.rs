//! CAN Sniffer CLI Application
//!
//! This is the terminal front end for the passive CAN sniffer.
//! It uses the can-sniffer-core library and adds:
//! - TOML configuration with command-line overrides
//! - Single-character terminal commands (speed, scan, status, marks, export)
//! - Replay of a previously exported capture as the bus
//! - Text or JSON output and timestamped export files

use anyhow::{Context, Result};
use can_sniffer_core::{BusSpeed, Command, Response, Sniffer};
use clap::Parser;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

mod commands;
mod config;
mod output;
mod replay;

use commands::{CommandParser, Input, HELP};
use config::AppConfig;
use output::Printer;
use replay::ReplayTransceiver;

/// Pause between steps when nothing happened
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// CAN Sniffer - Passive CAN bus capture with speed detection
#[derive(Parser, Debug)]
#[command(name = "can-sniffer-cli")]
#[command(about = "Passive CAN bus capture, identifier statistics and speed detection", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Exported capture (CSV) to replay as the bus
    #[arg(short, long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Speed the replayed capture was recorded at (125k, 250k, 500k, 1m)
    #[arg(long, value_name = "SPEED")]
    bus_speed: Option<BusSpeed>,

    /// Initial sniffer speed (125k, 250k, 500k, 1m)
    #[arg(short, long, value_name = "SPEED")]
    speed: Option<BusSpeed>,

    /// Replay as fast as possible instead of at recorded pace
    #[arg(long)]
    fast: bool,

    /// Run speed detection before capturing
    #[arg(long)]
    scan: bool,

    /// Write the final export to this file on exit
    #[arg(short, long, value_name = "FILE")]
    export: Option<PathBuf>,

    /// Print every received frame
    #[arg(long)]
    echo: bool,

    /// Print responses as JSON
    #[arg(long)]
    json: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("CAN Sniffer CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using sniffer core v{}", can_sniffer_core::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    apply_overrides(&mut config, &args);

    let Some(replay_path) = config.replay.file.clone() else {
        println!("CAN Sniffer - No bus source specified");
        println!("\nQuick Start:");
        println!("  can-sniffer-cli --replay capture.csv --bus-speed 500k");
        println!("  can-sniffer-cli --replay capture.csv --bus-speed 500k --scan");
        println!("\nOr set [replay] file in a config file:");
        println!("  can-sniffer-cli --config config.toml");
        println!("\nUse --help for more options");
        return Ok(());
    };

    capture(&config, &replay_path, args.scan, args.export.as_deref())
}

/// Command-line flags win over file values
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(path) = &args.replay {
        config.replay.file = Some(path.clone());
    }
    if let Some(speed) = args.bus_speed {
        config.replay.bus_speed = speed;
    }
    if let Some(speed) = args.speed {
        config.sniffer.initial_speed = speed;
    }
    if args.fast {
        config.replay.realtime = false;
    }
    config.output.echo_frames |= args.echo;
    config.output.json |= args.json;
}

/// Run the capture loop until `q`, or until the replay and stdin are both done
fn capture(config: &AppConfig, replay_path: &Path, scan: bool, export: Option<&Path>) -> Result<()> {
    let transceiver =
        ReplayTransceiver::open(replay_path, config.replay.bus_speed, config.replay.realtime)?;
    let mut sniffer = Sniffer::with_monotonic_clock(config.sniffer.clone(), transceiver)
        .context("Failed to initialise CAN")?;

    let printer = Printer::new(config.output.json, config.output.echo_frames);
    let export_dir = config
        .output
        .export_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    if !config.output.json {
        println!("Passive mode: listen-only, no ACKs sent.");
        println!("{}", HELP);
    }

    if scan {
        let response = sniffer.execute(Command::RunDetection);
        println!("{}", printer.response(&response));
    }

    let lines = spawn_line_reader();
    let mut parser = CommandParser::new();
    let mut stdin_open = true;

    loop {
        let mut command = None;

        if stdin_open {
            match lines.try_recv() {
                Ok(line) => match parser.parse_line(&line) {
                    Some(Input::Command(c)) => command = Some(c),
                    Some(Input::AwaitingMark) => println!("Type annotation text and press Enter:"),
                    Some(Input::Save) => match output::save_export(&sniffer, &export_dir) {
                        Ok(path) => println!("Saved {}", path.display()),
                        Err(e) => log::error!("{:#}", e),
                    },
                    Some(Input::Help) => println!("{}", HELP),
                    Some(Input::Quit) => break,
                    None => {}
                },
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    log::debug!("Terminal input closed");
                    stdin_open = false;
                }
            }
        }

        let outcome = sniffer.step(command);

        if let Some(line) = outcome.frame.as_ref().and_then(|frame| printer.frame(frame)) {
            println!("{}", line);
        }
        if let Some(response) = &outcome.response {
            println!("{}", printer.response(response));
        }
        if let Some(status) = outcome.status {
            println!("{}", printer.response(&Response::Status(status)));
        }

        if !stdin_open && sniffer.transceiver().is_exhausted() {
            log::info!("Replay finished");
            break;
        }
        if outcome.frame.is_none() && outcome.response.is_none() {
            thread::sleep(IDLE_SLEEP);
        }
    }

    if !config.output.json {
        println!("{}", sniffer.status());
    }

    if let Some(path) = export {
        output::write_export(&sniffer, path)?;
    }

    Ok(())
}

/// Forward stdin lines to the capture loop
fn spawn_line_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    rx
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
