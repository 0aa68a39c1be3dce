//! Interactive console for the simulated IR learning station
//!
//! Reads one command per line from stdin and prints replies to stdout.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use irlearn_core::observe::init_logging;
use irlearn_core::{IrConfig, SystemClock};
use irlearn_sim::{FileStorage, Station};

/// How long the loop waits for input before ticking the station
const TICK_MS: u64 = 20;

/// irlearn console over simulated IR hardware
#[derive(Parser, Debug)]
#[command(name = "irlearn-console", version)]
struct Args {
    /// Configuration file (default: search IRLEARN_CONFIG and the usual paths)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Store image file, overriding store.image_path
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Print the default configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn load_config(&self) -> irlearn_core::IrResult<IrConfig> {
        let mut config = match &self.config {
            Some(path) => IrConfig::load_from(path)?,
            None => IrConfig::load()?,
        };
        if let Some(store) = &self.store {
            config.store.image_path = store.clone();
        }
        Ok(config)
    }
}

fn run(config: &IrConfig) -> io::Result<()> {
    let storage = FileStorage::new(&config.store.image_path, config.store.device_capacity);
    let mut station = Station::new(storage, SystemClock::new(), config)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    let (line_tx, line_rx) = channel::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(
        out,
        "irlearn console, {} signal(s) stored. Type 'help' for commands.",
        station.store().signal_count()
    )?;
    out.flush()?;

    loop {
        match line_rx.recv_timeout(Duration::from_millis(TICK_MS)) {
            Ok(line) => {
                let line = line.trim();
                if matches!(line, "quit" | "exit") {
                    break;
                }
                station.execute_line(line, &mut out)?;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        station.tick(&mut out)?;
        out.flush()?;
    }
    info!("Console closed");
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    if args.print_config {
        print!("{}", IrConfig::example_yaml());
        return ExitCode::SUCCESS;
    }

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("irlearn-console: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging);
    info!(store = %config.store.image_path.display(), "Starting irlearn console");

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Console failed: {}", e);
            eprintln!("irlearn-console: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let args = Args::try_parse_from(["irlearn-console", "--print-config"]).unwrap();
        assert!(args.print_config);
        assert!(args.config.is_none());

        let args =
            Args::try_parse_from(["irlearn-console", "-c", "ir.yaml", "--store", "s.bin"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("ir.yaml")));
        assert_eq!(args.store, Some(PathBuf::from("s.bin")));
        assert!(Args::try_parse_from(["irlearn-console", "--verbose"]).is_err());
    }

    #[test]
    fn test_store_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ir.yaml");
        IrConfig::default().save(&path).unwrap();
        let args = Args {
            config: Some(path),
            store: Some(PathBuf::from("other.bin")),
            print_config: false,
        };
        let config = args.load_config().unwrap();
        assert_eq!(config.store.image_path, PathBuf::from("other.bin"));
    }
}
