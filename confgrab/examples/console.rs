//! Operator console example
//!
//! Loads an inventory, builds a scheduler with the builtin device scripts
//! and reads operator commands from stdin, one per line.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example console -- --inventory devices.json
//! ```
//!
//! With scheduler settings (workers, timeouts, periodic tasks):
//! ```bash
//! cargo run --example console -- --inventory devices.json --config scheduler.json
//! ```
//!
//! where `scheduler.json` looks like
//!
//! ```json
//! {"workers": 10, "job_timeout": 600, "schedule": [{"task": "nightly", "interval": 86400}]}
//! ```
//!
//! Then type `help` at the `confgrab>` prompt.

use std::env;
use std::fs;
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use confgrab::{
    Console, ConnectorConfig, HostKeyVerification, Inventory, LogReporter, NetworkConnector,
    Scheduler, SchedulerConfig, ScriptRegistry,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let Some(inventory_path) = args.inventory else {
        eprintln!("Error: --inventory <FILE> is required");
        std::process::exit(1);
    };

    let inventory = Inventory::from_json(&fs::read_to_string(&inventory_path)?)?;
    let config: SchedulerConfig = match &args.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => SchedulerConfig::default(),
    };

    let connector = NetworkConnector::new(ConnectorConfig {
        connect_timeout: config.connect_timeout,
        host_key_verification: args.host_keys,
        ..ConnectorConfig::default()
    });

    println!(
        "=== Confgrab console ({} devices, {} workers) ===\n",
        inventory.len(),
        config.workers
    );

    let scheduler = Scheduler::new(
        config,
        inventory,
        ScriptRegistry::with_builtin()?,
        connector,
        LogReporter,
    )?;
    let console = Console::new(scheduler);

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"confgrab> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if matches!(line, "quit" | "exit") {
            break;
        }

        let reply = console.execute(line).await;
        if !reply.is_empty() {
            stdout.write_all(reply.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
        }
    }

    println!("\nStopping scheduler...");
    console.scheduler().stop().await?;
    Ok(())
}

struct Args {
    inventory: Option<PathBuf>,
    config: Option<PathBuf>,
    host_keys: HostKeyVerification,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut inventory = None;
        let mut config = None;
        let mut host_keys = HostKeyVerification::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--inventory" | "-i" => {
                    i += 1;
                    if i < args.len() {
                        inventory = Some(PathBuf::from(&args[i]));
                    }
                }
                "--config" | "-c" => {
                    i += 1;
                    if i < args.len() {
                        config = Some(PathBuf::from(&args[i]));
                    }
                }
                "--strict-host-keys" => host_keys = HostKeyVerification::Strict,
                "--no-host-key-check" => host_keys = HostKeyVerification::Disabled,
                "--help" => {
                    println!("Usage: console --inventory <FILE> [--config <FILE>]");
                    println!();
                    println!("Options:");
                    println!("  -i, --inventory <FILE>   Devices and tasks (JSON)");
                    println!("  -c, --config <FILE>      Scheduler settings (JSON)");
                    println!("      --strict-host-keys   Reject hosts missing from known_hosts");
                    println!("      --no-host-key-check  Accept any host key (lab use only)");
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {}", other);
                    std::process::exit(1);
                }
            }
            i += 1;
        }

        Self {
            inventory,
            config,
            host_keys,
        }
    }
}
