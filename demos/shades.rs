//! Send one command to a set of shades through the batching scheduler.
//!
//! Usage: shades <config.json> <up|down|stop> <targetID>...
//!
//! The config file holds both halves:
//!
//! ```json
//! {
//!   "client": {"host": "192.168.1.50", "system_id": "MySystem"},
//!   "scheduler": {"composites": [
//!     {"target": "CC0F1A42.1"},
//!     {"target": "CC0F1A42.2"},
//!     {"target": "CC0F1A42.3", "members": ["CC0F1A42.1", "CC0F1A42.2"]}
//!   ]}
//! }
//! ```

use mylink_synergy::{Command, CommandScheduler, SchedulerConfig, SynergyClient, SynergyConfig};
use serde::Deserialize;

#[derive(Deserialize)]
struct DemoConfig {
    client: SynergyConfig,
    #[serde(default)]
    scheduler: SchedulerConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let (Some(path), Some(command)) = (args.next(), args.next()) else {
        eprintln!("usage: shades <config.json> <up|down|stop> <targetID>...");
        std::process::exit(2);
    };
    let command: Command = serde_json::from_value(serde_json::Value::String(command))?;
    let targets: Vec<String> = args.collect();

    let config: DemoConfig = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    config.client.validate()?;
    let client = SynergyClient::with_config(config.client)?;
    for target in &targets {
        client.validate(target)?;
    }
    let scheduler = CommandScheduler::new(client, config.scheduler);

    let pending: Vec<_> = targets
        .iter()
        .map(|t| (t, scheduler.target(t.as_str()).command(command)))
        .collect();
    for (target, outcome) in pending {
        match outcome.await {
            Ok(result) => println!("{} {}: {}", target, command, result),
            Err(e) => eprintln!("{} {}: {}", target, command, e),
        }
    }

    println!("{} connection(s) opened", scheduler.sink().connections_opened());
    Ok(())
}
