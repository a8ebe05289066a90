// SPDX-License-Identifier: MPL-2.0

//! Demo program: Mirror a Haptique RS90 hub until Ctrl-C.
//!
//! This example demonstrates:
//! - How to connect an `MqttTransport` and start a `Coordinator`
//! - How to follow state changes through listeners and the snapshot watch
//! - How to render display values with the `readout` module
//!
//! # Usage
//!
//! ```bash
//! cargo run --example bridge -- <host> <remote_id> [port] [username] [password]
//! ```
//!
//! # Example
//!
//! ```bash
//! # Without authentication (default port 1883)
//! cargo run --example bridge -- 192.168.1.50 rs90-01
//!
//! # With authentication
//! cargo run --example bridge -- 192.168.1.50 rs90-01 1883 mqtt_user mqtt_pass
//! ```

use std::env;

use haptique_rs90::readout::Readout;
use haptique_rs90::{Coordinator, CoordinatorConfig, MqttTransport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} <host> <remote_id> [port] [username] [password]",
            args[0]
        );
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  cargo run --example bridge -- 192.168.1.50 rs90-01");
        eprintln!("  cargo run --example bridge -- 192.168.1.50 rs90-01 1883 user pass");
        std::process::exit(1);
    }

    let host = &args[1];
    let remote_id = &args[2];
    let port: u16 = args.get(3).and_then(|p| p.parse().ok()).unwrap_or(1883);

    println!("Connecting to MQTT broker {host}:{port}...");

    let mut builder = MqttTransport::builder().host(host).port(port);
    if let (Some(username), Some(password)) = (args.get(4), args.get(5)) {
        builder = builder.credentials(username, password);
    }
    let transport = builder.build().await?;

    let coordinator = Coordinator::start(transport, CoordinatorConfig::new(remote_id)).await?;
    println!("Following hub {remote_id} (Ctrl-C to stop)");
    println!();

    coordinator.on_status(|status| println!("Hub is now {}", status.as_str()));
    coordinator.on_macro_state(|name, state| println!("Macro {name}: {}", state.as_str()));

    let mut updates = coordinator.watch();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                for readout in Readout::all(&state) {
                    println!(
                        "  {:<32} {:<28} {}",
                        readout.name(),
                        readout.icon(&state),
                        serde_json::to_string(&readout.value(&state))?
                    );
                }
                println!();
            }
        }
    }

    println!("Shutting down...");
    let diagnostics = coordinator.diagnostics().await?;
    println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    coordinator.shutdown().await?;

    Ok(())
}
