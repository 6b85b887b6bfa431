use std::env;
use std::sync::Arc;
use std::time::Duration;

use neohub::{Coordinator, NeoHubClient, DEFAULT_PORT};

#[tokio::main]
async fn main() -> neohub::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let host = args.get(1).expect("usage: monitor <host> [port]");
    let port = args
        .get(2)
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let client = Arc::new(NeoHubClient::builder(host).port(port).build());

    println!("Probing {host}:{port}...");
    if !client.ping().await {
        eprintln!("Hub not reachable");
        std::process::exit(1);
    }

    let coordinator = Arc::new(
        Coordinator::builder(client)
            .poll_interval(Duration::from_secs(30))
            .fetch_serials(true)
            .build(),
    );

    let poller = coordinator.clone();
    tokio::spawn(async move { poller.run().await });

    loop {
        tokio::time::sleep(Duration::from_secs(30)).await;
        let Some(snapshot) = coordinator.data() else {
            println!("No data yet (hub unreachable?)");
            continue;
        };
        println!(
            "-- snapshot v{} ({:?}, {} devices, available: {})",
            snapshot.version,
            snapshot.system.unit,
            snapshot.devices.len(),
            coordinator.available(),
        );
        for device in &snapshot.devices {
            let temp = device
                .temperature
                .map(|t| format!("{t:.1}\u{00b0}"))
                .unwrap_or_else(|| "--".to_string());
            println!(
                "[{}] {temp} -> {:?} | mode: {:?} | action: {:?}{}{}",
                device.name,
                device.target_temperature,
                device.hvac_mode(),
                device.hvac_action(),
                if device.hold_on { " | HOLD" } else { "" },
                if device.offline { " | OFFLINE" } else { "" },
            );
        }
    }
}
