//! Host and client in one process, trading a few messages over two FIFOs.
//!
//! Run with:
//!   cargo run -p jsonfifo --example host-client
//!
//! The same exchange works across processes with the CLI:
//!   cargo run -p jsonfifo --features cli -- connect host demo --send '{"fromHost":"blub"}' --every 1s
//!   cargo run -p jsonfifo --features cli -- connect client demo --send '{"fromClient":"x"}' --every 1s

use std::time::Duration;

use jsonfifo::endpoint::{EndpointConfig, IpcEndpoint, IpcEvent, Role};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join(format!("jsonfifo-demo-{}", std::process::id()));

    let mut host = IpcEndpoint::new(EndpointConfig::new(Role::Host, "demo").with_base_directory(&dir))?;
    let mut client =
        IpcEndpoint::new(EndpointConfig::new(Role::Client, "demo").with_base_directory(&dir))?;
    eprintln!("pipes: {}", dir.display());

    for round in 0..3 {
        host.send(&json!({"fromHost": "blub", "round": round}))?;
        client.send(&json!({"fromClient": "x", "round": round}))?;
    }

    let mut host_seen = 0;
    let mut client_seen = 0;
    let deadline = tokio::time::sleep(Duration::from_secs(5));
    tokio::pin!(deadline);

    while host_seen < 3 || client_seen < 3 {
        tokio::select! {
            Some(event) = host.next_event() => {
                eprintln!("host   <- {event:?}");
                if matches!(event, IpcEvent::Data(_)) {
                    host_seen += 1;
                }
            }
            Some(event) = client.next_event() => {
                eprintln!("client <- {event:?}");
                if matches!(event, IpcEvent::Data(_)) {
                    client_seen += 1;
                }
            }
            _ = &mut deadline => {
                eprintln!("gave up waiting");
                break;
            }
        }
    }

    client.close().await?;
    host.close().await?;
    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}
