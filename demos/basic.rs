//! Basic example: discover the local gateway and list its port mappings.
//!
//! Run with: cargo run --example basic [gateway-ip]
//!
//! Set `RUST_LOG=igd_control=debug` to see the SSDP and SOAP traffic.

use igd_control::{Command, ControlPoint, ControlPointConfig};
use std::net::IpAddr;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut config = ControlPointConfig::default();
    if let Some(gateway) = std::env::args().nth(1) {
        config = config.with_gateway(gateway.parse::<IpAddr>()?);
    }

    let mut control_point = ControlPoint::new(config);

    println!("=== M-SEARCH ===");
    let gateways = control_point.execute(Command::MSearch).await?;
    println!("{}\n", serde_json::to_string_pretty(&gateways)?);

    let session = control_point.connect().await?;
    println!("Using {} ({})", session.device().friendly_name, session.gateway_addr());
    println!("  Control URL: {}", session.service().control_url);
    println!("  Quirks: {}", session.quirks().name);
    println!();

    println!("=== GetExternalIPAddress ===");
    let output = control_point.execute(Command::GetExternalIp).await?;
    println!("{}\n", serde_json::to_string_pretty(&output)?);

    println!("=== Port mappings ===");
    match control_point.execute(Command::GetRedirects).await {
        Ok(output) => println!("{}", serde_json::to_string_pretty(&output)?),
        Err(e) => println!("Listing failed in {} phase: {e}", e.phase()),
    }

    Ok(())
}
