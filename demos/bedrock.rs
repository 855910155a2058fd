//! Probe a Bedrock server alone, skipping the Java chain.

use std::time::Duration;

use spyglass_ping::{check_server_with, ProtocolChoice, SlpProtocol};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = std::env::args().collect::<Vec<_>>();
    let input = args.get(1).map(String::to_string).expect("address required");

    println!("Pinging {input}");

    let report = check_server_with(
        &input,
        ProtocolChoice::Single(SlpProtocol::BedrockRaknet),
        Duration::from_secs(2),
    )
    .await?;

    match report.records.first() {
        Some(record) => {
            println!("Server info: {record:#?}");
            println!("Latency: {}ms", record.latency_ms.unwrap_or_default());
        }
        None => println!("No reply: {}", report.fallback.status),
    }
    Ok(())
}
