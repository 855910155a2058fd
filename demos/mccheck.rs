//! The `mcheck <host>[:port]` command body: probe an address over every
//! protocol and print one report per endpoint that answered.

use spyglass_ping::resolve::AddressError;
use spyglass_ping::{format, lang, Config, Message, Rendered};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match std::env::var("SPYGLASS_CONFIG") {
        Ok(path) => Config::load(path)?,
        Err(_) => Config::default(),
    };
    config.apply();

    let args = std::env::args().collect::<Vec<_>>();
    let Some(input) = args.get(1) else {
        println!("{}", lang::label("where_ip"));
        return Ok(());
    };

    let report = match spyglass_ping::check(input).await {
        Ok(report) => report,
        Err(err @ AddressError::PortOutOfRange { .. }) => {
            println!("{}", lang::label("where_port"));
            eprintln!("{err}");
            return Ok(());
        }
        Err(err) => {
            eprintln!("{err}");
            return Ok(());
        }
    };

    if report.records.is_empty() {
        println!("{}", lang::label(&report.fallback.status.to_string()));
        if let Some(latency) = report.fallback.latency_ms {
            println!("({latency}ms)");
        }
        return Ok(());
    }

    for record in &report.records {
        match format::render(record, &report.address, config.message_type) {
            Rendered::Template(data) => println!("{}", serde_json::to_string_pretty(&data)?),
            Rendered::Chat(messages) => {
                for message in messages {
                    match message {
                        Message::Text(text) => println!("{text}"),
                        Message::Image(bytes) => println!("[favicon: {} bytes]", bytes.len()),
                    }
                }
            }
        }
        println!();
    }
    Ok(())
}
