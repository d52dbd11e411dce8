//! Connect to a server and print every lifecycle event.
//!
//! Usage:
//!   cargo run --example watch -- --server irc.libera.chat:6697 --tls --nick zubrwatch

use anyhow::Result;
use clap::Parser;
use zubr_irc::client::{self, ConnectConfig};
use zubr_irc::event::TransportEvent;
use zubr_irc::reconnect::ReconnectConfig;

#[derive(Parser)]
#[command(name = "watch", about = "Print IRC transport lifecycle events")]
struct Args {
    #[arg(long, default_value = "irc.libera.chat:6697")]
    server: String,
    #[arg(long, default_value = "zubrwatch")]
    nick: String,
    #[arg(long)]
    tls: bool,
    #[arg(long)]
    insecure: bool,
    /// Also print raw protocol lines.
    #[arg(long)]
    raw: bool,
    #[arg(long)]
    channel: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let (host, port) = match args.server.rsplit_once(':') {
        Some((h, p)) => (h.to_string(), p.parse()?),
        None => (args.server.clone(), if args.tls { 6697 } else { 6667 }),
    };

    let config = ConnectConfig {
        host,
        port,
        tls: args.tls,
        tls_insecure: args.insecure,
        nick: args.nick.clone(),
        user: args.nick.clone(),
        raw_events: args.raw,
        ..Default::default()
    };
    let (handle, mut events) = client::connect(config, ReconnectConfig::default());

    while let Some(event) = events.recv().await {
        match &event {
            TransportEvent::Raw { line, from_server } => {
                println!("{} {line}", if *from_server { "<<" } else { ">>" });
            }
            TransportEvent::Registered { nick, .. } => {
                println!("[{}] as {nick}", event.name());
                if let Some(ref channel) = args.channel {
                    handle.join(channel, None).await?;
                }
            }
            other => println!("[{}] {other:?}", other.name()),
        }
    }
    Ok(())
}
