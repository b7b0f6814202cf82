//! Interactive relay client.
//!
//! Connects to a Tobira relay over TCP or WebSocket, prints every message the
//! relay sends and sends each line typed at the "> " prompt.
//! Automatically reconnects on disconnection (max 5 attempts with 5 second interval).
//!
//! Run with:
//! ```not_rust
//! cargo run --bin tobira-client -- --mode ws --port 8080
//! cargo run --bin tobira-client -- -m tcp -p 5000
//! ```

use clap::Parser;

use tobira_client::{Transport, run_client};
use tobira_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "tobira-client")]
#[command(about = "Interactive TCP / WebSocket client for the Tobira relay", long_about = None)]
struct Args {
    /// Protocol spoken by the relay
    #[arg(short = 'm', long, value_enum, default_value_t = Transport::Ws)]
    mode: Transport,

    /// Relay host
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Relay port
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();
    let endpoint = args.mode.endpoint(&args.host, args.port);

    if let Err(e) = run_client(args.mode, endpoint).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
