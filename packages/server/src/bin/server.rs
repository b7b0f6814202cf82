//! Relay host: runs a TCP or WebSocket relay and bridges it to the terminal.
//!
//! Every message a client sends is logged; every line typed on stdin is sent to
//! the connected client(s) and the resulting status is printed.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin tobira-server
//! cargo run --bin tobira-server -- --mode tcp --port 5000
//! cargo run --bin tobira-server -- --mode ws --program ./my-client --program-args "--port 8080"
//! ```

use std::net::IpAddr;

use clap::Parser;
use tobira_server::{
    domain::{RelayConfig, ServerMode},
    ui::{ServerController, shutdown_signal},
};
use tobira_shared::{logger::setup_logger, time::timestamp_to_rfc3339};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "tobira-server")]
#[command(about = "TCP / WebSocket message relay", long_about = None)]
struct Args {
    /// Relay mode: "tcp" or "ws"
    #[arg(short = 'm', long, default_value = "ws")]
    mode: ServerMode,

    /// Host address to bind the relay to
    #[arg(short = 'H', long, default_value_t = RelayConfig::DEFAULT_HOST)]
    host: IpAddr,

    /// Port number to bind the relay to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Program to start along with the relay (killed on shutdown)
    #[arg(long)]
    program: Option<String>,

    /// Whitespace-separated arguments for --program
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    program_args: String,

    /// Keep the program attached to this terminal
    #[arg(long)]
    show_program_window: bool,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    let (controller, mut inbound) = ServerController::new(args.host);

    if let Err(e) = controller.start(args.mode, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    if let Some(program) = &args.program
        && let Err(e) = controller
            .start_program_along(program, args.show_program_window, &args.program_args)
            .await
    {
        tracing::error!("{}", e);
        controller.close().await;
        std::process::exit(1);
    }

    tracing::info!("Type a line and press Enter to send it to connected clients");
    tracing::info!("Press Ctrl+C to shutdown gracefully");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(message) = inbound.recv() => {
                tracing::info!(
                    "[{}] {}: {}",
                    timestamp_to_rfc3339(message.received_at),
                    message.connection_id,
                    message.payload
                );
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let status = controller.send(&line).await;
                    if !status.is_sent() {
                        tracing::warn!("Message was not delivered: {}", status);
                    }
                    println!("{}", status);
                }
                Ok(None) => {
                    tracing::info!("stdin closed, relaying inbound messages only");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
            _ = &mut shutdown => break,
        }
    }

    controller.close().await;
    tracing::info!("Server shutdown complete");
}
