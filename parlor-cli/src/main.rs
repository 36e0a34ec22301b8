//! Terminal client for parlor rooms.
//!
//! Tails the live stream of one room and takes commands on stdin:
//!
//!   /rooms        list rooms
//!   /room <id>    switch to another room
//!   /older        page further back in history
//!   /quit         exit
//!   anything else is sent to the room
//!
//! Usage:
//!   PARLOR_TOKEN=... cargo run --bin parlor -- --room 1

use anyhow::Result;
use clap::Parser;
use parlor_sdk::{ClientConfig, Message, RoomClient, RoomEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "parlor", about = "Tail and chat in parlor rooms from the terminal")]
struct Args {
    /// HTTP API base URL.
    #[arg(long, default_value = "http://localhost:8080/api")]
    api_base: String,

    /// WebSocket base URL.
    #[arg(long, default_value = "ws://localhost:8080")]
    ws_base: String,

    /// Access token from the auth service. Without one the client shows
    /// history but stays offline.
    #[arg(long, env = "PARLOR_TOKEN", default_value = "")]
    token: String,

    /// Room to join on startup.
    #[arg(long, default_value_t = 1)]
    room: i64,

    /// History page size (1..=100).
    #[arg(long, default_value_t = 50)]
    page_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let (_token_tx, token_rx) = watch::channel(args.token.clone());
    let (client, mut events) = RoomClient::new(
        ClientConfig {
            api_base: args.api_base,
            ws_base: args.ws_base,
            page_size: args.page_size,
        },
        token_rx,
    );

    client.switch_room(args.room).await?;
    for message in client.messages() {
        print_message(&message);
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(RoomEvent::Live { message, .. }) => print_message(&message),
                Some(RoomEvent::Connection(state)) => tracing::info!(?state, "connection"),
                None => break,
            },
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&client, line.trim()).await? {
                    break;
                }
            }
        }
    }

    client.shutdown();
    Ok(())
}

/// Returns false when the user asked to quit.
async fn handle_line(client: &RoomClient, line: &str) -> Result<bool> {
    match line {
        "" => {}
        "/quit" => return Ok(false),
        "/rooms" => {
            for room in client.list_rooms().await? {
                println!("room {:>4}  {}", room.id, room.name);
            }
        }
        "/older" => match client.load_older().await? {
            Some(n) => eprintln!("loaded {n} older messages"),
            None => eprintln!("no older messages"),
        },
        _ if line.starts_with("/room") => {
            match line.trim_start_matches("/room").trim().parse::<i64>() {
                Ok(id) => {
                    client.switch_room(id).await?;
                    for message in client.messages() {
                        print_message(&message);
                    }
                }
                Err(_) => eprintln!("usage: /room <id>"),
            }
        }
        _ => {
            if let Err(err) = client.send(line).await {
                eprintln!("send failed: {err}");
            }
        }
    }
    Ok(true)
}

fn print_message(message: &Message) {
    println!(
        "[{}] user {}: {}",
        message.created_at.format("%H:%M:%S"),
        message.user_id,
        message.content
    );
}
