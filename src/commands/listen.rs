//! Raw WebSocket event viewer

use std::io::Write;

use colored::Colorize;
use tokio_stream::StreamExt;

use crate::api::{parse_stream_chunk, ChatSocket, SocketEvent};
use crate::error::Result;

/// Connect to `url` and print every event until the socket closes or
/// Ctrl-C is pressed
///
/// Frames that parse as streaming completion chunks print only their text.
pub async fn listen(url: &str, token: Option<&str>) -> Result<()> {
    let (socket, mut events) = ChatSocket::connect(url, token);

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                socket.disconnect();
                continue;
            }
            event = events.next() => event,
        };

        let Some(event) = event else { break };
        match event {
            SocketEvent::Connecting => println!("{}", format!("Connecting to {}", url).dimmed()),
            SocketEvent::Connected => println!("{}", "Connected".green()),
            SocketEvent::Message(text) => match parse_stream_chunk(&text) {
                Ok(Some(chunk)) => {
                    print!("{}", chunk.delta_text());
                    if chunk.is_finished() {
                        println!();
                    }
                    let _ = std::io::stdout().flush();
                }
                Ok(None) => println!(),
                Err(_) => println!("{}", text),
            },
            SocketEvent::Disconnected => {
                println!("{}", "Disconnected".yellow());
                break;
            }
            SocketEvent::Error(message) => {
                println!("{}", format!("WebSocket error: {}", message).red());
                break;
            }
        }
    }
    Ok(())
}
