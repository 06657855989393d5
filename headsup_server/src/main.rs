mod betting;
mod config;
mod dealing;
mod deck;
mod evaluator;
mod game;
mod gateway;
mod player;
mod scheduler;
mod server;
mod table;

use crate::config::ServerConfig;
use crate::server::Lobby;
use crate::table::TableEvent;
use anyhow::Context;
use clap::Parser;
use futures::stream::StreamExt;
use futures::SinkExt;
use headsup_protocol::ClientMessage;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::watch;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

const OUTBOUND_CAPACITY: usize = 100;
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;
const CLOSE_TIMEOUT_SECS: u64 = 1;

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = ServerConfig::parse();
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!("Heads-up server listening on: {}", config.bind);
    debug!("Table rules: {:?}", config.table());

    let lobby = Arc::new(Lobby::new(config.table(), config.event_queue_capacity));
    let mut active_connections: Vec<tokio::task::JoinHandle<()>> = Vec::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let (stream, addr) = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            },
        };

        info!("New client connected: {}", addr);
        let lobby = Arc::clone(&lobby);
        let max_message_size = config.max_message_size;
        let shutdown_rx = shutdown_rx.clone();
        active_connections.retain(|handle| !handle.is_finished());
        active_connections.push(tokio::spawn(async move {
            if let Err(e) =
                handle_connection(stream, addr, lobby, max_message_size, shutdown_rx).await
            {
                error!("Error handling connection from {}: {:#}", addr, e);
            }
        }));
    }

    info!("Shutdown signal received, closing {} connections", active_connections.len());
    shutdown_tx.send_replace(true);
    let drain = futures::future::join_all(active_connections);
    if tokio::time::timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), drain)
        .await
        .is_err()
    {
        warn!("Shutdown timeout reached, dropping remaining connections");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Turns one inbound text frame into a table event.
fn decode_frame(session_id: &str, text: &str, max_message_size: usize) -> TableEvent {
    if text.len() > max_message_size {
        return TableEvent::Malformed {
            session_id: session_id.to_string(),
            reason: format!("message of {} bytes exceeds {}", text.len(), max_message_size),
        };
    }
    match ClientMessage::parse(text) {
        Ok(message) => TableEvent::Message {
            session_id: session_id.to_string(),
            message,
        },
        Err(e) => TableEvent::Malformed {
            session_id: session_id.to_string(),
            reason: e.to_string(),
        },
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    lobby: Arc<Lobby>,
    max_message_size: usize,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .context("websocket handshake failed")?;
    let session_id = Uuid::new_v4().to_string();
    debug!("WebSocket handshake completed for {} as {}", addr, session_id);

    let (mut write, mut read) = ws_stream.split();

    let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(OUTBOUND_CAPACITY);
    // Runs until the registry drops its sender, then sends a close frame.
    let write_handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write.send(Message::text(msg)).await {
                debug!("Failed to send message: {}", e);
                return;
            }
        }
        if let Err(e) = write.send(Message::Close(None)).await {
            debug!("Failed to send close frame: {}", e);
        }
    });

    let (table, registry) = lobby.admit(&session_id, tx);
    if !table
        .send(TableEvent::Join {
            session_id: session_id.clone(),
        })
        .await
    {
        registry.disconnect_player(&session_id);
        anyhow::bail!("table closed before {} could join", session_id);
    }

    loop {
        let frame = tokio::select! {
            frame = read.next() => frame,
            _ = table.closed() => {
                debug!("Table for {} has closed", session_id);
                break;
            }
            _ = shutdown.changed() => {
                debug!("Server shutting down, closing {}", session_id);
                break;
            }
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                let event = decode_frame(&session_id, text.as_str(), max_message_size);
                if !table.send(event).await {
                    debug!("Table for {} has closed", session_id);
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => {
                debug!("Client {} disconnected", session_id);
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("WebSocket error from {}: {}", session_id, e);
                break;
            }
        }
    }

    registry.disconnect_player(&session_id);
    table
        .send(TableEvent::Disconnect {
            session_id: session_id.clone(),
        })
        .await;
    if tokio::time::timeout(Duration::from_secs(CLOSE_TIMEOUT_SECS), write_handle)
        .await
        .is_err()
    {
        debug!("Timed out closing the socket of {}", session_id);
    }
    info!(
        "Session {} closed, {} still connected at its table",
        session_id,
        registry.connected_count()
    );
    Ok(())
}
