use anyhow::Result;
use common::{Command, DaemonStatus, Response, WallpaperError};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, mpsc};

use crate::DaemonState;
use crate::log_and_continue;
use crate::orchestrator::Orchestrator;

pub async fn start(state: Arc<Mutex<DaemonState>>, orchestrator: Arc<Orchestrator>) -> Result<()> {
    let socket_path = common::get_socket_path();

    // Remove old socket if it exists
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }

    let listener = UnixListener::bind(&socket_path)?;
    log::info!("IPC server listening on: {}", socket_path.display());

    loop {
        // Check if we should exit
        if state.lock().await.should_exit {
            break;
        }

        // Accept connections with timeout
        let accept_result =
            tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()).await;

        match accept_result {
            Ok(Ok((stream, _addr))) => {
                let state = state.clone();
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, state, orchestrator).await {
                        log::error!("Error handling client: {}", e);
                    }
                });
            }
            Ok(Err(e)) => {
                log::error!("Error accepting connection: {}", e);
            }
            Err(_) => {
                // Timeout, continue loop to check exit condition
                continue;
            }
        }
    }

    // Clean up socket
    let _ = std::fs::remove_file(&socket_path);
    log::info!("IPC server stopped");
    Ok(())
}

/// Serve one connection.
///
/// Responses are funnelled through a channel so that fetches finishing in
/// the background can write to the same socket as direct replies.
async fn handle_client(
    stream: UnixStream,
    state: Arc<Mutex<DaemonState>>,
    orchestrator: Arc<Orchestrator>,
) -> Result<()> {
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    let (tx, rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_responses(writer, rx));

    loop {
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => match serde_json::from_str::<Command>(&line) {
                Ok(command) => {
                    if let Some(response) = handle_command(command, &state, &orchestrator, &tx).await {
                        log_and_continue!(tx.send(response), "queue reply");
                    }
                }
                Err(e) => {
                    log::warn!("Invalid command: {}", e);
                    log_and_continue!(
                        tx.send(Response::Error(WallpaperError::from(e))),
                        "queue error reply"
                    );
                }
            },
            // The offending line is consumed, so the connection stays usable
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                log::warn!("Unreadable command line: {}", e);
                log_and_continue!(
                    tx.send(Response::Error(WallpaperError::from(e))),
                    "queue error reply"
                );
            }
            Err(e) => return Err(e.into()),
        }

        line.clear();
    }

    // The writer drains once every pending fetch has dropped its sender
    drop(tx);
    writer_task.await??;

    Ok(())
}

async fn write_responses(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Response>,
) -> Result<()> {
    while let Some(response) = rx.recv().await {
        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Returns the immediate reply, if the command has one
async fn handle_command(
    command: Command,
    state: &Arc<Mutex<DaemonState>>,
    orchestrator: &Arc<Orchestrator>,
    tx: &mpsc::UnboundedSender<Response>,
) -> Option<Response> {
    log::debug!("Handling command: {:?}", command);

    match command {
        Command::Ping => Some(Response::Pong),

        Command::Query => {
            let uptime_secs = state.lock().await.uptime_secs();
            Some(Response::Status(DaemonStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs,
                cache: orchestrator.cache_status().await,
            }))
        }

        Command::FetchWallpapers(request) => {
            log::info!(
                "Fetch requested: {:?} ({}, max {})",
                request.source,
                request.orientation,
                request.maximum_entries
            );

            let orchestrator = orchestrator.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                orchestrator.fetch(request, &tx).await;
            });

            None
        }

        Command::Kill => {
            log::info!("Received kill command");

            // Give the writer a moment to deliver the reply
            let state = state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                state.lock().await.should_exit = true;
            });

            Some(Response::Ok)
        }
    }
}
