//! Stdin/stdout JSON bridge for the control channel.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages, dispatches them
//! through a [`HostCommandRouter`], and writes `ResponseEnvelope` and
//! `EventEnvelope` messages as newline-delimited JSON.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, broadcast};

use crate::error::{ChatError, Result};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::host::handler::HostCommandRouter;
use crate::pipeline::coordinator::ChatController;
use crate::runtime::RuntimeEvent;

type SharedWriter<W> = Arc<Mutex<W>>;

/// Run the bridge on the process's stdin and stdout until stdin closes or a
/// `runtime.stop` command is received.
///
/// # Errors
///
/// Returns an error if stdin cannot be read or stdout cannot be written.
pub async fn run_stdio_bridge(controller: ChatController) -> Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = BufWriter::new(tokio::io::stdout());
    run_bridge(controller, reader, writer).await
}

/// Run the bridge over any line reader and writer.
///
/// Two tasks operate in parallel:
///
/// 1. **Reader** -- reads commands, routes each one and writes the response.
/// 2. **Event forwarder** -- writes every runtime event as it happens.
///
/// The remote channel is opened for the lifetime of the bridge and closed
/// when the reader finishes.
///
/// # Errors
///
/// Returns an error if reading or writing fails.
pub async fn run_bridge<R, W>(controller: ChatController, reader: R, writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let channel = controller.open_remote_channel();
    let router = HostCommandRouter::new(controller.clone(), channel.commands);
    let writer = Arc::new(Mutex::new(writer));

    let event_handle = tokio::spawn(forward_events(channel.events, Arc::clone(&writer)));

    let reader_result = run_reader(&router, reader, &writer).await;

    controller.close_remote_channel();
    event_handle.abort();
    let _ = event_handle.await;

    reader_result
}

async fn forward_events<W>(mut events: broadcast::Receiver<RuntimeEvent>, writer: SharedWriter<W>)
where
    W: AsyncWrite + Unpin,
{
    loop {
        match events.recv().await {
            Ok(event) => match EventEnvelope::from_runtime(&event) {
                Ok(envelope) => {
                    if let Err(e) = write_json(&writer, &envelope).await {
                        tracing::warn!(error = %e, "failed to write event envelope; stopping event forwarder");
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize runtime event; skipping");
                }
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "event forwarder lagged; some events were dropped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("runtime event channel closed; stopping event forwarder");
                break;
            }
        }
    }
}

async fn run_reader<R, W>(router: &HostCommandRouter, mut reader: R, writer: &SharedWriter<W>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| ChatError::Host(format!("failed to read command: {e}")))?;
        if bytes_read == 0 {
            tracing::info!("input closed (EOF); shutting down bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CommandEnvelope = match serde_json::from_str(trimmed) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, raw_line = %trimmed, "failed to parse command envelope");
                let response = ResponseEnvelope::error("parse-error", format!("failed to parse command envelope: {e}"));
                write_json(writer, &response).await?;
                continue;
            }
        };

        let is_stop = envelope.command == CommandName::RuntimeStop;
        let response = router.handle(&envelope).await;
        write_json(writer, &response).await?;

        if is_stop {
            tracing::info!("runtime.stop received; shutting down bridge");
            break;
        }
    }
    Ok(())
}

/// Write one JSON line and flush.
async fn write_json<W, T>(writer: &SharedWriter<W>, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let mut json = serde_json::to_string(value)
        .map_err(|e| ChatError::Host(format!("failed to serialize envelope: {e}")))?;
    json.push('\n');
    let mut w = writer.lock().await;
    w.write_all(json.as_bytes())
        .await
        .map_err(|e| ChatError::Host(format!("failed to write envelope: {e}")))?;
    w.flush()
        .await
        .map_err(|e| ChatError::Host(format!("failed to flush output: {e}")))?;
    Ok(())
}
