//! External control of a running controller.
//!
//! A remote channel pairs a runtime event subscription with a command
//! sender. Commands are applied in arrival order by a forwarding task that
//! lives until the channel is closed or the controller shuts down.

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::pipeline::coordinator::ChatController;
use crate::runtime::RuntimeEvent;

/// Commands accepted from a remote client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    /// A user message, as if typed into the chat.
    Message(String),
    /// Stop the current response (barge-in).
    Interrupt,
    /// Turn idle behaviour on or off.
    SetLife(bool),
}

/// Client side of an open remote channel.
#[derive(Debug)]
pub struct RemoteChannel {
    pub events: broadcast::Receiver<RuntimeEvent>,
    pub commands: mpsc::UnboundedSender<RemoteCommand>,
}

pub(crate) async fn forward_commands(
    controller: ChatController,
    mut commands: mpsc::UnboundedReceiver<RemoteCommand>,
    cancel: CancellationToken,
) {
    info!("remote channel opened");
    loop {
        let command = tokio::select! {
            () = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };
        debug!(?command, "remote command");
        match command {
            RemoteCommand::Message(text) => {
                let _ = controller.receive_message_from_user(&text, false);
            }
            RemoteCommand::Interrupt => {
                controller.interrupt();
            }
            RemoteCommand::SetLife(enabled) => controller.set_life_enabled(enabled),
        }
    }
    info!("remote channel closed");
}
