//! Routes control-bridge commands to a running chat controller.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{ChatError, Result};
use crate::host::contract::{CommandEnvelope, CommandName, EVENT_VERSION, ResponseEnvelope};
use crate::pipeline::coordinator::ChatController;
use crate::pipeline::remote::RemoteCommand;

/// Command router bound to one controller's remote channel.
pub struct HostCommandRouter {
    controller: ChatController,
    commands: mpsc::UnboundedSender<RemoteCommand>,
}

impl HostCommandRouter {
    pub fn new(controller: ChatController, commands: mpsc::UnboundedSender<RemoteCommand>) -> Self {
        Self {
            controller,
            commands,
        }
    }

    /// Validate and execute one command, always producing a response.
    pub async fn handle(&self, envelope: &CommandEnvelope) -> ResponseEnvelope {
        if let Err(e) = envelope.validate() {
            return ResponseEnvelope::error(envelope.request_id.clone(), e.to_string());
        }
        match self.route(envelope).await {
            Ok(response) => response,
            Err(e) => {
                warn!(command = envelope.command.as_str(), "host command failed: {e}");
                ResponseEnvelope::error(envelope.request_id.clone(), e.to_string())
            }
        }
    }

    async fn route(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let id = envelope.request_id.clone();
        match envelope.command {
            CommandName::HostPing => Ok(ResponseEnvelope::ok(id, serde_json::json!({"pong": true}))),
            CommandName::HostVersion => Ok(ResponseEnvelope::ok(
                id,
                serde_json::json!({
                    "contract_version": EVENT_VERSION,
                    "package_version": env!("CARGO_PKG_VERSION"),
                }),
            )),
            CommandName::RuntimeStop => {
                info!("runtime.stop received");
                self.controller.shutdown();
                Ok(ResponseEnvelope::ok(id, serde_json::json!({"stopping": true})))
            }
            CommandName::ChatSend => {
                let text = required_str(&envelope.payload, "text", envelope.command)?;
                if text.trim().is_empty() {
                    return Err(ChatError::Host("chat.send requires non-empty text".to_owned()));
                }
                self.forward(RemoteCommand::Message(text.to_owned()))?;
                Ok(ResponseEnvelope::ok(id, serde_json::json!({"accepted": true})))
            }
            CommandName::ChatInterrupt => {
                self.forward(RemoteCommand::Interrupt)?;
                Ok(ResponseEnvelope::ok(id, serde_json::json!({"accepted": true})))
            }
            CommandName::ChatAsk => {
                let system = required_str(&envelope.payload, "system", envelope.command)?;
                let user = required_str(&envelope.payload, "user", envelope.command)?;
                let answer = self.controller.ask(system, user).await?;
                Ok(ResponseEnvelope::ok(id, serde_json::json!({"answer": answer})))
            }
            CommandName::ChatLog => {
                let messages = self.controller.chat_log().snapshot();
                Ok(ResponseEnvelope::ok(id, serde_json::json!({"messages": messages})))
            }
            CommandName::LifeSet => {
                let Some(enabled) = envelope.payload.get("enabled").and_then(serde_json::Value::as_bool) else {
                    return Err(ChatError::Host("life.set requires payload.enabled (bool)".to_owned()));
                };
                self.forward(RemoteCommand::SetLife(enabled))?;
                Ok(ResponseEnvelope::ok(id, serde_json::json!({"enabled": enabled})))
            }
            CommandName::ConfigGet => {
                let mut config = self.controller.config().clone();
                config.llm.openai_api_key = redact(&config.llm.openai_api_key);
                config.tts.openai_api_key = redact(&config.tts.openai_api_key);
                config.tts.elevenlabs_api_key = redact(&config.tts.elevenlabs_api_key);
                let value = serde_json::to_value(&config)
                    .map_err(|e| ChatError::Host(format!("failed to serialize config: {e}")))?;
                Ok(ResponseEnvelope::ok(id, value))
            }
        }
    }

    fn forward(&self, command: RemoteCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ChatError::Channel("remote channel is closed".to_owned()))
    }
}

fn required_str<'a>(payload: &'a serde_json::Value, key: &str, command: CommandName) -> Result<&'a str> {
    payload
        .get(key)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ChatError::Host(format!("{} requires payload.{key}", command.as_str())))
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "***".to_owned()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::ChatConfig;

    fn router() -> (HostCommandRouter, mpsc::UnboundedReceiver<RemoteCommand>) {
        let mut config = ChatConfig::default();
        config.llm.openai_api_key = "sk-secret".to_owned();
        let controller = ChatController::from_config(config).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        (HostCommandRouter::new(controller, tx), rx)
    }

    fn command(name: CommandName, payload: serde_json::Value) -> CommandEnvelope {
        CommandEnvelope::new("req-1", name, payload)
    }

    #[tokio::test]
    async fn ping_pongs() {
        let (router, _rx) = router();
        let response = router.handle(&command(CommandName::HostPing, serde_json::json!({}))).await;
        assert!(response.ok);
        assert_eq!(response.payload["pong"], true);
    }

    #[tokio::test]
    async fn send_is_forwarded_to_remote_channel() {
        let (router, mut rx) = router();
        let response = router
            .handle(&command(CommandName::ChatSend, serde_json::json!({"text": "hello"})))
            .await;
        assert!(response.ok);
        assert_eq!(rx.recv().await.unwrap(), RemoteCommand::Message("hello".to_owned()));
    }

    #[tokio::test]
    async fn missing_payload_field_is_an_error_response() {
        let (router, _rx) = router();
        let response = router.handle(&command(CommandName::ChatSend, serde_json::json!({}))).await;
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("host error: chat.send requires payload.text"));

        let response = router.handle(&command(CommandName::LifeSet, serde_json::json!({"enabled": "yes"}))).await;
        assert!(!response.ok);
    }

    #[tokio::test]
    async fn ask_answers_without_logging() {
        let (router, _rx) = router();
        let response = router
            .handle(&command(
                CommandName::ChatAsk,
                serde_json::json!({"system": "be terse", "user": "hi"}),
            ))
            .await;
        assert_eq!(response.payload["answer"], "hi.");

        let log = router.handle(&command(CommandName::ChatLog, serde_json::json!({}))).await;
        assert_eq!(log.payload["messages"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn config_get_redacts_keys() {
        let (router, _rx) = router();
        let response = router.handle(&command(CommandName::ConfigGet, serde_json::json!({}))).await;
        assert!(response.ok);
        assert_eq!(response.payload["llm"]["openai_api_key"], "***");
        assert_eq!(response.payload["tts"]["elevenlabs_api_key"], "");
        assert_eq!(response.payload["character"]["name"], "Amica");
    }

    #[tokio::test]
    async fn wrong_version_is_rejected() {
        let (router, _rx) = router();
        let mut envelope = command(CommandName::HostPing, serde_json::json!({}));
        envelope.v = 7;
        let response = router.handle(&envelope).await;
        assert!(!response.ok);
        assert_eq!(response.request_id, "req-1");
    }
}
