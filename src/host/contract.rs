//! Versioned command/event envelopes for the control bridge.

use serde::{Deserialize, Serialize};

use crate::runtime::RuntimeEvent;

/// Contract version for host command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Commands accepted on the control bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "host.version")]
    HostVersion,
    #[serde(rename = "runtime.stop")]
    RuntimeStop,
    #[serde(rename = "chat.send")]
    ChatSend,
    #[serde(rename = "chat.interrupt")]
    ChatInterrupt,
    #[serde(rename = "chat.ask")]
    ChatAsk,
    #[serde(rename = "chat.log")]
    ChatLog,
    #[serde(rename = "life.set")]
    LifeSet,
    #[serde(rename = "config.get")]
    ConfigGet,
}

impl CommandName {
    /// Every command, in wire-name order of introduction.
    pub const ALL: [Self; 9] = [
        Self::HostPing,
        Self::HostVersion,
        Self::RuntimeStop,
        Self::ChatSend,
        Self::ChatInterrupt,
        Self::ChatAsk,
        Self::ChatLog,
        Self::LifeSet,
        Self::ConfigGet,
    ];

    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::HostVersion => "host.version",
            Self::RuntimeStop => "runtime.stop",
            Self::ChatSend => "chat.send",
            Self::ChatInterrupt => "chat.interrupt",
            Self::ChatAsk => "chat.ask",
            Self::ChatLog => "chat.log",
            Self::LifeSet => "life.set",
            Self::ConfigGet => "config.get",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == raw)
    }
}

/// Reply to one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Build a successful response envelope.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    /// Build an error response envelope.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A command from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A runtime event pushed to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Wrap a runtime event under its dotted name with a fresh event id.
    ///
    /// # Errors
    ///
    /// Fails only if the event cannot be represented as JSON.
    pub fn from_runtime(event: &RuntimeEvent) -> serde_json::Result<Self> {
        Ok(Self::new(
            uuid::Uuid::new_v4().to_string(),
            event.name(),
            serde_json::to_value(event)?,
        ))
    }

    /// Build a v1 event envelope.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }
}

/// Why an envelope was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn wire_names_match_serde() {
        for command in CommandName::ALL {
            let json = serde_json::to_value(command).unwrap();
            assert_eq!(json, command.as_str());
            assert_eq!(CommandName::parse(command.as_str()), Some(command));
        }
        assert_eq!(CommandName::parse("chat.nope"), None);
    }

    #[test]
    fn envelope_parses_from_client_json() {
        let raw = r#"{"v":1,"request_id":"r1","command":"chat.send","payload":{"text":"hi"}}"#;
        let envelope: CommandEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.command, CommandName::ChatSend);
        assert_eq!(envelope.payload["text"], "hi");
        assert!(envelope.validate().is_ok());
    }

    #[test]
    fn validate_rejects_wrong_version_and_blank_id() {
        let mut envelope = CommandEnvelope::new("r1", CommandName::HostPing, serde_json::json!({}));
        envelope.v = 2;
        assert_eq!(
            envelope.validate().unwrap_err().kind,
            ContractErrorKind::UnsupportedVersion
        );
        let blank = CommandEnvelope::new("  ", CommandName::HostPing, serde_json::json!({}));
        assert_eq!(blank.validate().unwrap_err().kind, ContractErrorKind::InvalidEnvelope);
    }

    #[test]
    fn runtime_events_are_wrapped_by_name() {
        let envelope = EventEnvelope::from_runtime(&RuntimeEvent::Processing { active: true }).unwrap();
        assert_eq!(envelope.v, EVENT_VERSION);
        assert_eq!(envelope.event, "chat.processing");
        assert_eq!(envelope.payload["active"], true);
        assert!(uuid::Uuid::parse_str(&envelope.event_id).is_ok());
    }
}
