//! Append-only conversation log.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::pipeline::messages::Message;
use crate::runtime::RuntimeEvent;

/// Ordered, shared chat history. Entries are never edited or removed.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    messages: Arc<Mutex<Vec<Message>>>,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
}

impl ChatLog {
    pub fn new(runtime_tx: Option<broadcast::Sender<RuntimeEvent>>) -> Self {
        Self {
            messages: Arc::default(),
            runtime_tx,
        }
    }

    pub fn push(&self, message: Message) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        if let Some(rt) = &self.runtime_tx {
            let _ = rt.send(RuntimeEvent::MessageAppended { message });
        }
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The last `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Message> {
        let messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        let start = messages.len().saturating_sub(n);
        messages[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<Message> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}
