//! Consumption of one language model response stream.
//!
//! The loop owns the epoch it was started with. It stops at the first read
//! after that epoch is superseded, so an interrupted response never enqueues
//! another sentence or writes to the chat log.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::llm::ChatBackend;
use crate::pipeline::activity::Activity;
use crate::pipeline::chat_log::ChatLog;
use crate::pipeline::epoch::EpochController;
use crate::pipeline::messages::{Epoch, Message, Segment, SpeechJob};
use crate::pipeline::queue::SpeechQueue;
use crate::pipeline::segmenter::ResponseSegmenter;
use crate::runtime::RuntimeEvent;

/// How a stream loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The stream ended normally; `text` is what was appended to the log.
    Completed { text: String },
    /// A newer epoch took over before the stream finished.
    Superseded,
    /// The backend failed; an error notice was appended to the log.
    Failed { error: String },
}

/// Everything a stream loop needs, shared by every request of a controller.
pub struct StreamConsumer {
    backend: Arc<dyn ChatBackend>,
    queue: SpeechQueue,
    epochs: EpochController,
    log: ChatLog,
    activity: Arc<Activity>,
    transcript_tx: Arc<watch::Sender<String>>,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
    flush_trailing: bool,
}

/// Running state of one response.
#[derive(Default)]
struct Spoken {
    segments: Vec<String>,
}

impl Spoken {
    fn text(&self) -> String {
        self.segments.join(" ")
    }
}

enum Emit {
    Continue,
    Superseded,
}

impl StreamConsumer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        queue: SpeechQueue,
        epochs: EpochController,
        log: ChatLog,
        activity: Arc<Activity>,
        transcript_tx: Arc<watch::Sender<String>>,
        runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
        flush_trailing: bool,
    ) -> Self {
        Self {
            backend,
            queue,
            epochs,
            log,
            activity,
            transcript_tx,
            runtime_tx,
            flush_trailing,
        }
    }

    /// Stream a reply to `messages` on behalf of `epoch`.
    pub async fn run(&self, messages: Vec<Message>, epoch: Epoch) -> StreamOutcome {
        let outcome = self.consume(&messages, epoch).await;

        let cleared = self.epochs.run_if_current(epoch, || {
            self.activity.set_processing(false);
        });
        if cleared.is_some() {
            self.emit(RuntimeEvent::Processing { active: false });
        }

        match &outcome {
            StreamOutcome::Completed { text } => {
                info!(epoch, chars = text.len(), backend = self.backend.name(), "response complete");
            }
            StreamOutcome::Superseded => debug!(epoch, "response superseded"),
            StreamOutcome::Failed { error } => warn!(epoch, "response failed: {error}"),
        }
        outcome
    }

    async fn consume(&self, messages: &[Message], epoch: Epoch) -> StreamOutcome {
        let mut stream = match self.backend.send(messages).await {
            Ok(stream) => stream,
            Err(e) => {
                let error = e.to_string();
                self.epochs
                    .run_if_current(epoch, || self.log.push(error_notice(&e)));
                return StreamOutcome::Failed { error };
            }
        };

        let mut segmenter = ResponseSegmenter::new();
        let mut spoken = Spoken::default();

        loop {
            if !self.epochs.is_current(epoch) {
                return StreamOutcome::Superseded;
            }
            let Some(item) = stream.next().await else {
                break;
            };
            if !self.epochs.is_current(epoch) {
                return StreamOutcome::Superseded;
            }

            match item {
                Ok(chunk) => {
                    for segment in segmenter.push(&chunk) {
                        if let Emit::Superseded = self.emit_segment(segment, epoch, &mut spoken).await {
                            return StreamOutcome::Superseded;
                        }
                    }
                }
                Err(e) => {
                    let error = e.to_string();
                    let partial = spoken.text();
                    let appended = self.epochs.run_if_current(epoch, || {
                        if !partial.is_empty() {
                            self.log.push(Message::assistant(partial));
                        }
                        self.log.push(error_notice(&e));
                    });
                    if appended.is_none() {
                        return StreamOutcome::Superseded;
                    }
                    return StreamOutcome::Failed { error };
                }
            }
        }

        for segment in segmenter.finish(self.flush_trailing) {
            if let Emit::Superseded = self.emit_segment(segment, epoch, &mut spoken).await {
                return StreamOutcome::Superseded;
            }
        }

        let text = spoken.text();
        let appended = self.epochs.run_if_current(epoch, || {
            if !text.is_empty() {
                self.log.push(Message::assistant(text.clone()));
            }
        });
        match appended {
            Some(()) => StreamOutcome::Completed { text },
            None => StreamOutcome::Superseded,
        }
    }

    async fn emit_segment(&self, segment: Segment, epoch: Epoch, spoken: &mut Spoken) -> Emit {
        let text = segment.text.clone();
        match self.queue.enqueue(SpeechJob::new(segment, epoch)).await {
            Ok(true) => {}
            Ok(false) => return Emit::Superseded,
            Err(e) => warn!(epoch, "speech not queued: {e}"),
        }

        spoken.segments.push(text);
        let transcript = spoken.text();
        let published = self.epochs.run_if_current(epoch, || {
            self.transcript_tx.send_replace(transcript.clone());
        });
        match published {
            Some(()) => {
                self.emit(RuntimeEvent::LiveTranscript { text: transcript });
                Emit::Continue
            }
            None => Emit::Superseded,
        }
    }

    fn emit(&self, event: RuntimeEvent) {
        if let Some(rt) = &self.runtime_tx {
            let _ = rt.send(event);
        }
    }
}

fn error_notice(error: &ChatError) -> Message {
    Message::assistant(format!("Error: {error}"))
}
