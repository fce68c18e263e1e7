//! The chat controller: entry point that ties the pipeline together.
//!
//! ```text
//! user text ─► chat log ─► stream loop ─► segmenter ─► speech queue ─► playback ─► avatar
//!                  ▲            │                                          │
//!                  └────────────┘ assistant message          runtime events┘
//! ```
//!
//! Every response runs under an epoch. Beginning a new response (or an
//! interrupt) supersedes the old epoch, which silently retires its stream
//! loop and any speech still waiting in the queue.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::avatar::{Avatar, HeadlessAvatar};
use crate::config::ChatConfig;
use crate::emotion::NEUTRAL_EXPRESSION;
use crate::error::{ChatError, Result};
use crate::life::{LifeEngine, LifeHost, LifeState};
use crate::llm::{ChatBackend, create_backend};
use crate::pipeline::activity::Activity;
use crate::pipeline::chat_log::ChatLog;
use crate::pipeline::epoch::EpochController;
use crate::pipeline::messages::{Epoch, Message, Role, Segment};
use crate::pipeline::playback::PlaybackCoordinator;
use crate::pipeline::queue::{SpeechQueue, speech_queue};
use crate::pipeline::remote::{RemoteChannel, forward_commands};
use crate::pipeline::segmenter::{ResponseSegmenter, visible_text};
use crate::pipeline::stream::{StreamConsumer, StreamOutcome};
use crate::runtime::RuntimeEvent;
use crate::tts::{VoiceBackend, create_voice_backend};

/// Runtime event channel capacity for [`ChatController::from_config`].
pub const RUNTIME_EVENT_CAPACITY: usize = 256;

/// Handle to a running chat pipeline. Cheap to clone.
#[derive(Clone)]
pub struct ChatController {
    inner: Arc<Inner>,
}

struct Inner {
    config: ChatConfig,
    epochs: EpochController,
    queue: SpeechQueue,
    log: ChatLog,
    backend: Arc<dyn ChatBackend>,
    avatar: Arc<dyn Avatar>,
    consumer: Arc<StreamConsumer>,
    activity: Arc<Activity>,
    transcript_tx: Arc<watch::Sender<String>>,
    runtime_tx: broadcast::Sender<RuntimeEvent>,
    handle: Handle,
    cancel: CancellationToken,
    life: Arc<LifeState>,
    life_task: Mutex<Option<CancellationToken>>,
    remote_task: Mutex<Option<CancellationToken>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChatController {
    /// Start a controller from configuration, using the configured backends
    /// and a [`HeadlessAvatar`].
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, a backend missing its settings, or
    /// when called outside a tokio runtime.
    pub fn from_config(config: ChatConfig) -> Result<Self> {
        config.validate()?;
        let (runtime_tx, _) = broadcast::channel(RUNTIME_EVENT_CAPACITY);
        let backend = create_backend(&config.llm, &config.character)?;
        let voice = create_voice_backend(&config.tts)?;
        let avatar: Arc<dyn Avatar> = Arc::new(HeadlessAvatar::new(Some(runtime_tx.clone())));
        Self::start(config, backend, voice, avatar, runtime_tx)
    }

    /// Start a controller with explicit backends and spawn its playback task.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or when called outside a tokio runtime.
    pub fn start(
        config: ChatConfig,
        backend: Arc<dyn ChatBackend>,
        voice: Arc<dyn VoiceBackend>,
        avatar: Arc<dyn Avatar>,
        runtime_tx: broadcast::Sender<RuntimeEvent>,
    ) -> Result<Self> {
        config.validate()?;
        let handle = Handle::try_current()
            .map_err(|e| ChatError::Config(format!("chat controller needs a tokio runtime: {e}")))?;

        let epochs = EpochController::new();
        let activity = Arc::new(Activity::new());
        let log = ChatLog::new(Some(runtime_tx.clone()));
        let (queue, jobs) = speech_queue(config.speech.queue_capacity, epochs.clone());
        let (transcript_tx, _) = watch::channel(String::new());
        let transcript_tx = Arc::new(transcript_tx);
        let cancel = CancellationToken::new();

        let consumer = Arc::new(StreamConsumer::new(
            Arc::clone(&backend),
            queue.clone(),
            epochs.clone(),
            log.clone(),
            Arc::clone(&activity),
            Arc::clone(&transcript_tx),
            Some(runtime_tx.clone()),
            config.speech.flush_trailing_fragment,
        ));

        let playback = PlaybackCoordinator::new(
            jobs,
            epochs.clone(),
            voice,
            Arc::clone(&avatar),
            Arc::clone(&activity),
        )
        .with_runtime_events(runtime_tx.clone());
        handle.spawn(playback.run(cancel.child_token()));

        info!(
            character = %config.character.name,
            llm = backend.name(),
            "chat controller started"
        );

        let controller = Self {
            inner: Arc::new(Inner {
                life: Arc::new(LifeState::new(&config.life)),
                config,
                epochs,
                queue,
                log,
                backend,
                avatar,
                consumer,
                activity,
                transcript_tx,
                runtime_tx,
                handle,
                cancel,
                life_task: Mutex::new(None),
                remote_task: Mutex::new(None),
            }),
        };
        if controller.inner.config.life.enabled {
            controller.set_life_enabled(true);
        }
        Ok(controller)
    }

    /// Handle one incoming message and start streaming a spoken reply.
    ///
    /// Idle prompts (`is_idle_event`) are recorded with the system role and
    /// do not count as user activity. Any response still in flight is
    /// superseded. Returns `None` for blank input.
    pub fn receive_message_from_user(
        &self,
        text: &str,
        is_idle_event: bool,
    ) -> Option<JoinHandle<StreamOutcome>> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let inner = &self.inner;

        if !is_idle_event {
            inner.activity.mark_user_engaged();
            inner.activity.touch();
            if inner.life.on_user_message() {
                inner.avatar.set_expression(NEUTRAL_EXPRESSION);
            }
        }

        let message = if is_idle_event {
            Message::system(text)
        } else {
            Message::user(text)
        };
        let (epoch, prompt) = inner.epochs.begin_epoch_with(|_| {
            inner.log.push(message);
            inner.transcript_tx.send_replace(String::new());
            inner.activity.set_processing(true);
            self.prompt()
        });
        debug!(epoch, idle = is_idle_event, "new response epoch");
        self.emit(RuntimeEvent::EpochStarted { epoch });
        self.emit(RuntimeEvent::Processing { active: true });

        let consumer = Arc::clone(&inner.consumer);
        Some(
            inner
                .handle
                .spawn(async move { consumer.run(prompt, epoch).await }),
        )
    }

    /// System prompt followed by the recent history.
    fn prompt(&self) -> Vec<Message> {
        let config = &self.inner.config;
        let mut prompt = vec![Message::system(config.character.system_prompt.clone())];
        prompt.extend(self.inner.log.recent(config.llm.history_limit));
        prompt
    }

    /// One-shot completion that never touches the chat log, the speech
    /// queue or the epoch. Reasoning blocks are removed from the answer.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the request or the stream fails.
    pub async fn ask_llm(&self, messages: &[Message]) -> Result<String> {
        let mut stream = self.inner.backend.send(messages).await?;
        let mut raw = String::new();
        while let Some(chunk) = stream.next().await {
            raw.push_str(&chunk?);
        }
        Ok(visible_text(&raw).trim().to_owned())
    }

    /// [`ask_llm`](Self::ask_llm) with a single system and user message.
    ///
    /// # Errors
    ///
    /// See [`ask_llm`](Self::ask_llm).
    pub async fn ask(&self, system: &str, user: &str) -> Result<String> {
        self.ask_llm(&[Message::system(system), Message::user(user)])
            .await
    }

    /// Like [`ask_llm`](Self::ask_llm) but returns the answer split into
    /// tagged segments, keeping an unterminated tail.
    ///
    /// # Errors
    ///
    /// See [`ask_llm`](Self::ask_llm).
    pub async fn ask_llm_segments(&self, messages: &[Message]) -> Result<Vec<Segment>> {
        let mut stream = self.inner.backend.send(messages).await?;
        let mut segmenter = ResponseSegmenter::new();
        let mut segments = Vec::new();
        while let Some(chunk) = stream.next().await {
            segments.extend(segmenter.push(&chunk?));
        }
        segments.extend(segmenter.finish(true));
        Ok(segments)
    }

    /// Supersede whatever is being generated or spoken.
    pub fn interrupt(&self) -> Epoch {
        let inner = &self.inner;
        let (epoch, ()) = inner.epochs.begin_epoch_with(|_| {
            inner.transcript_tx.send_replace(String::new());
            inner.activity.set_processing(false);
        });
        info!(epoch, "response interrupted");
        self.emit(RuntimeEvent::EpochStarted { epoch });
        self.emit(RuntimeEvent::Processing { active: false });
        epoch
    }

    /// Start or stop idle behaviour.
    pub fn set_life_enabled(&self, enabled: bool) {
        let mut slot = lock(&self.inner.life_task);
        match (enabled, slot.is_some()) {
            (true, false) => {
                let cancel = self.inner.cancel.child_token();
                let engine = LifeEngine::new(
                    self.clone(),
                    self.inner.config.life.clone(),
                    Arc::clone(&self.inner.life),
                );
                self.inner.handle.spawn(engine.run(cancel.clone()));
                *slot = Some(cancel);
            }
            (false, true) => {
                if let Some(cancel) = slot.take() {
                    cancel.cancel();
                }
            }
            _ => {}
        }
    }

    pub fn life_enabled(&self) -> bool {
        lock(&self.inner.life_task).is_some()
    }

    pub fn life_state(&self) -> &LifeState {
        &self.inner.life
    }

    /// Open the remote control channel, replacing any channel already open.
    pub fn open_remote_channel(&self) -> RemoteChannel {
        let mut slot = lock(&self.inner.remote_task);
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        let (commands, rx) = mpsc::unbounded_channel();
        let cancel = self.inner.cancel.child_token();
        self.inner
            .handle
            .spawn(forward_commands(self.clone(), rx, cancel.clone()));
        *slot = Some(cancel);
        RemoteChannel {
            events: self.subscribe(),
            commands,
        }
    }

    /// Stop forwarding remote commands. Safe to call when nothing is open.
    pub fn close_remote_channel(&self) {
        if let Some(cancel) = lock(&self.inner.remote_task).take() {
            cancel.cancel();
        }
    }

    pub fn chat_log(&self) -> &ChatLog {
        &self.inner.log
    }

    /// Text of the response currently being spoken, updated per segment.
    pub fn live_transcript(&self) -> watch::Receiver<String> {
        self.inner.transcript_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.inner.runtime_tx.subscribe()
    }

    pub fn current_epoch(&self) -> Epoch {
        self.inner.epochs.current_epoch()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.activity.is_processing()
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.activity.is_speaking()
    }

    pub fn pending_speech_jobs(&self) -> usize {
        self.inner.queue.pending()
    }

    pub fn idle_time(&self) -> Duration {
        self.inner.activity.idle_time()
    }

    pub fn config(&self) -> &ChatConfig {
        &self.inner.config
    }

    /// Stop every background task and retire the current response.
    pub fn shutdown(&self) {
        info!("chat controller shutting down");
        self.inner.cancel.cancel();
        for slot in [&self.inner.life_task, &self.inner.remote_task] {
            if let Some(task) = lock(slot).take() {
                task.cancel();
            }
        }
        self.inner.epochs.begin_epoch_with(|_| {
            self.inner.activity.set_processing(false);
        });
    }

    fn emit(&self, event: RuntimeEvent) {
        let _ = self.inner.runtime_tx.send(event);
    }
}

#[async_trait]
impl LifeHost for ChatController {
    fn is_busy(&self) -> bool {
        self.is_processing() || self.is_speaking() || self.pending_speech_jobs() > 0
    }

    fn user_engaged(&self) -> bool {
        self.inner.activity.user_engaged()
    }

    fn idle_time(&self) -> Duration {
        ChatController::idle_time(self)
    }

    fn recent_conversation(&self) -> Vec<Message> {
        self.inner
            .log
            .recent(self.inner.config.llm.history_limit)
            .into_iter()
            .filter(|m| m.role != Role::System)
            .collect()
    }

    fn set_expression(&self, expression: &str) {
        self.inner.avatar.set_expression(expression);
    }

    fn send_idle_prompt(&self, prompt: &str) {
        let _ = self.receive_message_from_user(prompt, true);
    }

    async fn ask(&self, system: &str, user: &str) -> Result<String> {
        ChatController::ask(self, system, user).await
    }

    fn notify(&self, event: RuntimeEvent) {
        self.emit(event);
    }
}
