//! Idle behaviour: the character talks on its own when the user goes quiet.
//!
//! The engine wakes at random intervals and, if the user has engaged at
//! least once and nothing else is happening, takes the next event from a
//! rotating queue. Text events become idle prompts to the language model,
//! `Sleep` puts the character to sleep, and `Subconscious` reflects on the
//! recent conversation (see [`subconscious`]).

pub mod subconscious;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::LifeConfig;
use crate::emotion::SLEEP_EXPRESSION;
use crate::error::Result;
use crate::pipeline::messages::Message;
use crate::runtime::RuntimeEvent;

pub use subconscious::{DiaryEntry, SubconsciousDiary};

/// What the engine needs from the chat controller.
#[async_trait]
pub trait LifeHost: Send + Sync {
    /// A response is streaming, speech is playing or jobs are waiting.
    fn is_busy(&self) -> bool;

    /// The user has sent at least one message.
    fn user_engaged(&self) -> bool;

    /// Time since the last user message, excluding time spent speaking.
    fn idle_time(&self) -> Duration;

    fn recent_conversation(&self) -> Vec<Message>;

    fn set_expression(&self, expression: &str);

    /// Start a spoken response to an idle prompt.
    fn send_idle_prompt(&self, prompt: &str);

    /// One-shot question to the language model, outside the chat flow.
    async fn ask(&self, system: &str, user: &str) -> Result<String>;

    fn notify(&self, event: RuntimeEvent);
}

/// One entry of the idle event queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleEvent {
    /// Send this prompt as an idle message.
    Text(String),
    /// Reflect on the conversation and store a diary entry.
    Subconscious,
    /// Fall asleep until the user speaks again.
    Sleep,
}

impl IdleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Subconscious => "subconscious",
            Self::Sleep => "sleep",
        }
    }

    /// Text events cycle forever; the others run once per idle period.
    fn requeues(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

/// Result of one engine cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The user has not said anything yet.
    NotEngaged,
    /// The character is busy talking.
    Busy,
    /// The user was active too recently.
    Awake,
    /// Asleep until the next user message.
    Asleep,
    /// Randomly sat this cycle out.
    Skipped,
    /// No events queued.
    Empty,
    /// An event was handled.
    Handled(&'static str),
}

#[derive(Debug)]
struct LifeQueue {
    events: VecDeque<IdleEvent>,
    sleeping: bool,
}

/// State shared between the engine task and the controller.
#[derive(Debug)]
pub struct LifeState {
    queue: Mutex<LifeQueue>,
    diary: SubconsciousDiary,
}

impl LifeState {
    pub fn new(config: &LifeConfig) -> Self {
        let mut events: VecDeque<IdleEvent> = config
            .idle_text_prompts
            .iter()
            .map(|p| IdleEvent::Text(p.clone()))
            .collect();
        events.push_back(IdleEvent::Subconscious);
        Self {
            queue: Mutex::new(LifeQueue {
                events,
                sleeping: false,
            }),
            diary: SubconsciousDiary::new(config.subconscious_max_chars),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LifeQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The user spoke: wake up and allow one more reflection.
    ///
    /// Returns whether the character was asleep.
    pub fn on_user_message(&self) -> bool {
        let mut queue = self.lock();
        if !queue.events.contains(&IdleEvent::Subconscious) {
            queue.events.push_back(IdleEvent::Subconscious);
        }
        std::mem::replace(&mut queue.sleeping, false)
    }

    /// Put `Sleep` at the front unless already asleep or scheduled.
    pub fn schedule_sleep(&self) -> bool {
        let mut queue = self.lock();
        if queue.sleeping || queue.events.contains(&IdleEvent::Sleep) {
            return false;
        }
        queue.events.push_front(IdleEvent::Sleep);
        true
    }

    pub fn next_event(&self) -> Option<IdleEvent> {
        self.lock().events.pop_front()
    }

    fn requeue(&self, event: IdleEvent) {
        self.lock().events.push_back(event);
    }

    fn fall_asleep(&self) {
        self.lock().sleeping = true;
    }

    pub fn is_sleeping(&self) -> bool {
        self.lock().sleeping
    }

    pub fn pending_events(&self) -> Vec<IdleEvent> {
        self.lock().events.iter().cloned().collect()
    }

    pub fn diary(&self) -> &SubconsciousDiary {
        &self.diary
    }
}

/// Background producer of idle prompts.
pub struct LifeEngine<H> {
    host: H,
    config: LifeConfig,
    state: Arc<LifeState>,
}

impl<H: LifeHost> LifeEngine<H> {
    pub fn new(host: H, config: LifeConfig, state: Arc<LifeState>) -> Self {
        Self { host, config, state }
    }

    /// Tick at random intervals until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!("life engine started");
        loop {
            let wait = self.next_interval();
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }
            let outcome = tokio::select! {
                () = cancel.cancelled() => break,
                outcome = self.tick() => outcome,
            };
            debug!(?outcome, "life tick");
        }
        info!("life engine stopped");
    }

    fn next_interval(&self) -> Duration {
        let min = self.config.min_interval_sec;
        let max = self.config.max_interval_sec.max(min);
        Duration::from_secs(rand::thread_rng().gen_range(min..=max))
    }

    /// Run one cycle.
    pub async fn tick(&self) -> TickOutcome {
        if !self.host.user_engaged() {
            return TickOutcome::NotEngaged;
        }
        if self.host.is_busy() {
            return TickOutcome::Busy;
        }
        if self.state.is_sleeping() {
            return TickOutcome::Asleep;
        }
        let idle = self.host.idle_time();
        if idle < Duration::from_secs(self.config.time_before_idle_sec) {
            return TickOutcome::Awake;
        }
        if idle > Duration::from_secs(self.config.time_to_sleep_sec) && self.state.schedule_sleep() {
            debug!(idle_secs = idle.as_secs(), "scheduling sleep");
        }
        let skip = self.config.skip_probability.clamp(0.0, 1.0);
        if skip > 0.0 && rand::thread_rng().gen_bool(skip) {
            return TickOutcome::Skipped;
        }
        let Some(event) = self.state.next_event() else {
            return TickOutcome::Empty;
        };

        let name = event.name();
        info!(event = name, "handling idle event");
        self.host.notify(RuntimeEvent::LifeEvent { name: name.to_owned() });
        self.handle(&event).await;
        if event.requeues() {
            self.state.requeue(event);
        }
        TickOutcome::Handled(name)
    }

    async fn handle(&self, event: &IdleEvent) {
        match event {
            IdleEvent::Text(prompt) => self.host.send_idle_prompt(prompt),
            IdleEvent::Sleep => {
                self.host.set_expression(SLEEP_EXPRESSION);
                self.state.fall_asleep();
            }
            IdleEvent::Subconscious => {
                if let Err(e) = subconscious::reflect(&self.host, &self.state.diary).await {
                    warn!("subconscious reflection failed: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[derive(Default)]
    struct FakeHost {
        busy: AtomicBool,
        engaged: AtomicBool,
        idle: Mutex<Duration>,
        prompts: Mutex<Vec<String>>,
        expressions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LifeHost for Arc<FakeHost> {
        fn is_busy(&self) -> bool {
            self.busy.load(Ordering::SeqCst)
        }

        fn user_engaged(&self) -> bool {
            self.engaged.load(Ordering::SeqCst)
        }

        fn idle_time(&self) -> Duration {
            *self.idle.lock().unwrap()
        }

        fn recent_conversation(&self) -> Vec<Message> {
            vec![Message::user("hi"), Message::assistant("Hello!")]
        }

        fn set_expression(&self, expression: &str) {
            self.expressions.lock().unwrap().push(expression.to_owned());
        }

        fn send_idle_prompt(&self, prompt: &str) {
            self.prompts.lock().unwrap().push(prompt.to_owned());
        }

        async fn ask(&self, _system: &str, _user: &str) -> Result<String> {
            Ok("[happy]".to_owned())
        }

        fn notify(&self, _event: RuntimeEvent) {}
    }

    fn config() -> LifeConfig {
        LifeConfig {
            enabled: true,
            time_before_idle_sec: 20,
            time_to_sleep_sec: 90,
            skip_probability: 0.0,
            idle_text_prompts: vec!["first".to_owned(), "second".to_owned()],
            ..LifeConfig::default()
        }
    }

    fn engine(host: &Arc<FakeHost>) -> LifeEngine<Arc<FakeHost>> {
        let config = config();
        let state = Arc::new(LifeState::new(&config));
        LifeEngine::new(host.clone(), config, state)
    }

    fn idle_host(secs: u64) -> Arc<FakeHost> {
        let host = Arc::new(FakeHost::default());
        host.engaged.store(true, Ordering::SeqCst);
        *host.idle.lock().unwrap() = Duration::from_secs(secs);
        host
    }

    #[tokio::test]
    async fn waits_for_first_user_message() {
        let host = Arc::new(FakeHost::default());
        assert_eq!(engine(&host).tick().await, TickOutcome::NotEngaged);
    }

    #[tokio::test]
    async fn busy_and_awake_cycles_do_nothing() {
        let host = idle_host(5);
        let engine = engine(&host);
        assert_eq!(engine.tick().await, TickOutcome::Awake);
        host.busy.store(true, Ordering::SeqCst);
        *host.idle.lock().unwrap() = Duration::from_secs(30);
        assert_eq!(engine.tick().await, TickOutcome::Busy);
        assert!(host.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn text_events_rotate() {
        let host = idle_host(30);
        let engine = engine(&host);
        assert_eq!(engine.tick().await, TickOutcome::Handled("text"));
        assert_eq!(engine.tick().await, TickOutcome::Handled("text"));
        assert_eq!(*host.prompts.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(
            engine.state.pending_events(),
            vec![
                IdleEvent::Subconscious,
                IdleEvent::Text("first".to_owned()),
                IdleEvent::Text("second".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn long_idle_puts_character_to_sleep() {
        let host = idle_host(120);
        let engine = engine(&host);
        assert_eq!(engine.tick().await, TickOutcome::Handled("sleep"));
        assert_eq!(*host.expressions.lock().unwrap(), vec![SLEEP_EXPRESSION]);
        assert!(engine.state.is_sleeping());
        assert_eq!(engine.tick().await, TickOutcome::Asleep);

        assert!(engine.state.on_user_message());
        assert!(!engine.state.is_sleeping());
        assert!(!engine.state.pending_events().contains(&IdleEvent::Sleep));
    }

    #[tokio::test]
    async fn subconscious_runs_once_per_user_message() {
        let host = idle_host(30);
        let engine = engine(&host);
        for _ in 0..3 {
            engine.tick().await;
        }
        assert_eq!(engine.state.diary().entries().len(), 1);
        assert!(!engine.state.pending_events().contains(&IdleEvent::Subconscious));

        engine.state.on_user_message();
        engine.state.on_user_message();
        let count = engine
            .state
            .pending_events()
            .iter()
            .filter(|e| **e == IdleEvent::Subconscious)
            .count();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let host = idle_host(0);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(engine(&host).run(cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
