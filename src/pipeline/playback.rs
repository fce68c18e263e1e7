//! Serialized synthesis and playback of queued speech jobs.
//!
//! A single consumer task takes jobs in enqueue order and, for each one,
//! synthesizes speech and waits for the avatar to finish playing it before
//! touching the next job. Jobs from a superseded epoch are skipped both
//! before synthesis and again before playback, since synthesis suspends.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::avatar::{Avatar, SpeechAudio};
use crate::emotion::Screenplay;
use crate::pipeline::activity::Activity;
use crate::pipeline::epoch::EpochController;
use crate::pipeline::messages::{Epoch, SpeechJob};
use crate::pipeline::queue::SpeechJobReceiver;
use crate::runtime::{DropReason, RuntimeEvent};
use crate::tts::{VoiceBackend, speakable_text};

/// What happened to one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Audio was played to completion.
    Played,
    /// Nothing to play (no speakable text or silent voice backend).
    Silent,
    /// The job's epoch was superseded.
    Stale,
    /// Synthesis or playback failed.
    Failed,
}

/// Consumer side of the speech queue.
pub struct PlaybackCoordinator {
    jobs: SpeechJobReceiver,
    epochs: EpochController,
    voice: Arc<dyn VoiceBackend>,
    avatar: Arc<dyn Avatar>,
    activity: Arc<Activity>,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
}

impl PlaybackCoordinator {
    pub fn new(
        jobs: SpeechJobReceiver,
        epochs: EpochController,
        voice: Arc<dyn VoiceBackend>,
        avatar: Arc<dyn Avatar>,
        activity: Arc<Activity>,
    ) -> Self {
        Self {
            jobs,
            epochs,
            voice,
            avatar,
            activity,
            runtime_tx: None,
        }
    }

    /// Attach a runtime event sender for speech start/finish/drop events.
    pub fn with_runtime_events(mut self, tx: broadcast::Sender<RuntimeEvent>) -> Self {
        self.runtime_tx = Some(tx);
        self
    }

    /// Process jobs until cancelled or every producer is gone.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(voice = self.voice.name(), "playback coordinator started");
        loop {
            let job = tokio::select! {
                () = cancel.cancelled() => break,
                job = self.jobs.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = self.process(job) => {}
            }
        }
        self.activity.set_speaking(false);
        info!("playback coordinator stopped");
    }

    /// Synthesize and play one job, returning once playback has ended.
    pub async fn process(&self, job: SpeechJob) -> JobOutcome {
        let SpeechJob { segment, epoch } = job;

        if !self.epochs.is_current(epoch) {
            debug!(epoch, text = %segment.text, "dropping stale speech job");
            self.dropped(epoch, DropReason::Stale);
            return JobOutcome::Stale;
        }

        let screenplay = Screenplay::from_segment(&segment);
        if let Some(expression) = &screenplay.expression {
            self.epochs
                .run_if_current(epoch, || self.avatar.set_expression(expression));
        }

        let spoken = speakable_text(&segment.text);
        if spoken.is_empty() {
            debug!(epoch, text = %segment.text, "nothing speakable in segment");
            return JobOutcome::Silent;
        }

        let audio = match self.voice.synthesize(&spoken).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!(epoch, voice = self.voice.name(), "speech synthesis failed: {e}");
                self.dropped(epoch, DropReason::Failed);
                return JobOutcome::Failed;
            }
        };
        if audio.is_empty() {
            return JobOutcome::Silent;
        }

        let text = screenplay.message.clone();
        let speech = SpeechAudio {
            audio,
            screenplay,
            epoch,
        };
        let started = self.epochs.run_if_current(epoch, || {
            self.activity.set_speaking(true);
            self.avatar.play(speech)
        });
        let completion = match started {
            None => {
                debug!(epoch, "speech synthesized for a superseded epoch; discarding");
                self.dropped(epoch, DropReason::Stale);
                return JobOutcome::Stale;
            }
            Some(Err(e)) => {
                self.activity.set_speaking(false);
                warn!(epoch, "avatar could not start playback: {e}");
                self.dropped(epoch, DropReason::Failed);
                return JobOutcome::Failed;
            }
            Some(Ok(completion)) => completion,
        };
        self.emit(RuntimeEvent::SpeechStarted { epoch, text });

        let result = completion.wait().await;
        self.activity.set_speaking(false);
        self.emit(RuntimeEvent::SpeechFinished {
            epoch,
            completed: result.is_ok(),
        });

        match result {
            Ok(()) => JobOutcome::Played,
            Err(e) => {
                warn!(epoch, "playback failed: {e}");
                JobOutcome::Failed
            }
        }
    }

    fn dropped(&self, epoch: Epoch, reason: DropReason) {
        self.emit(RuntimeEvent::SpeechJobDropped { epoch, reason });
    }

    fn emit(&self, event: RuntimeEvent) {
        if let Some(rt) = &self.runtime_tx {
            let _ = rt.send(event);
        }
    }
}
