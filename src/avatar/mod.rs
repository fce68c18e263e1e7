//! The rendered character: expressions, speech playback and lip-sync.
//!
//! The pipeline never renders anything itself. It hands each synthesized
//! clip to an [`Avatar`], which starts playback and reports completion
//! through a [`PlaybackCompletion`].

pub mod headless;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::emotion::Screenplay;
use crate::error::{ChatError, Result};
use crate::pipeline::messages::Epoch;

pub use headless::HeadlessAvatar;

/// One synthesized clip ready to play.
#[derive(Debug, Clone)]
pub struct SpeechAudio {
    /// Encoded audio as returned by the voice backend.
    pub audio: Bytes,
    pub screenplay: Screenplay,
    pub epoch: Epoch,
}

/// Character presentation surface.
pub trait Avatar: Send + Sync {
    /// Switch facial expression. Unknown names may be ignored.
    fn set_expression(&self, expression: &str);

    /// Start playing `speech` and return without waiting for it to finish.
    ///
    /// Called with the epoch gate held, so implementations must not block.
    ///
    /// # Errors
    ///
    /// Returns an error if playback cannot be started at all.
    fn play(&self, speech: SpeechAudio) -> Result<PlaybackCompletion>;
}

/// Resolves when a started clip has finished playing.
#[derive(Debug)]
pub struct PlaybackCompletion {
    rx: oneshot::Receiver<Result<()>>,
}

/// Avatar-side half of a [`PlaybackCompletion`].
#[derive(Debug)]
pub struct PlaybackSignal {
    tx: oneshot::Sender<Result<()>>,
}

impl PlaybackCompletion {
    /// Create a linked signal/completion pair.
    pub fn pair() -> (PlaybackSignal, Self) {
        let (tx, rx) = oneshot::channel();
        (PlaybackSignal { tx }, Self { rx })
    }

    /// A completion that is already finished.
    pub fn finished() -> Self {
        let (signal, completion) = Self::pair();
        signal.finish();
        completion
    }

    /// Wait until playback ends.
    ///
    /// # Errors
    ///
    /// Returns the avatar's failure, or [`ChatError::Playback`] if the avatar
    /// dropped the signal without reporting.
    pub async fn wait(self) -> Result<()> {
        self.rx.await.map_err(|_| {
            ChatError::Playback("avatar dropped playback without signalling completion".to_owned())
        })?
    }
}

impl PlaybackSignal {
    pub fn finish(self) {
        let _ = self.tx.send(Ok(()));
    }

    pub fn fail(self, error: ChatError) {
        let _ = self.tx.send(Err(error));
    }
}
