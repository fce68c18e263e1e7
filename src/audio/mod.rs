//! Audio decoding and lip-sync analysis for synthesized speech.

pub mod decode;
pub mod lipsync;

pub use decode::{DecodedAudio, decode_mono};
pub use lipsync::{LipSyncEnvelope, mouth_volume};
