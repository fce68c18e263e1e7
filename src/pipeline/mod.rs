//! Streaming response-to-speech pipeline.

pub mod activity;
pub mod chat_log;
pub mod coordinator;
pub mod epoch;
pub mod messages;
pub mod playback;
pub mod queue;
pub mod remote;
pub mod segmenter;
pub mod stream;
