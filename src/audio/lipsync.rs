//! Mouth-open levels derived from speech audio.
//!
//! Each animation frame looks at a window of [`TIME_DOMAIN_WINDOW`] samples,
//! takes the peak amplitude and squashes it through a steep logistic curve
//! so quiet breaths keep the mouth shut and normal speech opens it fully.

/// Samples inspected per frame.
pub const TIME_DOMAIN_WINDOW: usize = 2048;

/// Levels below this are reported as fully closed.
pub const CLOSED_THRESHOLD: f32 = 0.1;

/// Map the samples of one analysis window to a mouth level in `[0, 1]`.
pub fn mouth_volume(window: &[f32]) -> f32 {
    let peak = window.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    let level = 1.0 / (1.0 + (-45.0 * peak + 5.0).exp());
    if level < CLOSED_THRESHOLD { 0.0 } else { level }
}

/// Precomputed per-frame levels for one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct LipSyncEnvelope {
    pub frames_per_second: u32,
    pub levels: Vec<f32>,
}

impl LipSyncEnvelope {
    /// Analyse `samples` at `sample_rate`, producing one level per frame.
    pub fn analyse(samples: &[f32], sample_rate: u32, frames_per_second: u32) -> Self {
        let fps = frames_per_second.max(1);
        if samples.is_empty() || sample_rate == 0 {
            return Self {
                frames_per_second: fps,
                levels: Vec::new(),
            };
        }
        let hop = (sample_rate / fps).max(1) as usize;
        let levels = (0..samples.len())
            .step_by(hop)
            .map(|start| {
                let end = (start + TIME_DOMAIN_WINDOW).min(samples.len());
                mouth_volume(&samples[start..end])
            })
            .collect();
        Self {
            frames_per_second: fps,
            levels,
        }
    }

    pub fn frame_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.frames_per_second))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_keeps_mouth_closed() {
        assert_eq!(mouth_volume(&[0.0; 64]), 0.0);
        assert_eq!(mouth_volume(&[]), 0.0);
    }

    #[test]
    fn loud_speech_opens_mouth() {
        let level = mouth_volume(&[0.0, 0.5, -0.6]);
        assert!(level > 0.99, "level {level}");
    }

    #[test]
    fn curve_midpoint() {
        // 45 * p - 5 == 0 at p = 1/9.
        let level = mouth_volume(&[1.0 / 9.0]);
        assert!((level - 0.5).abs() < 1e-4);
    }

    #[test]
    fn envelope_has_one_level_per_frame() {
        let samples = vec![0.5f32; 48_000];
        let envelope = LipSyncEnvelope::analyse(&samples, 48_000, 60);
        assert_eq!(envelope.levels.len(), 60);
        assert!(envelope.levels.iter().all(|&l| l > 0.9));
    }

    #[test]
    fn empty_audio_has_empty_envelope() {
        assert!(LipSyncEnvelope::analyse(&[], 24_000, 60).levels.is_empty());
    }
}
