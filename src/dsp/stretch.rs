//! Tempo-only time stretch (WSOLA)
//!
//! Waveform-similarity overlap-add: Hann grains are laid down at a fixed
//! output hop while the read position advances at `hop / factor`. Each
//! grain is nudged within a small tolerance so that it continues the
//! waveform of the previous grain, which keeps pitch intact. Alignment is
//! computed once on the mono mix and applied to every channel so stereo
//! images stay locked.

use serde_json::{json, Value};

use super::{ChainPosition, Effect};
use crate::engine::AudioBuffer;
use crate::error::Result;
use crate::impl_effect_common;

/// Smallest usable grain
const MIN_WINDOW: usize = 64;

/// Correlation is evaluated on every n-th sample
const CORRELATION_STRIDE: usize = 2;

/// Periodic Hann window; overlaps at 50% sum to exactly one
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / size as f64).cos() as f32
        })
        .collect()
}

/// Find the read position near `nominal` that best continues `natural`
fn best_alignment(
    mono: &[f32],
    natural: usize,
    nominal: usize,
    tolerance: usize,
    compare_len: usize,
    max_start: usize,
) -> usize {
    if natural + compare_len > mono.len() {
        return nominal;
    }
    let reference = &mono[natural..natural + compare_len];

    let score = |start: usize| -> f32 {
        let candidate = &mono[start..start + compare_len];
        let mut corr = 0.0_f32;
        let mut energy = 0.0_f32;
        for j in (0..compare_len).step_by(CORRELATION_STRIDE) {
            corr += reference[j] * candidate[j];
            energy += candidate[j] * candidate[j];
        }
        corr / (energy + 1e-9).sqrt()
    };

    let mut best_start = nominal;
    let mut best_score = score(nominal);

    let low = nominal.saturating_sub(tolerance);
    let high = (nominal + tolerance).min(max_start);
    for start in low..=high {
        if start == nominal {
            continue;
        }
        let s = score(start);
        if s > best_score {
            best_score = s;
            best_start = start;
        }
    }

    best_start
}

/// Stretch `buffer` so its length becomes `round(len * factor)`
///
/// `factor > 1` slows the tempo down. Pitch is preserved.
pub fn wsola(buffer: &AudioBuffer, factor: f64, window: usize) -> AudioBuffer {
    let n = buffer.len();
    let out_len = (n as f64 * factor).round() as usize;
    let channels = buffer.channels();

    let window = (window.max(MIN_WINDOW) / 2) * 2;

    // Too short for grains: keep the audio, pad with silence
    if n < window * 2 {
        let samples = buffer
            .samples
            .iter()
            .map(|ch| {
                let mut out = ch.clone();
                out.resize(out_len, 0.0);
                out
            })
            .collect();
        return AudioBuffer {
            samples,
            sample_rate: buffer.sample_rate,
        };
    }

    let hop_out = window / 2;
    let tolerance = hop_out / 4;
    let max_start = n - window;
    let hann = hann_window(window);
    let mono = buffer.mono_mix();

    let mut out = vec![vec![0.0_f32; out_len + window]; channels];
    let mut norm = vec![0.0_f32; out_len + window];
    let mut prev_start: Option<usize> = None;

    let mut out_pos = 0;
    while out_pos < out_len {
        let nominal = ((out_pos as f64 / factor).round() as usize).min(max_start);
        let start = match prev_start {
            None => nominal,
            Some(prev) => {
                best_alignment(&mono, prev + hop_out, nominal, tolerance, hop_out, max_start)
            }
        };

        for i in 0..window {
            // The first grain has no predecessor to fade in against
            let weight = if prev_start.is_none() && i < hop_out {
                1.0
            } else {
                hann[i]
            };
            for (ch, out_ch) in out.iter_mut().enumerate() {
                out_ch[out_pos + i] += buffer.samples[ch][start + i] * weight;
            }
            norm[out_pos + i] += weight;
        }

        prev_start = Some(start);
        out_pos += hop_out;
    }

    for out_ch in &mut out {
        out_ch.truncate(out_len);
        for (sample, &w) in out_ch.iter_mut().zip(norm.iter()) {
            if w > 1e-3 {
                *sample /= w;
            }
        }
    }

    AudioBuffer {
        samples: out,
        sample_rate: buffer.sample_rate,
    }
}

/// Beat slowdown stage
#[derive(Debug, Clone)]
pub struct TimeStretch {
    ratio: f64,
    window_ms: f32,
    window: usize,
}

impl TimeStretch {
    /// Create a stretch for a tempo `ratio` (output = input / ratio)
    pub fn new(ratio: f64, window_ms: f32) -> Self {
        Self {
            ratio,
            window_ms,
            window: 0,
        }
    }
}

impl Effect for TimeStretch {
    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        if buffer.is_empty() || self.ratio <= 0.0 {
            return Ok(());
        }
        *buffer = wsola(buffer, 1.0 / self.ratio, self.window);
        Ok(())
    }

    fn prepare(&mut self, sample_rate: u32, _num_channels: usize) {
        self.window = (self.window_ms / 1000.0 * sample_rate as f32) as usize;
    }

    fn reset(&mut self) {}

    fn params(&self) -> Value {
        json!({ "ratio": self.ratio, "window_ms": self.window_ms })
    }

    impl_effect_common!("time_stretch", "Beat Slowdown", ChainPosition::Tempo);
}
