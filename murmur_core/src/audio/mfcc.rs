//! Mel-frequency cepstral coefficients.
//!
//! Centered STFT with reflect padding and a periodic Hann window, power
//! spectrum, Slaney mel filter bank, dB scaling with an 80 dB floor and an
//! orthonormal DCT-II over the mel axis.

use std::f64::consts::PI;
use std::sync::Arc;

use ndarray::Array2;
use realfft::{RealFftPlanner, RealToComplex};

use crate::config::FeatureConfig;

const AMIN: f32 = 1e-10;

/// Precomputed FFT plan, window, filter bank and DCT basis.
///
/// `compute` allocates its own buffers, so one extractor can be shared
/// between threads.
pub struct MfccExtractor {
    config: FeatureConfig,
    plan: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    mel_filters: Array2<f32>,
    dct: Array2<f32>,
}

impl MfccExtractor {
    /// # Panics
    /// Panics if `n_fft` is 0.
    pub fn new(config: &FeatureConfig) -> Self {
        assert!(config.n_fft > 0, "FFT size must be > 0");

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(config.n_fft);

        Self {
            config: config.clone(),
            plan,
            window: hann_window(config.n_fft),
            mel_filters: mel_filter_bank(config.sample_rate, config.n_fft, config.n_mels),
            dct: dct_ortho_basis(config.n_mfcc, config.n_mels),
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// MFCC matrix of shape `(n_mfcc, frames)` with `frames = 1 + len / hop`.
    pub fn compute(&self, samples: &[f32]) -> Array2<f32> {
        let power = self.power_spectrogram(samples);
        let mel = self.mel_filters.dot(&power);
        let mel_db = power_to_db(&mel, self.config.top_db);
        self.dct.dot(&mel_db)
    }

    /// Power spectrogram of shape `(n_fft / 2 + 1, frames)`.
    pub fn power_spectrogram(&self, samples: &[f32]) -> Array2<f32> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let padded = reflect_pad(samples, n_fft / 2);
        let frames = self.config.frames_for(samples.len());
        let bins = n_fft / 2 + 1;

        let mut input = self.plan.make_input_vec();
        let mut spectrum = self.plan.make_output_vec();
        let mut scratch = self.plan.make_scratch_vec();
        let mut power = Array2::<f32>::zeros((bins, frames));

        for t in 0..frames {
            let start = t * hop;
            for (i, slot) in input.iter_mut().enumerate() {
                *slot = padded.get(start + i).copied().unwrap_or(0.0) * self.window[i];
            }

            if self
                .plan
                .process_with_scratch(&mut input, &mut spectrum, &mut scratch)
                .is_err()
            {
                // Buffer sizes come from the plan itself; leave the frame silent.
                continue;
            }

            for (k, c) in spectrum.iter().enumerate() {
                power[[k, t]] = c.re * c.re + c.im * c.im;
            }
        }

        power
    }
}

/// Periodic Hann window.
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| (0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos())) as f32)
        .collect()
}

/// Mirrors `pad` samples at each end, not repeating the edge sample.
///
/// Inputs too short to mirror are zero-padded instead.
fn reflect_pad(samples: &[f32], pad: usize) -> Vec<f32> {
    let n = samples.len();
    let mut out = Vec::with_capacity(n + 2 * pad);

    if n <= pad {
        out.resize(pad, 0.0);
        out.extend_from_slice(samples);
        out.resize(n + 2 * pad, 0.0);
        return out;
    }

    out.extend((1..=pad).rev().map(|i| samples[i]));
    out.extend_from_slice(samples);
    out.extend((1..=pad).map(|i| samples[n - 1 - i]));
    out
}

fn hz_to_mel(freq: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f64.ln() / 27.0;

    if freq >= MIN_LOG_HZ {
        MIN_LOG_MEL + (freq / MIN_LOG_HZ).ln() / logstep
    } else {
        freq / F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f64.ln() / 27.0;

    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (logstep * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Slaney-normalized triangular filters from 0 Hz to Nyquist, `(n_mels, n_fft / 2 + 1)`.
pub fn mel_filter_bank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Array2<f32> {
    let bins = n_fft / 2 + 1;
    let nyquist = f64::from(sample_rate) / 2.0;

    let fft_freqs: Vec<f64> = (0..bins)
        .map(|k| k as f64 * f64::from(sample_rate) / n_fft as f64)
        .collect();

    let mel_max = hz_to_mel(nyquist);
    let mel_freqs: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
        .collect();

    let mut filters = Array2::<f32>::zeros((n_mels, bins));
    for m in 0..n_mels {
        let (lo, center, hi) = (mel_freqs[m], mel_freqs[m + 1], mel_freqs[m + 2]);
        let enorm = 2.0 / (hi - lo);

        for (k, &f) in fft_freqs.iter().enumerate() {
            let lower = (f - lo) / (center - lo);
            let upper = (hi - f) / (hi - center);
            let weight = lower.min(upper).max(0.0);
            filters[[m, k]] = (weight * enorm) as f32;
        }
    }

    filters
}

/// `10 * log10(max(S, 1e-10))`, floored at `max - top_db`.
pub fn power_to_db(power: &Array2<f32>, top_db: f32) -> Array2<f32> {
    let db = power.mapv(|p| 10.0 * p.max(AMIN).log10());
    let peak = db.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let floor = peak - top_db;
    db.mapv(|v| v.max(floor))
}

/// First `n_out` rows of the orthonormal DCT-II matrix of size `n_in`.
pub fn dct_ortho_basis(n_out: usize, n_in: usize) -> Array2<f32> {
    let n = n_in as f64;
    Array2::from_shape_fn((n_out, n_in), |(k, i)| {
        let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
        (scale * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos()) as f32
    })
}
