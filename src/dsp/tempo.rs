//! Beat tracking via onset-strength autocorrelation
//!
//! Two-step estimate: a spectral-flux onset envelope (median-aggregated,
//! log-magnitude, half-wave rectified), then short-term autocorrelation of
//! that envelope computed with the Wiener-Khinchin theorem. The best lag in
//! the 30-240 BPM range wins, weighted by a log-normal prior centered on
//! 120 BPM so octave errors resolve toward common tempi.

use num_complex::Complex;
use rustfft::FftPlanner;

const FRAME_SIZE: usize = 1024;
const HOP_SIZE: usize = 512;

const MIN_BPM: f32 = 30.0;
const MAX_BPM: f32 = 240.0;
const PRIOR_CENTER_BPM: f32 = 120.0;

/// Estimate the dominant tempo of a mono signal in BPM
///
/// Returns 0.0 when the signal is too short to carry a beat; callers
/// normalize through [`to_bpm`].
pub fn track_tempo(samples: &[f32], sample_rate: u32) -> f32 {
    let envelope = onset_envelope(samples);
    if envelope.len() < 4 || envelope.iter().all(|&v| v <= 1e-9) {
        return 0.0;
    }

    let acf = autocorrelate(&envelope);
    let frames_per_second = sample_rate as f32 / HOP_SIZE as f32;

    let min_lag = ((60.0 / MAX_BPM) * frames_per_second).floor().max(1.0) as usize;
    let max_lag = ((60.0 / MIN_BPM) * frames_per_second).ceil() as usize;
    let max_lag = max_lag.min(acf.len().saturating_sub(1));
    if min_lag >= max_lag {
        return 0.0;
    }

    let mut best_bpm = 0.0f32;
    let mut best_score = f32::NEG_INFINITY;
    for lag in min_lag..=max_lag {
        let bpm = 60.0 * frames_per_second / lag as f32;
        let score = acf[lag] * tempo_prior(bpm);
        if score > best_score {
            best_score = score;
            best_bpm = bpm;
        }
    }

    best_bpm
}

/// Normalize a raw tempo estimate to a positive integer BPM
///
/// Rounding with a floor of 1, so a silent or degenerate input never
/// produces a zero BPM in the persisted record.
pub fn to_bpm(tempo: f32) -> u32 {
    if !tempo.is_finite() {
        return 1;
    }
    (tempo.round() as i64).max(1) as u32
}

/// Spectral-flux onset strength envelope, one value per hop
fn onset_envelope(samples: &[f32]) -> Vec<f32> {
    if samples.len() < FRAME_SIZE {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FRAME_SIZE);

    let window: Vec<f32> = (0..FRAME_SIZE)
        .map(|i| {
            let t = i as f32 / (FRAME_SIZE - 1) as f32;
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
        })
        .collect();

    let num_frames = (samples.len() - FRAME_SIZE) / HOP_SIZE + 1;
    let mut envelope = Vec::with_capacity(num_frames);
    let mut prev_magnitudes = vec![0.0f32; FRAME_SIZE / 2 + 1];

    for frame_idx in 0..num_frames {
        let start = frame_idx * HOP_SIZE;
        let mut buffer: Vec<Complex<f32>> = samples[start..start + FRAME_SIZE]
            .iter()
            .zip(window.iter())
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();

        fft.process(&mut buffer);

        let magnitudes: Vec<f32> = buffer[..FRAME_SIZE / 2 + 1]
            .iter()
            .map(|c| (c.re * c.re + c.im * c.im).sqrt())
            .collect();

        // Log-magnitude flux, half-wave rectified, median-aggregated across
        // bins for robustness against broadband noise
        let mut diffs: Vec<f32> = magnitudes
            .iter()
            .zip(prev_magnitudes.iter())
            .map(|(cur, prev)| ((cur + 1e-10).ln() - (prev + 1e-10).ln()).max(0.0))
            .collect();
        diffs.sort_by(|a, b| a.total_cmp(b));
        envelope.push(diffs[diffs.len() / 2]);

        prev_magnitudes = magnitudes;
    }

    envelope
}

/// Autocorrelation of the onset envelope via FFT (Wiener-Khinchin)
fn autocorrelate(envelope: &[f32]) -> Vec<f32> {
    let fft_len = (envelope.len() * 2).next_power_of_two();

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_len);
    let ifft = planner.plan_fft_inverse(fft_len);

    let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
    let mut buffer: Vec<Complex<f32>> = envelope
        .iter()
        .map(|&s| Complex::new(s - mean, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(fft_len)
        .collect();

    fft.process(&mut buffer);
    for c in buffer.iter_mut() {
        let power = c.re * c.re + c.im * c.im;
        *c = Complex::new(power, 0.0);
    }
    ifft.process(&mut buffer);

    let scale = 1.0 / fft_len as f32;
    buffer
        .iter()
        .map(|c| c.re * scale)
        .take(envelope.len())
        .collect()
}

/// Log-normal weighting favoring tempi near 120 BPM
fn tempo_prior(bpm: f32) -> f32 {
    let x = (bpm / PRIOR_CENTER_BPM).log2();
    (-0.5 * x * x).exp()
}
