//! Chroma feature extraction
//!
//! Short-time Fourier magnitudes folded onto the 12 pitch classes. Coarser
//! than a constant-Q transform but sufficient for profile-correlation key
//! estimation, which only consumes the time-averaged distribution.

use num_complex::Complex;
use rustfft::FftPlanner;

const FRAME_SIZE: usize = 8192;
const HOP_SIZE: usize = 2048;

/// Band considered for pitch-class folding. Below A1 the FFT bins are too
/// coarse to separate semitones; above 2 kHz harmonics dominate.
const MIN_FREQ: f32 = 55.0;
const MAX_FREQ: f32 = 2000.0;

/// Compute a chromagram: one 12-bin energy distribution per analysis frame
///
/// Returns an empty vector when the signal is shorter than one frame.
pub fn chroma_features(samples: &[f32], sample_rate: u32) -> Vec<[f32; 12]> {
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

    let bin_hz = sample_rate as f32 / FRAME_SIZE as f32;
    let num_frames = (samples.len() - FRAME_SIZE) / HOP_SIZE + 1;
    let mut frames = Vec::with_capacity(num_frames);

    for frame_idx in 0..num_frames {
        let start = frame_idx * HOP_SIZE;
        let mut buffer: Vec<Complex<f32>> = samples[start..start + FRAME_SIZE]
            .iter()
            .zip(window.iter())
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();

        fft.process(&mut buffer);

        let mut bins = [0.0f32; 12];
        for (k, c) in buffer[..FRAME_SIZE / 2 + 1].iter().enumerate() {
            let freq = k as f32 * bin_hz;
            if freq < MIN_FREQ || freq > MAX_FREQ {
                continue;
            }
            let magnitude = (c.re * c.re + c.im * c.im).sqrt();
            bins[pitch_class(freq)] += magnitude;
        }
        frames.push(bins);
    }

    frames
}

/// Reduce a chromagram to its 12-dimensional mean energy vector
pub fn mean_chroma(frames: &[[f32; 12]]) -> [f64; 12] {
    let mut mean = [0.0f64; 12];
    if frames.is_empty() {
        return mean;
    }
    for frame in frames {
        for (m, &v) in mean.iter_mut().zip(frame.iter()) {
            *m += v as f64;
        }
    }
    for m in mean.iter_mut() {
        *m /= frames.len() as f64;
    }
    mean
}

/// Map a frequency to its pitch class (0 = C, 9 = A)
fn pitch_class(freq: f32) -> usize {
    let midi = 69.0 + 12.0 * (freq / 440.0).log2();
    (midi.round() as i32).rem_euclid(12) as usize
}
