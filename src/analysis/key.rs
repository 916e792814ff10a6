//! Musical key estimation (Krumhansl-Schmuckler profile correlation)
//!
//! The time-averaged chroma distribution is correlated against the
//! literature major/minor pitch-class profiles at every cyclic rotation;
//! the best of the 24 candidates names the key.

/// Pitch-class names, chroma bin order (C = 0)
const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Krumhansl-Schmuckler major-key profile
const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Schmuckler minor-key profile
const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Key returned when the chroma distribution carries no information
const DEFAULT_KEY: &str = "C Major";

/// Estimate the musical key from a 12-dimensional mean chroma vector
///
/// For each tonal center the chroma vector is rotated so that bin `shift`
/// lands at index 0, then Pearson-correlated against both mode profiles.
/// Ties resolve first-seen: major before minor, ascending shift. A
/// degenerate (all-zero) input yields NaN correlations everywhere; the
/// strict `>` comparison against a -2.0 seed means NaN never wins and the
/// default key comes back instead.
pub fn estimate_key(chroma_mean: &[f64; 12]) -> String {
    let mut best_corr = -2.0;
    let mut best_key = DEFAULT_KEY.to_string();

    for shift in 0..12 {
        let mut rotated = [0.0f64; 12];
        for (i, r) in rotated.iter_mut().enumerate() {
            *r = chroma_mean[(i + shift) % 12];
        }

        let major_corr = pearson(&rotated, &MAJOR_PROFILE);
        if major_corr > best_corr {
            best_corr = major_corr;
            best_key = format!("{} Major", PITCH_CLASSES[shift]);
        }

        let minor_corr = pearson(&rotated, &MINOR_PROFILE);
        if minor_corr > best_corr {
            best_corr = minor_corr;
            best_key = format!("{} Minor", PITCH_CLASSES[shift]);
        }
    }

    best_key
}

/// Pearson correlation coefficient of two 12-dim vectors
///
/// NaN when either input has zero variance; callers rely on NaN comparing
/// false against any candidate.
fn pearson(a: &[f64; 12], b: &[f64; 12]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    cov / (var_a.sqrt() * var_b.sqrt())
}
