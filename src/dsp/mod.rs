//! Signal-processing primitives for the Analysis Stage
//!
//! These are deliberately self-contained: the Analysis Stage treats them as
//! opaque functions (decode, chroma features, beat tracking) and only depends
//! on their contracts.

pub mod chroma;
pub mod decode;
pub mod tempo;

pub use decode::{decode_audio_file, DecodedAudio};
