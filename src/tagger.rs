//! Zero-shot audio tagging
//!
//! At startup every candidate tag is embedded through the text encoder and
//! L2-normalized into a process-wide, read-only vocabulary. Tagging a track
//! is then a single pass of dot products: vocabulary vectors are unit
//! length, so dot product equals cosine similarity.

use crate::embedding::EmbeddingBackend;
use crate::error::EmbeddingError;
use crate::models::EMBEDDING_DIM;
use tracing::{debug, info, warn};

/// Candidate tags for zero-shot matching: genres, moods, instruments,
/// vocals, production styles, and use cases.
pub const CANDIDATE_TAGS: &[&str] = &[
    // Genre
    "hip hop beat",
    "trap beat",
    "lo-fi hip hop",
    "boom bap",
    "drill beat",
    "R&B",
    "pop",
    "electronic dance music",
    "house music",
    "techno",
    "dubstep",
    "drum and bass",
    "ambient",
    "chillwave",
    "synthwave",
    "vaporwave",
    "jazz",
    "soul music",
    "funk",
    "reggae",
    "rock",
    "indie rock",
    "metal",
    "classical music",
    "cinematic orchestral",
    "country",
    "blues",
    "latin music",
    "afrobeat",
    "k-pop",
    "gospel",
    // Mood & vibe
    "dark and moody",
    "upbeat and energetic",
    "melancholic and sad",
    "happy and cheerful",
    "aggressive and intense",
    "calm and relaxing",
    "dreamy and ethereal",
    "epic and cinematic",
    "mysterious and suspenseful",
    "romantic and emotional",
    "nostalgic",
    "futuristic",
    "meditative",
    // Instruments
    "piano",
    "acoustic guitar",
    "electric guitar",
    "bass guitar",
    "violin and strings",
    "saxophone",
    "trumpet and brass",
    "flute",
    "drums and percussion",
    "synthesizer",
    "808 bass",
    "organ",
    "harp",
    "ukulele",
    // Vocals
    "male vocals",
    "female vocals",
    "vocal chops",
    "vocal harmony",
    "rap vocals",
    "singing with autotune",
    "acapella",
    // Production style
    "heavy bass",
    "distorted and glitchy",
    "clean and minimal",
    "lush pads and textures",
    "punchy drums",
    "fast tempo",
    "slow tempo",
    "reverb heavy and spacious",
    "sample based and chopped",
    "acoustic and unplugged",
    // Use case
    "background music",
    "workout and gym music",
    "study music",
    "gaming soundtrack",
    "film score",
    "commercial jingle",
    "meditation and yoga",
    "party music",
];

const SIMILARITY_THRESHOLD: f32 = 0.1;
const TOP_N: usize = 5;
/// Unconditional fallback size when nothing clears the threshold
const FALLBACK_N: usize = 3;

/// Precomputed, L2-normalized tag vectors; immutable after construction
pub struct TagVocabulary {
    tags: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl TagVocabulary {
    /// Embed every candidate tag through the text encoder
    ///
    /// One-time startup cost; runs before the worker connects so tagging is
    /// available from the first task.
    pub async fn precompute(backend: &dyn EmbeddingBackend) -> Result<Self, EmbeddingError> {
        info!(
            tag_count = CANDIDATE_TAGS.len(),
            "precomputing candidate tag embeddings"
        );

        let mut vectors = Vec::with_capacity(CANDIDATE_TAGS.len());
        for tag in CANDIDATE_TAGS {
            vectors.push(backend.text_embedding(tag).await?);
        }

        let vocabulary = Self::from_parts(
            CANDIDATE_TAGS.iter().map(|t| t.to_string()).collect(),
            vectors,
        );
        info!(
            tag_count = vocabulary.tags.len(),
            dim = EMBEDDING_DIM,
            "tag embeddings ready"
        );
        Ok(vocabulary)
    }

    /// Build a vocabulary from explicit tag/vector pairs, normalizing each
    /// vector to unit length (zero vectors are kept as-is)
    ///
    /// Entries whose vector is not `EMBEDDING_DIM` long are dropped with a
    /// warning; a short vector would silently score wrong in the dot pass.
    pub fn from_parts(tags: Vec<String>, vectors: Vec<Vec<f32>>) -> Self {
        let mut kept_tags = Vec::with_capacity(tags.len());
        let mut kept_vectors = Vec::with_capacity(vectors.len());
        for (tag, v) in tags.into_iter().zip(vectors) {
            if v.len() != EMBEDDING_DIM {
                warn!(
                    tag = %tag,
                    dim = v.len(),
                    expected = EMBEDDING_DIM,
                    "tag vector has wrong dimension, dropping"
                );
                continue;
            }
            let norm = l2_norm(&v);
            kept_tags.push(tag);
            kept_vectors.push(if norm == 0.0 {
                v
            } else {
                v.into_iter().map(|x| x / norm).collect()
            });
        }
        Self {
            tags: kept_tags,
            vectors: kept_vectors,
        }
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Zero-shot tag matcher
///
/// Holds the vocabulary when precomputation succeeded; without it the
/// matcher degrades to "no match" instead of failing tasks.
pub struct ZeroShotTagger {
    vocabulary: Option<TagVocabulary>,
}

impl ZeroShotTagger {
    pub fn new(vocabulary: Option<TagVocabulary>) -> Self {
        Self { vocabulary }
    }

    /// Disabled matcher (vocabulary precomputation failed or was skipped)
    pub fn disabled() -> Self {
        Self { vocabulary: None }
    }

    /// Match an audio embedding against the vocabulary
    ///
    /// Returns the matched tags comma-joined in descending-similarity
    /// order, or `None` when the vocabulary is unavailable or the query
    /// has zero norm.
    pub fn match_tags(&self, audio_vector: &[f32]) -> Option<String> {
        let vocabulary = match &self.vocabulary {
            Some(v) if !v.is_empty() => v,
            _ => {
                warn!("tag vocabulary not available, skipping auto-tagging");
                return None;
            }
        };

        let norm = l2_norm(audio_vector);
        if norm == 0.0 {
            warn!("audio vector has zero norm, skipping auto-tagging");
            return None;
        }
        let query: Vec<f32> = audio_vector.iter().map(|x| x / norm).collect();

        // Vocabulary vectors are pre-normalized: dot product = cosine
        let mut scored: Vec<(usize, f32)> = vocabulary
            .vectors
            .iter()
            .map(|v| dot(&query, v))
            .enumerate()
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let top10: Vec<String> = scored
            .iter()
            .take(10)
            .map(|&(i, score)| format!("{}({:.3})", vocabulary.tags[i], score))
            .collect();
        debug!(top10 = %top10.join(" | "), "similarity ranking");

        let mut matched: Vec<(usize, f32)> = scored
            .iter()
            .take(TOP_N)
            .filter(|&&(_, score)| score >= SIMILARITY_THRESHOLD)
            .copied()
            .collect();

        if matched.is_empty() {
            // Best-effort guarantee: always return something for a usable
            // query against a non-empty vocabulary
            debug!(
                threshold = SIMILARITY_THRESHOLD,
                best = scored.first().map(|&(_, s)| s).unwrap_or(0.0),
                "no tag cleared the threshold, falling back to top {}",
                FALLBACK_N
            );
            matched = scored.iter().take(FALLBACK_N).copied().collect();
        }

        let joined = matched
            .iter()
            .map(|&(i, _)| vocabulary.tags[i].as_str())
            .collect::<Vec<_>>()
            .join(",");
        info!(tags = %joined, "auto-tagging complete");
        Some(joined)
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
