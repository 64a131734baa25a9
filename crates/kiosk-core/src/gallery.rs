//! Known-person gallery and query-to-gallery name resolution.
//!
//! The gallery is loaded once at startup and never mutated afterwards.
//! Retraining happens out of process; a restart is needed to pick it up.

use crate::types::{Embedding, FrameDetection, UNKNOWN};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("failed to read gallery {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid gallery document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("gallery has {embeddings} embeddings but {names} names")]
    LengthMismatch { embeddings: usize, names: usize },
}

/// On-disk layout produced by the training tool.
#[derive(Debug, Deserialize)]
struct GalleryFile {
    #[serde(default)]
    encodings: Vec<Embedding>,
    #[serde(default)]
    names: Vec<String>,
}

/// One stored embedding and the person it belongs to.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub name: String,
    pub embedding: Embedding,
}

/// Immutable set of known face embeddings. A person may appear in several entries.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Pair embeddings with names, lower-casing every name.
    pub fn from_parts(embeddings: Vec<Embedding>, names: Vec<String>) -> Result<Self, GalleryError> {
        if embeddings.len() != names.len() {
            return Err(GalleryError::LengthMismatch {
                embeddings: embeddings.len(),
                names: names.len(),
            });
        }
        let entries = embeddings
            .into_iter()
            .zip(names)
            .map(|(embedding, name)| GalleryEntry {
                name: name.to_lowercase(),
                embedding,
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn from_json(json: &str) -> Result<Self, GalleryError> {
        let file: GalleryFile = serde_json::from_str(json)?;
        Self::from_parts(file.encodings, file.names)
    }

    /// Load a gallery document from disk.
    pub fn load(path: &Path) -> Result<Self, GalleryError> {
        let json = std::fs::read_to_string(path).map_err(|source| GalleryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let gallery = Self::from_json(&json)?;
        tracing::info!(
            path = %path.display(),
            embeddings = gallery.len(),
            people = gallery.people().len(),
            "gallery loaded"
        );
        Ok(gallery)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    /// Number of stored embeddings per person, sorted by name.
    pub fn people(&self) -> BTreeMap<&str, usize> {
        let mut people = BTreeMap::new();
        for entry in &self.entries {
            *people.entry(entry.name.as_str()).or_insert(0) += 1;
        }
        people
    }
}

/// Strategy for resolving a query embedding to a gallery identity.
pub trait Matcher: Send + Sync {
    fn resolve(&self, query: &Embedding, gallery: &Gallery, threshold: f32) -> FrameDetection;
}

/// Nearest-neighbour matcher over Euclidean distance.
///
/// The nearest entry's name is accepted only when its distance is at most
/// `threshold`; otherwise the name is [`UNKNOWN`] but the rejected distance
/// is still reported. Ties keep the first entry.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn resolve(&self, query: &Embedding, gallery: &Gallery, threshold: f32) -> FrameDetection {
        let mut best: Option<(usize, f32)> = None;

        for (i, entry) in gallery.entries.iter().enumerate() {
            let Some(d) = query.euclidean_distance(&entry.embedding) else {
                continue;
            };
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((i, d));
            }
        }

        match best {
            Some((idx, d)) if d <= threshold => FrameDetection {
                name: gallery.entries[idx].name.clone(),
                distance: Some(d),
            },
            Some((_, d)) => FrameDetection {
                name: UNKNOWN.to_string(),
                distance: Some(d),
            },
            None => FrameDetection::unknown(),
        }
    }
}
