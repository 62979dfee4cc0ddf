//! Diagnostic sinks for similarity maps.
//!
//! The encoder hands each offset's `(N, G, L, L)` similarity tensor to an
//! optional sink. Sinks only observe; they never change the forward result.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use candle_core::Tensor;
use tracing::debug;

use crate::error::BoundaryResult;

/// Receiver of similarity maps emitted during a forward pass.
pub trait SimilaritySink: Send + Sync {
    fn record(&self, offset: usize, similarity: &Tensor) -> BoundaryResult<()>;
}

/// One map captured by [`MemorySink`].
#[derive(Debug, Clone)]
pub struct RecordedSimilarity {
    pub offset: usize,
    pub map: Tensor,
}

/// Keeps detached copies of every recorded map in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    maps: Mutex<Vec<RecordedSimilarity>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps recorded so far, in emission order.
    pub fn recorded(&self) -> Vec<RecordedSimilarity> {
        self.maps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.maps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SimilaritySink for MemorySink {
    fn record(&self, offset: usize, similarity: &Tensor) -> BoundaryResult<()> {
        self.maps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedSimilarity {
                offset,
                map: similarity.detach(),
            });
        Ok(())
    }
}

/// Writes each map to `similarity_maps{index}.safetensors` under a directory.
///
/// Each file holds a `similarity` tensor and a scalar `offset` tensor. The
/// index increases monotonically across calls.
#[derive(Debug)]
pub struct SafetensorsDirSink {
    dir: PathBuf,
    next_index: AtomicUsize,
}

impl SafetensorsDirSink {
    /// Create the sink, creating `dir` if needed.
    pub fn new(dir: impl AsRef<Path>) -> BoundaryResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            next_index: AtomicUsize::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of files written so far.
    pub fn written(&self) -> usize {
        self.next_index.load(Ordering::SeqCst)
    }
}

impl SimilaritySink for SafetensorsDirSink {
    fn record(&self, offset: usize, similarity: &Tensor) -> BoundaryResult<()> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let path = self
            .dir
            .join(format!("similarity_maps{}.safetensors", index));

        let mut tensors = HashMap::new();
        tensors.insert("similarity", similarity.detach());
        tensors.insert(
            "offset",
            Tensor::new(offset as u32, similarity.device())?,
        );
        candle_core::safetensors::save(&tensors, &path)?;

        debug!(path = %path.display(), offset, "Wrote similarity map");
        Ok(())
    }
}
