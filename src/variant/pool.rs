//! Bounded pool for CPU-bound transforms.
//!
//! Rendering runs on tokio's blocking threads so the request executor stays
//! responsive. A semaphore caps how many renders run at once; requests beyond
//! the cap queue for a permit.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Semaphore;

use crate::error::VariantError;

use super::params::VariantParams;
use super::render::VariantRenderer;

/// Runs a [`VariantRenderer`] with bounded parallelism.
pub struct TransformPool<R: VariantRenderer> {
    renderer: Arc<R>,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl<R: VariantRenderer> Clone for TransformPool<R> {
    fn clone(&self) -> Self {
        Self {
            renderer: Arc::clone(&self.renderer),
            permits: Arc::clone(&self.permits),
            workers: self.workers,
        }
    }
}

impl<R: VariantRenderer> TransformPool<R> {
    /// Create a pool running at most `workers` renders at once (minimum 1).
    pub fn new(renderer: R, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            renderer: Arc::new(renderer),
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// The wrapped renderer.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Maximum number of concurrent renders.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Render `params` from `source` on a blocking thread.
    pub async fn render(&self, source: Bytes, params: VariantParams) -> Result<Bytes, VariantError> {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| VariantError::GenerationAborted {
                message: "transform pool is closed".to_string(),
            })?;

        let renderer = Arc::clone(&self.renderer);
        tokio::task::spawn_blocking(move || renderer.render(&source, &params))
            .await
            .map_err(|e| VariantError::GenerationAborted {
                message: format!("transform task failed: {}", e),
            })?
    }
}
