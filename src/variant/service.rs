//! Variant service: the GET path end to end.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           VariantService                             │
//! │                                                                      │
//! │  fetch(tenant, filename, query)                                      │
//! │    1. normalize ─── 400 before any I/O                               │
//! │    2. resolve original ─── 404 / 409                                 │
//! │    3. passthrough? ─── stream original bytes                         │
//! │    4. key ─► SingleFlight::acquire_or_join                           │
//! │          ├── Published ─► read variant                (hit)          │
//! │          ├── Follower  ─► wait, read variant          (joined)       │
//! │          └── Leader    ─► spawn: read original ─► TransformPool      │
//! │                                  ─► publish ─► settle  (miss)        │
//! │                                                                      │
//! │  ┌───────────────┐  ┌──────────────┐  ┌─────────────┐  ┌──────────┐  │
//! │  │ OriginalStore │  │ VariantStore │  │ SingleFlight│  │ Transform│  │
//! │  │               │  │  + publish   │  │             │  │   Pool   │  │
//! │  └───────────────┘  └──────────────┘  └─────────────┘  └──────────┘  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The leader's generation runs in its own task. A client that disconnects
//! drops only its wait; the variant is still generated, published, and handed
//! to every follower.

use std::fmt;
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::VariantError;
use crate::storage::{OriginalAsset, OriginalStore, VariantStore};

use super::flight::{Flight, FlightLeader, SingleFlight};
use super::key::VariantKey;
use super::params::{split_filename, validate_segment, VariantParams, VariantQuery, DEFAULT_MAX_DIMENSION};
use super::pool::TransformPool;
use super::render::{original_content_type, variant_content_type, ImageRenderer, VariantRenderer};

// =============================================================================
// Variant Response
// =============================================================================

/// How a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from an already published variant
    Hit,
    /// Generated by this request
    Miss,
    /// Generated by a concurrent request this one waited on
    Joined,
    /// The original itself, no variant involved
    Passthrough,
}

impl CacheOutcome {
    /// Header spelling of the outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Joined => "joined",
            CacheOutcome::Passthrough => "passthrough",
        }
    }
}

impl fmt::Display for CacheOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response from the variant service.
#[derive(Debug, Clone)]
pub struct VariantResponse {
    /// Image bytes
    pub data: Bytes,

    /// MIME type for the bytes
    pub content_type: String,

    /// How the bytes were obtained
    pub outcome: CacheOutcome,
}

// =============================================================================
// Variant Service
// =============================================================================

/// Serves originals and on-demand variants.
///
/// # Type Parameters
///
/// * `R` - The renderer used for cache misses (defaults to [`ImageRenderer`])
pub struct VariantService<R: VariantRenderer = ImageRenderer> {
    originals: OriginalStore,
    variants: VariantStore,
    flights: SingleFlight,
    pool: TransformPool<R>,
    max_dimension: u32,
}

impl<R: VariantRenderer> VariantService<R> {
    /// Create a service over the given stores.
    ///
    /// `workers` bounds how many renders run concurrently.
    pub fn new(originals: OriginalStore, variants: VariantStore, renderer: R, workers: usize) -> Self {
        Self {
            originals,
            variants,
            flights: SingleFlight::new(),
            pool: TransformPool::new(renderer, workers),
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    /// Set the largest accepted width or height.
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    /// The original store.
    pub fn originals(&self) -> &OriginalStore {
        &self.originals
    }

    /// The variant store.
    pub fn variants(&self) -> &VariantStore {
        &self.variants
    }

    /// The single-flight coordinator.
    pub fn flights(&self) -> &SingleFlight {
        &self.flights
    }

    /// The renderer used for cache misses.
    pub fn renderer(&self) -> &R {
        self.pool.renderer()
    }

    /// Validate and normalize a request without touching storage.
    pub fn normalize(
        &self,
        tenant: &str,
        filename: &str,
        query: &VariantQuery,
    ) -> Result<VariantParams, VariantError> {
        validate_segment("tenant", tenant)?;
        let (basename, extension) = split_filename(filename);
        query.normalize(basename, extension, self.max_dimension)
    }

    /// Serve `filename` for `tenant`, generating the variant if needed.
    pub async fn fetch(
        &self,
        tenant: &str,
        filename: &str,
        query: &VariantQuery,
    ) -> Result<VariantResponse, VariantError> {
        let params = self.normalize(tenant, filename, query)?;
        let original = self.originals.resolve(tenant, &params.basename).await?;

        if params.is_passthrough(&original.extension) {
            debug!(tenant = %tenant, basename = %params.basename, "Serving original");
            let data = original.read().await?;
            return Ok(VariantResponse {
                data,
                content_type: original_content_type(&original.extension),
                outcome: CacheOutcome::Passthrough,
            });
        }

        let key = VariantKey::new(tenant, &params);
        let content_type = variant_content_type(&params.extension).to_string();

        let (data, outcome) = match self.flights.acquire_or_join(&key, &self.variants).await {
            Flight::Published => (self.variants.read(&key).await?, CacheOutcome::Hit),
            Flight::Follower(follower) => {
                follower.wait().await?;
                (self.variants.read(&key).await?, CacheOutcome::Joined)
            }
            Flight::Leader(leader) => {
                let generation = tokio::spawn(generate(
                    self.pool.clone(),
                    self.variants.clone(),
                    original,
                    params,
                    leader,
                ));
                let data = generation
                    .await
                    .map_err(|e| VariantError::GenerationAborted {
                        message: format!("generation task failed: {}", e),
                    })??;
                (data, CacheOutcome::Miss)
            }
        };

        debug!(key = %key, outcome = %outcome, bytes = data.len(), "Serving variant");
        Ok(VariantResponse {
            data,
            content_type,
            outcome,
        })
    }
}

/// Render, publish and settle one variant. Runs as the leader's own task.
async fn generate<R: VariantRenderer>(
    pool: TransformPool<R>,
    variants: VariantStore,
    original: OriginalAsset,
    params: VariantParams,
    leader: FlightLeader,
) -> Result<Bytes, VariantError> {
    let start = Instant::now();
    let key = leader.key().clone();

    let result = async {
        let source = original.read().await?;
        let data = pool.render(source, params).await?;
        variants.publish(&key, &data).await?;
        Ok::<_, VariantError>(data)
    }
    .await;

    match &result {
        Ok(data) => info!(
            key = %key,
            bytes = data.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Generated variant"
        ),
        Err(e) => warn!(key = %key, error = %e, "Variant generation failed"),
    }

    leader.complete(result.as_ref().map(|_| ()).map_err(Clone::clone));
    result
}
