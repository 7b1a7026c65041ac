//! On-demand variant generation and caching.
//!
//! This module contains the GET path of the asset server:
//!
//! - [`VariantQuery`] / [`VariantParams`]: raw and normalized transform requests
//! - [`VariantKey`]: deterministic cache key for a normalized request
//! - [`SingleFlight`]: at most one concurrent generation per key
//! - [`VariantRenderer`] / [`ImageRenderer`]: decode, transform, encode
//! - [`TransformPool`]: bounded blocking pool the renderer runs on
//! - [`VariantService`]: ties the above to the original and variant stores

mod flight;
mod key;
mod params;
mod pool;
mod render;
mod service;

pub use flight::{Flight, FlightFollower, FlightLeader, SingleFlight};
pub use key::{cache_file_name, VariantKey};
pub use params::{
    split_filename, validate_segment, FitMode, VariantParams, VariantQuery, DEFAULT_EXTENSION,
    DEFAULT_MAX_DIMENSION, DEFAULT_QUALITY, MAX_BLUR, MAX_QUALITY, MIN_QUALITY,
};
pub use pool::TransformPool;
pub use render::{
    encode, original_content_type, outside_dimensions, output_format, variant_content_type,
    ImageRenderer, VariantRenderer,
};
pub use service::{CacheOutcome, VariantResponse, VariantService};
