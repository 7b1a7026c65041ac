//! On-disk storage for originals and rendered variants.
//!
//! # Layout
//!
//! ```text
//! {root}/
//! └── {tenant}/
//!     ├── {stem}-{uploadMillis}.{ext}      originals
//!     └── cache/
//!         └── {variant key}                rendered variants
//! ```
//!
//! Both kinds of file are written through [`publish`], so nothing is ever
//! visible under its final name before it is complete. There is no eviction:
//! variants accumulate until removed out of band.

pub mod publish;

mod originals;
mod variants;

pub use originals::{
    upload_stem_and_extension, OriginalAsset, OriginalStore, DEFAULT_UPLOAD_EXTENSION,
};
pub use publish::{stage, StagedFile};
pub use variants::{VariantStore, CACHE_DIR};
