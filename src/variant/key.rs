//! Cache keys for rendered variants.
//!
//! A key is the variant's file name inside the tenant's cache directory:
//!
//! ```text
//! {basename}_w{W|auto}_h{H|auto}_f{fit}_g{grey}_i{0|1}_b{blur|0}_q{quality}.{ext}
//! ```
//!
//! Every field after the basename is rendered as a token without `_`, and
//! the extension is alphanumeric, so the fields can always be read back from
//! the right. That makes the mapping injective even when the basename itself
//! contains underscores. Reals use Rust's shortest round-trip formatting, so
//! distinct values never print alike. Blur zero never reaches the builder
//! (normalization turns it into "no blur"), which keeps `b0` unambiguous.

use std::fmt;
use std::sync::Arc;

use super::params::VariantParams;

/// Token written for an unconstrained dimension.
const AUTO: &str = "auto";

/// Tenant-qualified identifier of a rendered variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantKey {
    tenant: Arc<str>,
    file_name: Arc<str>,
}

impl VariantKey {
    /// Build the key for `params` under `tenant`.
    pub fn new(tenant: &str, params: &VariantParams) -> Self {
        Self {
            tenant: Arc::from(tenant),
            file_name: Arc::from(cache_file_name(params)),
        }
    }

    /// The tenant this variant belongs to.
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// File name of the variant inside the tenant's cache directory.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.file_name)
    }
}

/// Render the cache file name for a normalized request.
///
/// Pure: the same parameters always give the same string.
pub fn cache_file_name(params: &VariantParams) -> String {
    format!(
        "{}_w{}_h{}_f{}_g{}_i{}_b{}_q{}.{}",
        params.basename,
        dimension_token(params.width),
        dimension_token(params.height),
        params.fit,
        params.grayscale,
        u8::from(params.invert),
        params.blur.unwrap_or(0.0),
        params.quality,
        params.extension,
    )
}

fn dimension_token(value: Option<u32>) -> String {
    value.map_or_else(|| AUTO.to_string(), |v| v.to_string())
}
