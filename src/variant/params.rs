//! Variant request normalization.
//!
//! Raw query strings are loose: dimensions may be given one at a time, numbers
//! may carry trailing junk (`120px`), and most parameters may be omitted. This
//! module turns them into a [`VariantParams`] with every default applied, so
//! that two requests meaning the same thing compare equal and produce the same
//! cache key.
//!
//! # Rules
//!
//! | Parameter | Absent | Present                                              |
//! |-----------|--------|------------------------------------------------------|
//! | `w`, `h`  | auto   | leading integer, below 1 or unparsable becomes 1     |
//! | `f`       | inside | one of cover/contain/fill/inside/outside, else 400   |
//! | `q`       | 80     | leading integer clamped to 1-100, unparsable is 80   |
//! | `grey`    | 0      | leading real, negative/unparsable is 0               |
//! | `invert`  | false  | true only for the literal `1`                        |
//! | `blur`    | none   | leading real, zero/negative/unparsable is none,      |
//! |           |        | above 1000 is 400                                    |
//!
//! A single dimension is mirrored onto the other (`w=100` means 100x100).
//! Empty values (`?w=`) are treated as absent.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::VariantError;

/// Default output quality (1-100).
pub const DEFAULT_QUALITY: u8 = 80;

/// Minimum allowed quality.
pub const MIN_QUALITY: u8 = 1;

/// Maximum allowed quality.
pub const MAX_QUALITY: u8 = 100;

/// Extension used when the requested filename has none.
pub const DEFAULT_EXTENSION: &str = "webp";

/// Default upper bound for a requested width or height.
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;

/// Largest accepted blur radius.
pub const MAX_BLUR: f64 = 1000.0;

// =============================================================================
// Fit Mode
// =============================================================================

/// How the source aspect ratio is reconciled with the target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FitMode {
    /// Cover the box, cropping the overflow
    Cover,
    /// Fit inside the box, letterboxing the remainder
    Contain,
    /// Stretch to the exact box
    Fill,
    /// Fit inside the box, no letterbox
    #[default]
    Inside,
    /// Cover the box, no crop
    Outside,
}

impl FitMode {
    /// Every accepted fit mode, in the order they are listed to clients.
    pub const ALL: [FitMode; 5] = [
        FitMode::Cover,
        FitMode::Contain,
        FitMode::Fill,
        FitMode::Inside,
        FitMode::Outside,
    ];

    /// The query-string spelling of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            FitMode::Cover => "cover",
            FitMode::Contain => "contain",
            FitMode::Fill => "fill",
            FitMode::Inside => "inside",
            FitMode::Outside => "outside",
        }
    }
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FitMode {
    type Err = VariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FitMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = FitMode::ALL.iter().map(FitMode::as_str).collect();
                VariantError::invalid(
                    "f",
                    format!(
                        "unknown fit mode '{}' (expected one of {})",
                        s,
                        allowed.join(", ")
                    ),
                )
            })
    }
}

// =============================================================================
// Raw Query
// =============================================================================

/// Raw transform parameters as they arrive in the query string.
///
/// Everything is kept as a string so that normalization, not the extractor,
/// decides how malformed values are treated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VariantQuery {
    /// Target width
    #[serde(default)]
    pub w: Option<String>,

    /// Target height
    #[serde(default)]
    pub h: Option<String>,

    /// Fit mode
    #[serde(default)]
    pub f: Option<String>,

    /// Grayscale amount
    #[serde(default)]
    pub grey: Option<String>,

    /// Invert flag (`1` to enable)
    #[serde(default)]
    pub invert: Option<String>,

    /// Output quality
    #[serde(default)]
    pub q: Option<String>,

    /// Gaussian blur radius
    #[serde(default)]
    pub blur: Option<String>,
}

impl VariantQuery {
    /// Apply the defaulting and clamping rules.
    ///
    /// `extension` is the extension of the requested filename, if any.
    /// Dimensions above `max_dimension` are rejected.
    pub fn normalize(
        &self,
        basename: &str,
        extension: Option<&str>,
        max_dimension: u32,
    ) -> Result<VariantParams, VariantError> {
        validate_segment("basename", basename)?;
        let extension = normalize_extension(extension)?;

        let fit = match present(&self.f) {
            Some(raw) => raw.parse()?,
            None => FitMode::default(),
        };

        let mut width = present(&self.w)
            .map(|raw| parse_dimension("w", raw, max_dimension))
            .transpose()?;
        let mut height = present(&self.h)
            .map(|raw| parse_dimension("h", raw, max_dimension))
            .transpose()?;
        match (width, height) {
            (Some(w), None) => height = Some(w),
            (None, Some(h)) => width = Some(h),
            _ => {}
        }

        let quality = present(&self.q)
            .and_then(parse_leading_int)
            .map(|q| q.clamp(i64::from(MIN_QUALITY), i64::from(MAX_QUALITY)) as u8)
            .unwrap_or(DEFAULT_QUALITY);

        let grayscale = present(&self.grey)
            .and_then(parse_leading_real)
            .filter(|g| *g > 0.0)
            .unwrap_or(0.0);

        let blur = present(&self.blur)
            .and_then(parse_leading_real)
            .filter(|b| *b > 0.0);
        if let Some(radius) = blur.filter(|b| *b > MAX_BLUR) {
            return Err(VariantError::invalid(
                "blur",
                format!("{} exceeds the maximum of {}", radius, MAX_BLUR),
            ));
        }

        Ok(VariantParams {
            basename: basename.to_string(),
            extension,
            width,
            height,
            fit,
            grayscale,
            invert: present(&self.invert) == Some("1"),
            blur,
            quality,
        })
    }
}

// =============================================================================
// Normalized Parameters
// =============================================================================

/// A fully normalized variant request.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantParams {
    /// Basename of the original (stored filename without extension)
    pub basename: String,

    /// Requested output extension
    pub extension: String,

    /// Target width (None = natural size)
    pub width: Option<u32>,

    /// Target height (None = natural size)
    pub height: Option<u32>,

    /// Fit mode
    pub fit: FitMode,

    /// Grayscale amount, 0 = off
    pub grayscale: f64,

    /// Invert colors
    pub invert: bool,

    /// Gaussian blur radius (None = off)
    pub blur: Option<f64>,

    /// Output quality (1-100)
    pub quality: u8,
}

impl VariantParams {
    /// Parameters that request the original untouched, in `extension`.
    pub fn original(basename: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            basename: basename.into(),
            extension: extension.into(),
            width: None,
            height: None,
            fit: FitMode::default(),
            grayscale: 0.0,
            invert: false,
            blur: None,
            quality: DEFAULT_QUALITY,
        }
    }

    /// Whether this request can be answered with the stored original bytes.
    ///
    /// True when no transform is requested and the requested extension is the
    /// original's own.
    pub fn is_passthrough(&self, original_extension: &str) -> bool {
        self.width.is_none()
            && self.height.is_none()
            && self.grayscale == 0.0
            && !self.invert
            && self.blur.is_none()
            && self.quality == DEFAULT_QUALITY
            && self.fit == FitMode::default()
            && self.extension == original_extension
    }
}

// =============================================================================
// Path Helpers
// =============================================================================

/// Split a requested filename into basename and extension.
///
/// Only the last dot separates the extension, and a leading dot does not
/// count (`.hidden` has no extension).
pub fn split_filename(filename: &str) -> (&str, Option<&str>) {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => (&filename[..idx], Some(&filename[idx + 1..])),
        _ => (filename, None),
    }
}

/// Reject path segments that could escape the storage root.
pub fn validate_segment(param: &'static str, value: &str) -> Result<(), VariantError> {
    if value.is_empty() {
        return Err(VariantError::invalid(param, "must not be empty"));
    }
    if value.starts_with('.') {
        return Err(VariantError::invalid(param, "must not start with '.'"));
    }
    if value.contains(['/', '\\', '\0']) {
        return Err(VariantError::invalid(
            param,
            "must not contain path separators",
        ));
    }
    Ok(())
}

fn normalize_extension(extension: Option<&str>) -> Result<String, VariantError> {
    match extension.filter(|ext| !ext.is_empty()) {
        None => Ok(DEFAULT_EXTENSION.to_string()),
        Some(ext) if ext.bytes().all(|b| b.is_ascii_alphanumeric()) => Ok(ext.to_string()),
        Some(ext) => Err(VariantError::invalid(
            "extension",
            format!("'{}' is not alphanumeric", ext),
        )),
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn parse_dimension(param: &'static str, raw: &str, max_dimension: u32) -> Result<u32, VariantError> {
    let value = parse_leading_int(raw).filter(|v| *v >= 1).unwrap_or(1);
    if value > i64::from(max_dimension) {
        return Err(VariantError::invalid(
            param,
            format!("{} exceeds the maximum of {}", value, max_dimension),
        ));
    }
    Ok(value as u32)
}

/// Parse the integer prefix of `raw`, ignoring anything after it.
///
/// Returns `None` when no digits lead the string. Overflow saturates.
fn parse_leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let len = digits.bytes().take_while(u8::is_ascii_digit).count();
    if len == 0 {
        return None;
    }
    let magnitude = digits[..len].bytes().fold(0i64, |acc, b| {
        acc.saturating_mul(10).saturating_add(i64::from(b - b'0'))
    });
    Some(if negative { -magnitude } else { magnitude })
}

/// Parse the longest finite real prefix of `raw`.
fn parse_leading_real(raw: &str) -> Option<f64> {
    let s = raw.trim_start();
    let candidate_len = s
        .bytes()
        .take_while(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
        .count();
    (1..=candidate_len)
        .rev()
        .find_map(|end| s[..end].parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

// =============================================================================
// Tests
// =============================================================================
