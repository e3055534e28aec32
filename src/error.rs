//! Error taxonomy for the packaging pipeline
//!
//! Validation and resolution errors abort the whole invocation. Staging and
//! build errors only fail their own job and end up in the build report, which
//! is why every variant owns plain data and the enum is `Clone`.

use std::path::PathBuf;

use thiserror::Error;

use crate::platform::ResolvedPlatform;

/// Errors produced by the packaging pipeline
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PakeError {
    /// A user-supplied option violates its constraints
    #[error("invalid option `{field}`: {reason}")]
    InvalidOption { field: String, reason: String },

    /// A field that must be known before packaging is absent
    #[error("missing required field `{0}`")]
    MissingRequiredField(String),

    /// The requested options cannot be satisfied on this host
    #[error("unsupported platform combination: {0}")]
    UnsupportedPlatformCombo(String),

    /// The icon cannot be used or converted for the target platform
    #[error("unsupported icon format for {path}: {reason}")]
    UnsupportedIconFormat { path: PathBuf, reason: String },

    /// Copying an asset into the staging tree failed
    #[error("failed to stage {path}: {reason}")]
    AssetCopyError { path: PathBuf, reason: String },

    /// The native toolchain did not produce a bundle
    #[error("build for {platform} failed (exit code {}): {stderr_excerpt}", exit_code_label(.exit_code))]
    BuildFailed {
        platform: ResolvedPlatform,
        exit_code: Option<i32>,
        stderr_excerpt: String,
    },
}

impl PakeError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(field: &str) -> Self {
        Self::MissingRequiredField(field.to_string())
    }

    pub(crate) fn asset_copy(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::AssetCopyError {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn icon_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnsupportedIconFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error aborts the whole invocation rather than one job
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidOption { .. }
                | Self::MissingRequiredField(_)
                | Self::UnsupportedPlatformCombo(_)
        )
    }
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

pub type Result<T, E = PakeError> = std::result::Result<T, E>;
