//! Map raw fetcher error text into the user-facing error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of user-facing failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    /// Connectivity or timeout.
    Network,
    /// Permission / 403-equivalent.
    AccessDenied,
    /// 404 / gone.
    NotFound,
    /// Private or removed content.
    ContentUnavailable,
    /// Anti-automation challenge or throttling by the source.
    BlockedBySource,
    /// Cannot create/write the destination.
    Storage,
    /// Invalid request parameters.
    Configuration,
    Unknown,
}

impl ErrorCategory {
    /// Transient categories are worth retrying; everything else fails on the
    /// first decision (remote state or local misconfiguration, retry is
    /// futile).
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorCategory::Network | ErrorCategory::BlockedBySource | ErrorCategory::Unknown
        )
    }

    /// Short human-readable phrase for job info strings.
    pub fn describe(self) -> &'static str {
        match self {
            ErrorCategory::Network => "network error, check your connection",
            ErrorCategory::AccessDenied => "access denied by the source",
            ErrorCategory::NotFound => "source not found",
            ErrorCategory::ContentUnavailable => "content unavailable or private",
            ErrorCategory::BlockedBySource => "blocked by the source site",
            ErrorCategory::Storage => "cannot write the download",
            ErrorCategory::Configuration => "invalid download request",
            ErrorCategory::Unknown => "download failed",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Network => "network",
            ErrorCategory::AccessDenied => "access-denied",
            ErrorCategory::NotFound => "not-found",
            ErrorCategory::ContentUnavailable => "content-unavailable",
            ErrorCategory::BlockedBySource => "blocked-by-source",
            ErrorCategory::Storage => "storage",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Classify raw error text from a fetch tool.
///
/// Purely for reporting: when the fetcher already supplies a category this is
/// not consulted for the retry decision. Checks are ordered most-specific
/// first since tool output often matches several patterns.
pub fn classify(text: &str) -> ErrorCategory {
    let t = text.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| t.contains(n));

    if has(&["no space", "disk full", "read-only file system", "cannot create", "cannot write"]) {
        return ErrorCategory::Storage;
    }
    if has(&["sign in to confirm", "captcha", "429", "too many requests", "rate limit", "confirm you are not a bot"]) {
        return ErrorCategory::BlockedBySource;
    }
    if has(&["private video", "video unavailable", "content unavailable", "has been removed", "copyright"]) {
        return ErrorCategory::ContentUnavailable;
    }
    if has(&["403", "forbidden", "access denied"]) {
        return ErrorCategory::AccessDenied;
    }
    if has(&["404", "not found", "does not exist"]) {
        return ErrorCategory::NotFound;
    }
    if has(&["unsupported url", "invalid url", "invalid argument", "unknown option"]) {
        return ErrorCategory::Configuration;
    }
    if has(&["network", "timed out", "timeout", "connection", "unreachable", "name resolution", "dns", "reset by peer"]) {
        return ErrorCategory::Network;
    }
    ErrorCategory::Unknown
}
