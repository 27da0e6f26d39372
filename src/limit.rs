//! Transfer limits: a file-count or cumulative-byte ceiling.
//!
//! Limits are checked at file boundaries only. A file is started only when
//! it fits entirely under a byte ceiling; once the ceiling is met (or the next
//! file does not fit) the driver stops.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    FileCount(u64),
    ByteCount(u64),
}

/// Run totals across every connection of one driver run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferTotals {
    pub files: u64,
    pub bytes: u64,
}

impl TransferTotals {
    pub fn record(&mut self, bytes: u64) {
        self.files += 1;
        self.bytes += bytes;
    }
}

impl Limit {
    /// True once no further file may be started.
    pub fn is_reached(&self, totals: &TransferTotals) -> bool {
        match *self {
            Limit::FileCount(n) => totals.files >= n,
            Limit::ByteCount(n) => totals.bytes >= n,
        }
    }

    /// Whether a file of `next_size` bytes may be started.
    pub fn admits(&self, totals: &TransferTotals, next_size: u64) -> bool {
        match *self {
            Limit::FileCount(n) => totals.files < n,
            Limit::ByteCount(n) => totals.bytes.saturating_add(next_size) <= n,
        }
    }
}

const UNITS: &[(&str, u64)] = &[
    ("gb", 1024 * 1024 * 1024),
    ("mb", 1024 * 1024),
    ("kb", 1024),
    ("b", 1),
];

impl FromStr for Limit {
    type Err = Error;

    /// `"5"` is five files; `"3kb"`, `"10MB"`, `"512b"` are byte ceilings.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::config("empty limit"));
        }
        if let Ok(n) = s.parse::<u64>() {
            return Ok(Limit::FileCount(n));
        }
        let lower = s.to_ascii_lowercase();
        for (suffix, scale) in UNITS {
            if let Some(num) = lower.strip_suffix(suffix) {
                let num = num.trim();
                let n: u64 = num.parse().map_err(|_| {
                    Error::config(format!("invalid limit {:?}: expected <int>[B|KB|MB|GB]", s))
                })?;
                let bytes = n
                    .checked_mul(*scale)
                    .ok_or_else(|| Error::config(format!("limit {:?} is too large", s)))?;
                return Ok(Limit::ByteCount(bytes));
            }
        }
        Err(Error::config(format!(
            "invalid limit {:?}: expected a file count or <int>[B|KB|MB|GB]",
            s
        )))
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::FileCount(n) => write!(f, "{} file(s)", n),
            Limit::ByteCount(n) => write!(f, "{} bytes", n),
        }
    }
}
