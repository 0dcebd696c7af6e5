//! Target framework monikers and their selection priority.
//!
//! A package usually ships one module variant per TFM under `lib/<tfm>/`.
//! When the same module name appears for several TFMs, exactly one wins:
//! newer runtime generation first (`net8.0` over `netcoreapp3.1` over
//! `netstandard2.1` over `net48`), then higher version within a generation.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Runtime generation a moniker belongs to, ordered oldest to newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TfmFamily {
    /// Anything we could not classify; lowest priority.
    Unknown,
    /// Classic .NET Framework (`net20` .. `net48x`).
    Classic,
    /// `netstandard1.x` / `netstandard2.x` compatibility baselines.
    Standard,
    /// `netcoreapp1.0` .. `netcoreapp3.1`.
    CoreApp,
    /// Unified `net5.0` and later, optionally platform-suffixed.
    Modern,
}

/// A parsed target framework moniker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tfm {
    raw: String,
    family: TfmFamily,
    major: u32,
    minor: u32,
}

impl Tfm {
    /// Parse a moniker as it appears in a package's `lib/` folder name.
    /// Unrecognized monikers are kept with `Unknown` family rather than
    /// rejected, so exotic folders still extract at lowest priority.
    pub fn parse(raw: &str) -> Tfm {
        let lower = raw.to_ascii_lowercase();
        // Platform suffix ("net6.0-windows7.0") does not affect ranking.
        let base = lower.split('-').next().unwrap_or(&lower);

        let (family, major, minor) = if let Some(rest) = base.strip_prefix("netstandard") {
            let (maj, min) = parse_dotted(rest);
            (TfmFamily::Standard, maj, min)
        } else if let Some(rest) = base.strip_prefix("netcoreapp") {
            let (maj, min) = parse_dotted(rest);
            (TfmFamily::CoreApp, maj, min)
        } else if let Some(rest) = base.strip_prefix("net") {
            if rest.contains('.') {
                // Dotted "netX.Y" is the unified runtime, net5.0 onwards.
                let (maj, min) = parse_dotted(rest);
                if maj >= 5 {
                    (TfmFamily::Modern, maj, min)
                } else {
                    (TfmFamily::Unknown, 0, 0)
                }
            } else if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
                // Undotted "net48" / "net472" is classic Framework; first
                // digit is the major. The remainder is version digits, so
                // right-pad before comparing: net48 is 4.8, above 4.7.2.
                let mut chars = rest.chars();
                let maj = chars.next().and_then(|c| c.to_digit(10)).unwrap_or(0);
                let mut tail: String = chars.as_str().chars().take(3).collect();
                while tail.len() < 3 {
                    tail.push('0');
                }
                let min: u32 = tail.parse().unwrap_or(0);
                (TfmFamily::Classic, maj, min)
            } else {
                (TfmFamily::Unknown, 0, 0)
            }
        } else {
            (TfmFamily::Unknown, 0, 0)
        };

        Tfm {
            raw: raw.to_string(),
            family,
            major,
            minor,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn family(&self) -> TfmFamily {
        self.family
    }
}

impl fmt::Display for Tfm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialOrd for Tfm {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tfm {
    fn cmp(&self, other: &Self) -> Ordering {
        self.family
            .cmp(&other.family)
            .then(self.major.cmp(&other.major))
            .then(self.minor.cmp(&other.minor))
            // Stable tie-break so selection is deterministic.
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

fn parse_dotted(s: &str) -> (u32, u32) {
    let mut parts = s.splitn(2, '.');
    let maj = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let min = parts
        .next()
        .map(|p| {
            // "6.0-windows" style leftovers strip at the first non-digit.
            let digits: String = p.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(0)
        })
        .unwrap_or(0);
    (maj, min)
}
