//! Conversion between the backend's string flags and wire flags.

use missive_imap::flag::{Flag, FlagFetch};

pub fn from_str(f: &str) -> Option<FlagFetch> {
    match FlagFetch::from_str(f) {
        Some(flag) => Some(flag),
        None => {
            tracing::error!(flag=%f, "unable to encode flag as IMAP atom");
            None
        }
    }
}

/// The wire form of a backend flag set, `\Recent` excluded unless the
/// message is in `recent`.
pub fn fetch_flags(flags: &[String], is_recent: bool) -> Vec<FlagFetch> {
    let mut out: Vec<FlagFetch> = flags.iter().filter_map(|f| from_str(f)).collect();
    if is_recent && !out.contains(&FlagFetch::Recent) {
        out.push(FlagFetch::Recent);
    }
    out
}

pub fn to_backend(flags: &[Flag]) -> Vec<String> {
    flags.iter().map(|f| f.to_string()).collect()
}
