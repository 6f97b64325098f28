use std::path::Path;

use factor_core::InstrumentKind;
use serde::Deserialize;

/// One followed instrument with its own pre/post-market analysis times,
/// mirroring the per-fund `pre_market_time`/`post_market_time` fields of the
/// tracked-funds config this scheduler is grounded on.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackedEntry {
    pub code: String,
    #[serde(default = "default_kind")]
    pub kind: InstrumentKind,
    pub pre_market_time: Option<String>,
    pub post_market_time: Option<String>,
}

fn default_kind() -> InstrumentKind {
    InstrumentKind::Fund
}

impl TrackedEntry {
    pub fn pre_market_hm(&self) -> Option<(u32, u32)> {
        self.pre_market_time.as_deref().and_then(parse_hm)
    }

    pub fn post_market_hm(&self) -> Option<(u32, u32)> {
        self.post_market_time.as_deref().and_then(parse_hm)
    }
}

fn parse_hm(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.split_once(':')?;
    Some((h.parse().ok()?, m.parse().ok()?))
}

/// Loads the tracked-instrument list from a JSON file. A missing file is
/// treated as "nothing tracked yet", not an error — a fresh deployment has
/// no funds configured until a user adds one.
pub fn load_tracked_entries(path: impl AsRef<Path>) -> Vec<TrackedEntry> {
    let path = path.as_ref();
    let Ok(contents) = std::fs::read_to_string(path) else {
        tracing::warn!(path = %path.display(), "tracked funds file not found, starting with an empty list");
        return Vec::new();
    };
    match serde_json::from_str(&contents) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "failed to parse tracked funds file");
            Vec::new()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub daily_compute_time: (u32, u32),
    pub performance_eval_time: (u32, u32),
    pub indices_refresh_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { daily_compute_time: (8, 30), performance_eval_time: (18, 0), indices_refresh_interval_secs: 300 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hm_from_tracked_entry() {
        let entry = TrackedEntry { code: "110026".to_string(), kind: InstrumentKind::Fund, pre_market_time: Some("08:45".to_string()), post_market_time: None };
        assert_eq!(entry.pre_market_hm(), Some((8, 45)));
        assert_eq!(entry.post_market_hm(), None);
    }

    #[test]
    fn missing_file_yields_empty_list() {
        let entries = load_tracked_entries("/nonexistent/path/does-not-exist.json");
        assert!(entries.is_empty());
    }
}
