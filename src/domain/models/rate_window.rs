//! Rate governor tiers and sliding-window entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A model-backend tier. Coarser than `Task::complexity`; used purely for
/// rate-limit bucketing and resource-pool slot classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Local,
    RemoteLocal,
    Grok,
    Haiku,
    Sonnet,
    Opus,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::RemoteLocal => "remote_local",
            Self::Grok => "grok",
            Self::Haiku => "haiku",
            Self::Sonnet => "sonnet",
            Self::Opus => "opus",
        }
    }

    /// Resolve a tier from a raw model name, per the dispatch rule in
    /// `RateGovernor`: substring match on "haiku"/"sonnet"/"opus"; anything
    /// else (including local model names) falls back to the most
    /// restrictive cloud tier, `opus`, unless it is recognizably local.
    pub fn from_model_name(model: &str) -> Self {
        let lower = model.to_lowercase();
        if lower.contains("qwen") || lower.contains("local") {
            Self::Local
        } else if lower.contains("haiku") {
            Self::Haiku
        } else if lower.contains("sonnet") {
            Self::Sonnet
        } else if lower.contains("grok") {
            Self::Grok
        } else {
            Self::Opus
        }
    }

    pub fn is_cloud(&self) -> bool {
        !matches!(self, Self::Local | Self::RemoteLocal)
    }
}

/// Per-tier rate limits over a 60-second sliding window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierLimits {
    pub rpm: u32,
    pub input_tpm: u64,
    pub output_tpm: u64,
}

impl TierLimits {
    pub const fn unrestricted() -> Self {
        Self {
            rpm: u32::MAX,
            input_tpm: u64::MAX,
            output_tpm: u64::MAX,
        }
    }
}

/// One recorded call within the sliding window.
#[derive(Debug, Clone, Copy)]
pub struct UsageEntry {
    pub timestamp: DateTime<Utc>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Sliding window of usage entries for a single tier, plus the timestamp of
/// the last call for minimum-spacing enforcement.
#[derive(Debug, Clone, Default)]
pub struct RateWindow {
    pub entries: VecDeque<UsageEntry>,
    pub last_call_time: Option<DateTime<Utc>>,
}

impl RateWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries older than 60 seconds relative to `now`.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::seconds(60);
        while let Some(front) = self.entries.front() {
            if front.timestamp <= cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn requests_in_window(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn input_tokens_in_window(&self) -> u64 {
        self.entries.iter().map(|e| e.input_tokens).sum()
    }

    pub fn output_tokens_in_window(&self) -> u64 {
        self.entries.iter().map(|e| e.output_tokens).sum()
    }

    pub fn record(&mut self, now: DateTime<Utc>, input_tokens: u64, output_tokens: u64) {
        self.entries.push_back(UsageEntry {
            timestamp: now,
            input_tokens,
            output_tokens,
        });
        self.last_call_time = Some(now);
    }
}
