//! Token usage and timing types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Normalized token usage.
///
/// Every bucket counts a distinct set of tokens: `input_tokens` excludes
/// cache reads and `output_tokens` excludes reasoning, so summing the
/// buckets never double-counts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_read_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_write_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_tokens: Option<u64>,
    /// Provider-reported total, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl TokenUsage {
    /// The provider total when present, otherwise the sum of all buckets.
    pub fn resolved_total(&self) -> u64 {
        self.total_tokens.unwrap_or_else(|| self.bucket_sum())
    }

    /// Sum of every bucket, ignoring the provider total.
    pub fn bucket_sum(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.cached_read_tokens.unwrap_or(0)
            + self.cached_write_tokens.unwrap_or(0)
            + self.reasoning_tokens.unwrap_or(0)
            + self.tool_use_tokens.unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.bucket_sum() == 0 && self.total_tokens.unwrap_or(0) == 0
    }

    /// Merge another usage into this one (accumulate).
    ///
    /// Optional buckets stay `None` only if both sides are `None`. The
    /// merged total is the sum of both resolved totals.
    pub fn merge(&mut self, other: &TokenUsage) {
        let total = self.resolved_total() + other.resolved_total();
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        merge_optional(&mut self.cached_read_tokens, other.cached_read_tokens);
        merge_optional(&mut self.cached_write_tokens, other.cached_write_tokens);
        merge_optional(&mut self.reasoning_tokens, other.reasoning_tokens);
        merge_optional(&mut self.tool_use_tokens, other.tool_use_tokens);
        self.total_tokens = Some(total);
    }
}

fn merge_optional(target: &mut Option<u64>, other: Option<u64>) {
    if let Some(v) = other {
        *target.get_or_insert(0) += v;
    }
}

impl std::ops::Add for TokenUsage {
    type Output = TokenUsage;

    fn add(mut self, rhs: TokenUsage) -> TokenUsage {
        self.merge(&rhs);
        self
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        self.merge(&rhs);
    }
}

/// Provider-reported usage before unblending.
///
/// Providers commonly fold cached input into the input figure and
/// reasoning into the output figure; adapters fill this struct verbatim
/// and [`RawUsage::unblend`] separates the buckets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RawUsage {
    pub combined_input: u64,
    pub combined_output: u64,
    #[serde(default)]
    pub cached_input: Option<u64>,
    #[serde(default)]
    pub cache_write: Option<u64>,
    #[serde(default)]
    pub reasoning_output: Option<u64>,
    #[serde(default)]
    pub tool_use: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl RawUsage {
    /// Split blended counters into disjoint buckets.
    ///
    /// Sub-counts larger than their combined figure are clamped so no
    /// bucket goes negative.
    pub fn unblend(&self) -> TokenUsage {
        let cached = self.cached_input.map(|c| c.min(self.combined_input));
        let reasoning = self.reasoning_output.map(|r| r.min(self.combined_output));
        TokenUsage {
            input_tokens: self.combined_input - cached.unwrap_or(0),
            output_tokens: self.combined_output - reasoning.unwrap_or(0),
            cached_read_tokens: cached,
            cached_write_tokens: self.cache_write,
            reasoning_tokens: reasoning,
            tool_use_tokens: self.tool_use,
            total_tokens: self.total,
        }
    }
}

/// Wall-clock timing for a run or a stream event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timing {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Timing {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Copy of this timing stamped as finished now.
    pub fn finished(&self) -> Self {
        Self {
            started_at: self.started_at,
            finished_at: Some(Utc::now()),
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unblend_separates_cached_and_reasoning() {
        let raw = RawUsage {
            combined_input: 1000,
            combined_output: 300,
            cached_input: Some(400),
            reasoning_output: Some(120),
            total: Some(1300),
            ..Default::default()
        };
        let usage = raw.unblend();
        assert_eq!(usage.input_tokens, 600);
        assert_eq!(usage.cached_read_tokens, Some(400));
        assert_eq!(usage.output_tokens, 180);
        assert_eq!(usage.reasoning_tokens, Some(120));
        assert!(usage.input_tokens + usage.cached_read_tokens.unwrap() <= raw.combined_input);
        assert_eq!(usage.bucket_sum(), 1300);
    }

    #[test]
    fn unblend_clamps_oversized_subcounts() {
        let raw = RawUsage {
            combined_input: 10,
            cached_input: Some(50),
            ..Default::default()
        };
        let usage = raw.unblend();
        assert_eq!(usage.input_tokens, 0);
        assert_eq!(usage.cached_read_tokens, Some(10));
    }

    #[test]
    fn merge_keeps_absent_buckets_absent() {
        let mut a = TokenUsage {
            input_tokens: 5,
            output_tokens: 3,
            ..Default::default()
        };
        let b = TokenUsage {
            input_tokens: 2,
            output_tokens: 1,
            reasoning_tokens: Some(4),
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.input_tokens, 7);
        assert_eq!(a.output_tokens, 4);
        assert_eq!(a.cached_read_tokens, None);
        assert_eq!(a.reasoning_tokens, Some(4));
        assert_eq!(a.total_tokens, Some(15));
    }

    #[test]
    fn merge_uses_provider_totals_when_present() {
        let a = TokenUsage {
            input_tokens: 1,
            total_tokens: Some(100),
            ..Default::default()
        };
        let b = TokenUsage {
            input_tokens: 1,
            ..Default::default()
        };
        assert_eq!((a + b).total_tokens, Some(101));
    }

    #[test]
    fn timing_duration_requires_finish() {
        let t = Timing::start();
        assert!(t.duration().is_none());
        let done = t.finished();
        assert!(done.duration().unwrap() >= Duration::zero());
    }
}
