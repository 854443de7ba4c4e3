//! Per-run token accounting.

use crate::types::usage::{RawUsage, TokenUsage};

/// Accumulates unblended usage across the turns of one run.
///
/// A ledger is owned by a single run and never shared, so it needs no
/// locking.
#[derive(Debug, Clone, Default)]
pub struct TokenLedger {
    snapshot: Option<TokenUsage>,
    turns: u32,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unblend `raw` and merge it into the running snapshot.
    ///
    /// Returns the unblended usage of this ingest alone.
    pub fn ingest(&mut self, raw: &RawUsage) -> TokenUsage {
        let usage = raw.unblend();
        match &mut self.snapshot {
            Some(total) => total.merge(&usage),
            None => self.snapshot = Some(usage),
        }
        self.turns += 1;
        usage
    }

    /// Replace the snapshot with a single terminal response's usage.
    pub fn replace(&mut self, raw: &RawUsage) -> TokenUsage {
        let usage = raw.unblend();
        self.snapshot = Some(usage);
        self.turns = 1;
        usage
    }

    /// Cumulative usage so far; all-zero before the first ingest.
    pub fn snapshot(&self) -> TokenUsage {
        self.snapshot.unwrap_or_default()
    }

    pub fn has_usage(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Number of usage reports ingested.
    pub fn turns(&self) -> u32 {
        self.turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(input: u64, cached: u64, output: u64, total: u64) -> RawUsage {
        RawUsage {
            combined_input: input,
            combined_output: output,
            cached_input: Some(cached),
            total: Some(total),
            ..Default::default()
        }
    }

    #[test]
    fn first_ingest_is_the_snapshot() {
        let mut ledger = TokenLedger::new();
        let usage = ledger.ingest(&raw(100, 40, 10, 110));
        assert_eq!(usage.input_tokens, 60);
        assert_eq!(ledger.snapshot(), usage);
        assert_eq!(ledger.snapshot().total_tokens, Some(110));
    }

    #[test]
    fn ingests_merge_by_sum() {
        let mut ledger = TokenLedger::new();
        ledger.ingest(&raw(100, 40, 10, 110));
        ledger.ingest(&raw(200, 100, 20, 220));
        let total = ledger.snapshot();
        assert_eq!(total.input_tokens, 160);
        assert_eq!(total.cached_read_tokens, Some(140));
        assert_eq!(total.output_tokens, 30);
        assert_eq!(total.total_tokens, Some(330));
        assert_eq!(ledger.turns(), 2);
    }

    #[test]
    fn replace_discards_previous_turns() {
        let mut ledger = TokenLedger::new();
        ledger.ingest(&raw(100, 0, 10, 110));
        ledger.replace(&raw(5, 0, 5, 10));
        assert_eq!(ledger.snapshot().resolved_total(), 10);
        assert_eq!(ledger.turns(), 1);
    }

    #[test]
    fn empty_ledger_reports_zero() {
        let ledger = TokenLedger::new();
        assert!(!ledger.has_usage());
        assert_eq!(ledger.snapshot().resolved_total(), 0);
    }
}
