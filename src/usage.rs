//! Token accounting for enrichment calls.
//!
//! Every enrichment call reports token usage; the [`TokenAccountant`]
//! aggregates those counters across all workers for the end-of-load report.

use serde::Serialize;
use std::sync::Mutex;

use crate::enrich::TokenUsage;

/// Running totals across all enrichment calls in this process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenTotals {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_creation: u64,
}

/// Token counter shared by all chunk-processing workers.
#[derive(Debug, Default)]
pub struct TokenAccountant {
    totals: Mutex<TokenTotals>,
}

impl TokenAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one call's usage to the totals. `None` (a failed call) is a no-op.
    pub fn record(&self, usage: Option<&TokenUsage>) {
        let Some(usage) = usage else {
            return;
        };
        let mut totals = self.totals.lock().unwrap();
        totals.input += usage.input_tokens;
        totals.output += usage.output_tokens;
        totals.cache_read += usage.cache_read_input_tokens;
        totals.cache_creation += usage.cache_creation_input_tokens;
    }

    /// Snapshot the current totals.
    pub fn totals(&self) -> TokenTotals {
        *self.totals.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn usage(input: u64, output: u64, cache_read: u64, cache_creation: u64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
            cache_read_input_tokens: cache_read,
            cache_creation_input_tokens: cache_creation,
        }
    }

    #[test]
    fn record_accumulates_all_four_counters() {
        let accountant = TokenAccountant::new();
        accountant.record(Some(&usage(10, 2, 100, 7)));
        accountant.record(Some(&usage(5, 1, 0, 0)));

        let totals = accountant.totals();
        assert_eq!(totals.input, 15);
        assert_eq!(totals.output, 3);
        assert_eq!(totals.cache_read, 100);
        assert_eq!(totals.cache_creation, 7);
    }

    #[test]
    fn record_none_is_a_no_op() {
        let accountant = TokenAccountant::new();
        accountant.record(None);
        assert_eq!(accountant.totals(), TokenTotals::default());
    }

    #[test]
    fn totals_are_exact_under_concurrent_recording() {
        let accountant = Arc::new(TokenAccountant::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let accountant = Arc::clone(&accountant);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    accountant.record(Some(&usage(1, 1, 1, 1)));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let totals = accountant.totals();
        assert_eq!(totals.input, 8000);
        assert_eq!(totals.output, 8000);
        assert_eq!(totals.cache_read, 8000);
        assert_eq!(totals.cache_creation, 8000);
    }
}
