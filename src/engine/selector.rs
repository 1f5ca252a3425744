// Round-robin account selection over the currently enabled accounts.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{AppError, AppResult};
use crate::models::AccountRecord;

/// Stateful round-robin: a monotonically increasing counter taken modulo the
/// current sequence length. The account set can change between calls, so
/// fairness is best-effort, not strict.
pub struct AccountSelector {
    counter: AtomicUsize,
}

impl AccountSelector {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }

    /// Picks the next account. The counter advances on every call, including
    /// the failing ones.
    pub fn select<'a>(&self, accounts: &'a [AccountRecord]) -> AppResult<&'a AccountRecord> {
        let tick = self.counter.fetch_add(1, Ordering::SeqCst);
        if accounts.is_empty() {
            return Err(AppError::NoAccounts);
        }
        Ok(&accounts[tick % accounts.len()])
    }
}

impl Default for AccountSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn accounts(n: usize) -> Vec<AccountRecord> {
        (0..n)
            .map(|i| AccountRecord::new(format!("acc{}@x.com", i), "tok".into()))
            .collect()
    }

    #[test]
    fn empty_sequence_fails() {
        let selector = AccountSelector::new();
        assert!(matches!(
            selector.select(&[]),
            Err(AppError::NoAccounts)
        ));
    }

    #[test]
    fn rotates_in_cyclic_index_order() {
        let selector = AccountSelector::new();
        let pool = accounts(3);
        let picked: Vec<_> = (0..6)
            .map(|_| selector.select(&pool).unwrap().email.clone())
            .collect();
        assert_eq!(
            picked,
            vec![
                "acc0@x.com",
                "acc1@x.com",
                "acc2@x.com",
                "acc0@x.com",
                "acc1@x.com",
                "acc2@x.com"
            ]
        );
    }

    #[test]
    fn n_calls_visit_each_account_n_div_k_times() {
        let selector = AccountSelector::new();
        let pool = accounts(4);
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..22 {
            let email = selector.select(&pool).unwrap().email.clone();
            *counts.entry(email).or_default() += 1;
        }
        for count in counts.values() {
            assert!(*count == 5 || *count == 6, "uneven rotation: {:?}", counts);
        }
    }

    #[test]
    fn counter_advances_even_when_empty_and_modulo_tracks_current_length() {
        let selector = AccountSelector::new();
        // Two failed calls still consume ticks 0 and 1.
        let _ = selector.select(&[]);
        let _ = selector.select(&[]);
        let pool = accounts(3);
        assert_eq!(selector.select(&pool).unwrap().email, "acc2@x.com");

        // Shrinking the pool re-wraps against the new length.
        let small = accounts(2);
        assert_eq!(selector.select(&small).unwrap().email, "acc1@x.com");
    }
}
