//! Per-address balance deltas and the max-change reduction.
//!
//! A sender pays `value + gas * gas_price`; a recipient gains `value`. Gas is
//! credited to nobody, so the deltas of one block always sum to minus its
//! total gas cost.

use std::collections::HashMap;

use bc_data::hex::encode_quantity;
use bc_data::{BiggestChange, BlockId, Transaction};
use num_bigint::{BigInt, Sign};

/// Net balance change per address within one block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressDelta {
    changes: HashMap<String, BigInt>,
}

impl AddressDelta {
    pub fn with_capacity(addresses: usize) -> Self {
        Self {
            changes: HashMap::with_capacity(addresses),
        }
    }

    /// Folds a block's transactions into a fresh delta set.
    pub fn from_transactions<'a, I>(txs: I) -> Self
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut delta = Self::default();
        for tx in txs {
            delta.apply(tx);
        }
        delta
    }

    /// Applies one transaction.
    pub fn apply(&mut self, tx: &Transaction) {
        *self.changes.entry(tx.from.clone()).or_default() -= BigInt::from(tx.sender_cost());
        *self.changes.entry(tx.to.clone()).or_default() += BigInt::from(tx.value.clone());
    }

    pub fn get(&self, address: &str) -> Option<&BigInt> {
        self.changes.get(address)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BigInt)> {
        self.changes.iter().map(|(addr, change)| (addr.as_str(), change))
    }

    /// Sum over all addresses.
    pub fn net_total(&self) -> BigInt {
        self.changes.values().sum()
    }
}

/// Element-wise sum of the deltas of every block in a window.
#[derive(Clone, Debug, Default)]
pub struct AggregateDelta {
    totals: HashMap<String, BigInt>,
}

impl AggregateDelta {
    pub fn with_capacity(addresses: usize) -> Self {
        Self {
            totals: HashMap::with_capacity(addresses),
        }
    }

    /// Adds one block's delta set.
    pub fn absorb(&mut self, delta: &AddressDelta) {
        for (addr, change) in delta.iter() {
            match self.totals.get_mut(addr) {
                Some(total) => *total += change,
                None => {
                    self.totals.insert(addr.to_string(), change.clone());
                }
            }
        }
    }

    pub fn get(&self, address: &str) -> Option<&BigInt> {
        self.totals.get(address)
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// Address whose total has the greatest magnitude.
    ///
    /// Ties keep the first candidate seen in map iteration order, which is
    /// unspecified. Addresses that netted to zero never win.
    pub fn largest_change(&self) -> Option<(&str, &BigInt)> {
        let mut best: Option<(&str, &BigInt)> = None;
        for (addr, change) in &self.totals {
            let beats = match best {
                Some((_, current)) => change.magnitude() > current.magnitude(),
                None => change.sign() != Sign::NoSign,
            };
            if beats {
                best = Some((addr.as_str(), change));
            }
        }
        best
    }

    /// Reduces the window to its query result.
    pub fn summarize(&self, last_block: &BlockId, window_size: u64) -> BiggestChange {
        let (address, amount, is_positive) = match self.largest_change() {
            Some((addr, change)) => (
                addr.to_string(),
                encode_quantity(change.magnitude()),
                change.sign() == Sign::Plus,
            ),
            None => (String::new(), "0x0".to_string(), false),
        };

        BiggestChange {
            address,
            amount,
            last_block: last_block.to_hex(),
            window_size,
            is_positive,
        }
    }
}
