//! Type definitions for chain data and query results.

use std::fmt;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::hex;

/// Block height of arbitrary precision.
///
/// The canonical text form (`Display`) is decimal; [`BlockId::to_hex`] gives
/// the `0x`-prefixed quantity form used on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(BigUint);

impl BlockId {
    pub fn new(height: BigUint) -> Self {
        Self(height)
    }

    pub fn height(&self) -> &BigUint {
        &self.0
    }

    /// Quantity encoding, e.g. `0xc8` for block 200.
    pub fn to_hex(&self) -> String {
        hex::encode_quantity(&self.0)
    }

    /// Block `offset` positions after this one.
    pub fn advance(&self, offset: u64) -> Self {
        Self(&self.0 + offset)
    }
}

impl From<u64> for BlockId {
    fn from(height: u64) -> Self {
        Self(BigUint::from(height))
    }
}

impl From<BigUint> for BlockId {
    fn from(height: BigUint) -> Self {
        Self(height)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value transfer decoded from a block body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Sender address (opaque, case-sensitive).
    pub from: String,
    /// Recipient address. Empty for contract creation.
    pub to: String,
    /// Gas limit supplied with the transaction.
    pub gas: BigUint,
    /// Gas price in Wei.
    pub gas_price: BigUint,
    /// Transferred value in Wei.
    pub value: BigUint,
}

impl Transaction {
    /// Total debited from the sender: `value + gas * gas_price`.
    pub fn sender_cost(&self) -> BigUint {
        &self.value + &self.gas * &self.gas_price
    }

    /// Gas component alone, burned or paid to a block producer not tracked here.
    pub fn gas_cost(&self) -> BigUint {
        &self.gas * &self.gas_price
    }
}

/// Address with the largest absolute balance change over a block window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiggestChange {
    /// Winning address. Empty when the window held no transactions.
    pub address: String,
    /// Absolute value of the winning delta (hex quantity).
    pub amount: String,
    /// Newest block of the window (hex quantity).
    pub last_block: String,
    /// Number of blocks actually aggregated.
    pub window_size: u64,
    /// True only for a strictly positive net change (net inflow).
    pub is_positive: bool,
}
