//! Wallet-wide settings.

use serde::{Deserialize, Serialize};

use crate::KOINU_PER_DOGE;

/// Flat fee charged per transaction: 1 DOGE.
pub const DEFAULT_FEE: u64 = KOINU_PER_DOGE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Base URL of the blockchain indexer.
    pub chain_url: String,
    /// Base URL of the inscription indexer.
    pub inscriptions_url: String,
    /// Minimum fee accepted at assembly time.
    pub fee_floor: u64,
    /// Fee attached to outgoing transactions.
    pub flat_fee: u64,
}

impl WalletConfig {
    pub fn new(chain_url: impl Into<String>, inscriptions_url: impl Into<String>) -> Self {
        Self {
            chain_url: chain_url.into(),
            inscriptions_url: inscriptions_url.into(),
            fee_floor: DEFAULT_FEE,
            flat_fee: DEFAULT_FEE,
        }
    }
}
