//! Key-management collaborator interface.
//!
//! The wallet core only calls through this narrow surface and never sees
//! raw key bytes; handles stay opaque to everything in this crate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::assembler::TransactionPlan;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("key derivation failed: {0}")]
    Derivation(String),
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Serialized signed transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub txid: String,
    pub hex: String,
}

pub trait WalletSigner: Send + Sync {
    /// Opaque key handle owned by the signer.
    type Key: Send + Sync + 'static;

    /// Generate a fresh mnemonic and the key it derives.
    async fn generate_mnemonic(&self) -> Result<(Zeroizing<String>, Self::Key), SignerError>;

    /// Derive a key from a mnemonic phrase or a WIF-encoded private key.
    async fn derive_key(&self, seed_or_wif: &str) -> Result<Self::Key, SignerError>;

    /// Receiving address for the key.
    fn to_address(&self, key: &Self::Key) -> String;

    /// Sign the whole transaction atomically; invoked once per transaction.
    async fn sign(
        &self,
        plan: &TransactionPlan,
        key: &Self::Key,
    ) -> Result<SignedTransaction, SignerError>;

    /// Export key material for encrypted-at-rest persistence.
    fn export_key(&self, key: &Self::Key) -> Zeroizing<Vec<u8>>;

    /// Rebuild a key handle from exported material.
    async fn import_key(&self, material: &[u8]) -> Result<Self::Key, SignerError>;
}

/// Credentials of an unlocked session. Exactly one instance exists per
/// unlocked session; the handles are dropped on lock and on logout.
pub struct Credentials<K> {
    pub key: Arc<K>,
    pub mnemonic: Option<Zeroizing<String>>,
}
