//! Wire-level data model shared by the indexer clients.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Key identifying a specific transaction output, rendered as `txid:vout`.
/// This is the lookup key into the inscription index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Outpoint {
    pub txid: String,
    pub vout: u32,
}

impl Outpoint {
    pub fn new(txid: impl Into<String>, vout: u32) -> Self {
        Self {
            txid: txid.into(),
            vout,
        }
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// Unspent output as reported by the blockchain indexer. Never mutated in
/// place; a fresh fetch replaces the whole working set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    /// Locking script, opaque to the wallet; hex-encoded on the wire.
    #[serde(rename = "script", default, with = "hex_script")]
    pub script_pubkey: Vec<u8>,
    pub value: u64,
    #[serde(default)]
    pub confirmations: u32,
}

mod hex_script {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

impl Utxo {
    pub fn outpoint(&self) -> Outpoint {
        Outpoint::new(self.txid.clone(), self.vout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBalance {
    pub confirmed: u64,
    #[serde(default)]
    pub unconfirmed: i64,
}

/// One row of an address's transaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSummary {
    pub txid: String,
    #[serde(default)]
    pub confirmations: u32,
    /// Net effect on the address, in koinu; negative for outgoing.
    pub amount: i64,
    #[serde(default)]
    pub time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub txid: String,
    #[serde(default)]
    pub confirmations: u32,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub hex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub hex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub txid: String,
}

/// Inscription ids attached to a single output, as reported by the
/// inscription indexer's `/output/{outpoint}` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputInscriptions {
    #[serde(default)]
    pub inscriptions: Vec<String>,
}

/// An inscription together with the output it currently lives on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inscription {
    pub id: String,
    pub outpoint: Outpoint,
    pub content_type: String,
    pub content: Vec<u8>,
    /// Ordinal position among all inscriptions, when the indexer exposes it.
    pub sequence_number: Option<u64>,
}
