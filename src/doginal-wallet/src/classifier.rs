//! Partition of a wallet's unspent outputs into safe and inscribed sets.

use std::future::Future;

use doge_indexer::{HttpClient, InscriptionClient, Outpoint, Utxo};
use serde::{Deserialize, Serialize};

/// Outpoint-to-inscription-ids lookup used by the classifier.
pub trait InscriptionLookup: Send + Sync {
    /// Ids of the inscriptions attached to the outpoint. Empty when the
    /// outpoint is clean or when the indexer has no answer for it.
    fn inscription_ids(&self, outpoint: &Outpoint) -> impl Future<Output = Vec<String>> + Send;
}

impl<C: HttpClient> InscriptionLookup for InscriptionClient<C> {
    async fn inscription_ids(&self, outpoint: &Outpoint) -> Vec<String> {
        self.get_output(outpoint)
            .await
            .map(|output| output.inscriptions)
            .unwrap_or_default()
    }
}

/// Unspent output with at least one inscription attached. Never selected as
/// an ordinary funding input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InscribedUtxo {
    pub utxo: Utxo,
    pub inscription_ids: Vec<String>,
}

impl InscribedUtxo {
    /// An output carrying two or more inscriptions cannot be transferred
    /// individually and must never be spent at all.
    pub fn is_separable(&self) -> bool {
        self.inscription_ids.len() == 1
    }
}

/// Exact partition of the current unspent set: every output is in exactly
/// one of the two lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub safe: Vec<Utxo>,
    pub inscribed: Vec<InscribedUtxo>,
}

impl Classification {
    pub fn safe_value(&self) -> u64 {
        self.safe.iter().map(|utxo| utxo.value).sum()
    }

    pub fn len(&self) -> usize {
        self.safe.len() + self.inscribed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, outpoint: &Outpoint) -> bool {
        self.utxos().any(|utxo| &utxo.outpoint() == outpoint)
    }

    pub fn find_inscription(&self, inscription_id: &str) -> Option<&InscribedUtxo> {
        self.inscribed
            .iter()
            .find(|entry| entry.inscription_ids.iter().any(|id| id == inscription_id))
    }

    /// All outputs of the partition, safe first.
    pub fn utxos(&self) -> impl Iterator<Item = &Utxo> {
        self.safe
            .iter()
            .chain(self.inscribed.iter().map(|entry| &entry.utxo))
    }
}

/// Partitions unspent outputs by cross-referencing every outpoint against
/// the inscription indexer. No local caching: inscriptions can appear on
/// previously clean outputs between syncs, so the partition is recomputed
/// wholesale from a fresh fetch each time. All spending logic routes
/// through this boundary.
pub struct UtxoClassifier<I> {
    index: I,
}

impl<I: InscriptionLookup> UtxoClassifier<I> {
    pub fn new(index: I) -> Self {
        Self { index }
    }

    pub async fn classify(&self, address: &str, utxos: Vec<Utxo>) -> Classification {
        log::debug!("classifying {} unspent outputs for {address}", utxos.len());

        let mut classification = Classification::default();
        for utxo in utxos {
            let outpoint = utxo.outpoint();
            let ids = self.index.inscription_ids(&outpoint).await;

            if ids.is_empty() {
                classification.safe.push(utxo);
            } else {
                log::trace!("output {outpoint} carries {} inscription(s)", ids.len());
                classification.inscribed.push(InscribedUtxo {
                    utxo,
                    inscription_ids: ids,
                });
            }
        }

        log::debug!(
            "classification for {address}: {} safe, {} inscribed",
            classification.safe.len(),
            classification.inscribed.len()
        );

        classification
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct TableLookup {
        table: HashMap<Outpoint, Vec<String>>,
    }

    impl InscriptionLookup for TableLookup {
        async fn inscription_ids(&self, outpoint: &Outpoint) -> Vec<String> {
            self.table.get(outpoint).cloned().unwrap_or_default()
        }
    }

    fn utxo(txid: &str, vout: u32, value: u64) -> Utxo {
        Utxo {
            txid: txid.to_string(),
            vout,
            script_pubkey: vec![0x76, 0xa9],
            value,
            confirmations: 6,
        }
    }

    fn classifier(table: Vec<(Outpoint, Vec<&str>)>) -> UtxoClassifier<TableLookup> {
        UtxoClassifier::new(TableLookup {
            table: table
                .into_iter()
                .map(|(outpoint, ids)| {
                    (outpoint, ids.into_iter().map(str::to_string).collect())
                })
                .collect(),
        })
    }

    #[tokio::test]
    async fn partition_is_exact() {
        let utxos = vec![utxo("aa", 0, 100), utxo("bb", 1, 200), utxo("cc", 2, 300)];
        let classifier = classifier(vec![(Outpoint::new("bb", 1), vec!["insc-1"])]);

        let classification = classifier.classify("DTestAddress", utxos.clone()).await;

        assert_eq!(classification.len(), utxos.len());
        assert_eq!(classification.safe_value(), 400);
        assert!(classification.contains(&Outpoint::new("bb", 1)));
        assert!(!classification.contains(&Outpoint::new("zz", 9)));
        for original in &utxos {
            let in_safe = classification.safe.contains(original);
            let in_inscribed = classification
                .inscribed
                .iter()
                .any(|entry| &entry.utxo == original);
            assert!(in_safe ^ in_inscribed, "{} must be in exactly one set", original.txid);
        }
    }

    #[tokio::test]
    async fn multiple_inscriptions_flag_the_output_as_non_separable() {
        let classifier = classifier(vec![(Outpoint::new("aa", 0), vec!["insc-1", "insc-2"])]);

        let classification = classifier
            .classify("DTestAddress", vec![utxo("aa", 0, 100)])
            .await;

        assert_eq!(classification.inscribed.len(), 1);
        assert!(!classification.inscribed[0].is_separable());
    }

    #[tokio::test]
    async fn silent_index_classifies_everything_safe() {
        let classifier = classifier(vec![]);

        let classification = classifier
            .classify("DTestAddress", vec![utxo("aa", 0, 100), utxo("bb", 1, 200)])
            .await;

        assert_eq!(classification.safe.len(), 2);
        assert!(classification.inscribed.is_empty());
    }

    #[tokio::test]
    async fn find_inscription_resolves_the_carrying_output() {
        let classifier = classifier(vec![(Outpoint::new("bb", 1), vec!["insc-7"])]);

        let classification = classifier
            .classify("DTestAddress", vec![utxo("aa", 0, 100), utxo("bb", 1, 200)])
            .await;

        let found = classification.find_inscription("insc-7").unwrap();
        assert_eq!(found.utxo.txid, "bb");
        assert!(classification.find_inscription("insc-8").is_none());
    }
}
