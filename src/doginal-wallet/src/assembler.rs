//! Transaction planning, validation, and signing.

use doge_indexer::{Outpoint, Utxo};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::{self, AddressError};
use crate::selector::Selection;
use crate::signer::{SignedTransaction, SignerError, WalletSigner};
use crate::DUST_LIMIT;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("invalid destination address: {0}")]
    InvalidAddress(String),
    #[error("transfer value must be positive")]
    ZeroValue,
    #[error("fee {fee} is below the floor {floor}")]
    FeeBelowFloor { fee: u64, floor: u64 },
    #[error("input {outpoint} is no longer present in the latest unspent set")]
    StaleInput { outpoint: Outpoint },
    #[error("signing failed: {0}")]
    Signing(String),
}

impl From<AddressError> for AssemblyError {
    fn from(err: AddressError) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}

impl From<SignerError> for AssemblyError {
    fn from(err: SignerError) -> Self {
        Self::Signing(err.to_string())
    }
}

/// Planned transaction: inputs in selection order, outputs as
/// `[recipient, optional change]`, and the exact fee.
/// `input_value() == output_value() + fee` holds for every plan built here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPlan {
    pub inputs: Vec<Utxo>,
    pub outputs: Vec<(String, u64)>,
    pub fee: u64,
}

impl TransactionPlan {
    pub fn input_value(&self) -> u64 {
        self.inputs.iter().map(|utxo| utxo.value).sum()
    }

    pub fn output_value(&self) -> u64 {
        self.outputs.iter().map(|(_, value)| value).sum()
    }
}

/// Builds and signs transactions from a selection. Assembly never touches
/// the network; broadcasting is a separate step.
pub struct TransactionAssembler {
    fee_floor: u64,
}

impl TransactionAssembler {
    pub fn new(fee_floor: u64) -> Self {
        Self { fee_floor }
    }

    /// Plan a value transfer. The fee absorbs whatever surplus the dust
    /// policy forfeited during selection.
    pub fn plan_transfer(
        &self,
        selection: &Selection,
        recipient: &str,
        amount: u64,
        change_address: &str,
    ) -> TransactionPlan {
        let mut outputs = vec![(recipient.to_string(), amount)];
        if selection.change > 0 {
            outputs.push((change_address.to_string(), selection.change));
        }
        let fee = selection.input_value() - amount - selection.change;

        TransactionPlan {
            inputs: selection.inputs.clone(),
            outputs,
            fee,
        }
    }

    /// Plan an inscription transfer: the first output carries the inscribed
    /// value (floored at the dust limit) to the recipient.
    pub fn plan_inscription_transfer(
        &self,
        selection: &Selection,
        recipient: &str,
        change_address: &str,
    ) -> TransactionPlan {
        let preserved = selection
            .inputs
            .first()
            .map(|utxo| utxo.value.max(DUST_LIMIT))
            .unwrap_or(DUST_LIMIT);

        let mut outputs = vec![(recipient.to_string(), preserved)];
        if selection.change > 0 {
            outputs.push((change_address.to_string(), selection.change));
        }
        let fee = selection.input_value() - preserved - selection.change;

        TransactionPlan {
            inputs: selection.inputs.clone(),
            outputs,
            fee,
        }
    }

    /// Validate the plan and sign it. `latest` is the full unspent set from
    /// the most recent classification; any selected input missing from it
    /// fails the stale check and the caller must re-select.
    pub async fn assemble<S: WalletSigner>(
        &self,
        plan: &TransactionPlan,
        latest: &[Utxo],
        signer: &S,
        key: &S::Key,
    ) -> Result<SignedTransaction, AssemblyError> {
        let Some((recipient, amount)) = plan.outputs.first() else {
            return Err(AssemblyError::ZeroValue);
        };

        address::validate(recipient)?;
        if *amount == 0 {
            return Err(AssemblyError::ZeroValue);
        }
        for (change_address, _) in &plan.outputs[1..] {
            address::validate(change_address)?;
        }

        if plan.fee < self.fee_floor {
            return Err(AssemblyError::FeeBelowFloor {
                fee: plan.fee,
                floor: self.fee_floor,
            });
        }

        for input in &plan.inputs {
            let still_present = latest
                .iter()
                .any(|candidate| candidate.txid == input.txid && candidate.vout == input.vout);
            if !still_present {
                return Err(AssemblyError::StaleInput {
                    outpoint: input.outpoint(),
                });
            }
        }

        debug_assert_eq!(plan.input_value(), plan.output_value() + plan.fee);

        // the signer signs the whole transaction atomically, once
        let signed = signer.sign(plan, key).await?;
        log::debug!(
            "assembled transaction {} with {} inputs, {} outputs, fee {}",
            signed.txid,
            plan.inputs.len(),
            plan.outputs.len(),
            plan.fee
        );

        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use zeroize::Zeroizing;

    use crate::address::{encode, P2PKH_VERSION};
    use crate::selector::select_value;
    use crate::KOINU_PER_DOGE;

    use super::*;

    struct CountingSigner {
        calls: AtomicU32,
    }

    impl CountingSigner {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
            }
        }
    }

    impl WalletSigner for CountingSigner {
        type Key = ();

        async fn generate_mnemonic(&self) -> Result<(Zeroizing<String>, ()), SignerError> {
            unimplemented!()
        }

        async fn derive_key(&self, _seed_or_wif: &str) -> Result<(), SignerError> {
            unimplemented!()
        }

        fn to_address(&self, _key: &()) -> String {
            encode(P2PKH_VERSION, &[0x22; 20])
        }

        async fn sign(
            &self,
            plan: &TransactionPlan,
            _key: &(),
        ) -> Result<SignedTransaction, SignerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SignedTransaction {
                txid: "ff".repeat(32),
                hex: format!("{:04x}", plan.inputs.len()),
            })
        }

        fn export_key(&self, _key: &()) -> Zeroizing<Vec<u8>> {
            Zeroizing::new(Vec::new())
        }

        async fn import_key(&self, _material: &[u8]) -> Result<(), SignerError> {
            Ok(())
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

    fn doge(amount: u64) -> u64 {
        amount * KOINU_PER_DOGE
    }

    fn recipient() -> String {
        encode(P2PKH_VERSION, &[0x11; 20])
    }

    fn change_address() -> String {
        encode(P2PKH_VERSION, &[0x33; 20])
    }

    #[test]
    fn plan_balances_exactly() {
        let assembler = TransactionAssembler::new(doge(1));
        let safe = vec![utxo("aa", 0, doge(5)), utxo("bb", 0, doge(3))];
        let selection = select_value(&safe, doge(4), doge(1)).unwrap();

        let plan = assembler.plan_transfer(&selection, &recipient(), doge(4), &change_address());

        assert_eq!(plan.input_value(), plan.output_value() + plan.fee);
        assert_eq!(plan.outputs[0], (recipient(), doge(4)));
    }

    #[test]
    fn forfeited_dust_lands_in_the_fee() {
        let assembler = TransactionAssembler::new(doge(1));
        let safe = vec![utxo("aa", 0, doge(2) + DUST_LIMIT - 1)];
        let selection = select_value(&safe, doge(1), doge(1)).unwrap();

        let plan = assembler.plan_transfer(&selection, &recipient(), doge(1), &change_address());

        assert_eq!(plan.outputs.len(), 1);
        assert_eq!(plan.fee, doge(1) + DUST_LIMIT - 1);
        assert_eq!(plan.input_value(), plan.output_value() + plan.fee);
    }

    #[tokio::test]
    async fn assemble_signs_once() {
        let assembler = TransactionAssembler::new(doge(1));
        let safe = vec![utxo("aa", 0, doge(5))];
        let selection = select_value(&safe, doge(2), doge(1)).unwrap();
        let plan = assembler.plan_transfer(&selection, &recipient(), doge(2), &change_address());
        let signer = CountingSigner::new();

        let signed = assembler.assemble(&plan, &safe, &signer, &()).await.unwrap();

        assert_eq!(signed.txid, "ff".repeat(32));
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_inputs_are_rejected() {
        let assembler = TransactionAssembler::new(doge(1));
        let safe = vec![utxo("aa", 0, doge(5))];
        let selection = select_value(&safe, doge(2), doge(1)).unwrap();
        let plan = assembler.plan_transfer(&selection, &recipient(), doge(2), &change_address());
        // the latest set no longer contains aa:0
        let latest = vec![utxo("bb", 0, doge(5))];

        let err = assembler
            .assemble(&plan, &latest, &CountingSigner::new(), &())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AssemblyError::StaleInput {
                outpoint: Outpoint::new("aa", 0),
            }
        );
    }

    #[tokio::test]
    async fn malformed_recipient_is_rejected() {
        let assembler = TransactionAssembler::new(doge(1));
        let safe = vec![utxo("aa", 0, doge(5))];
        let selection = select_value(&safe, doge(2), doge(1)).unwrap();
        let plan = assembler.plan_transfer(&selection, "not-an-address", doge(2), &change_address());

        let err = assembler
            .assemble(&plan, &safe, &CountingSigner::new(), &())
            .await
            .unwrap_err();

        assert!(matches!(err, AssemblyError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn zero_value_is_rejected() {
        let assembler = TransactionAssembler::new(0);
        let plan = TransactionPlan {
            inputs: vec![utxo("aa", 0, doge(1))],
            outputs: vec![(recipient(), 0)],
            fee: doge(1),
        };

        let err = assembler
            .assemble(&plan, &[utxo("aa", 0, doge(1))], &CountingSigner::new(), &())
            .await
            .unwrap_err();

        assert_eq!(err, AssemblyError::ZeroValue);
    }

    #[tokio::test]
    async fn fee_below_the_floor_is_rejected() {
        let assembler = TransactionAssembler::new(doge(1));
        let plan = TransactionPlan {
            inputs: vec![utxo("aa", 0, doge(2))],
            outputs: vec![(recipient(), doge(2) - 100)],
            fee: 100,
        };

        let err = assembler
            .assemble(&plan, &[utxo("aa", 0, doge(2))], &CountingSigner::new(), &())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AssemblyError::FeeBelowFloor {
                fee: 100,
                floor: doge(1),
            }
        );
    }
}
