//! Greedy largest-first coin selection.
//!
//! The policy favors a small input count over minimal change; together with
//! the deterministic tie-break it makes the same set always select the same
//! inputs.

use doge_indexer::{Outpoint, Utxo};
use thiserror::Error;

use crate::classifier::InscribedUtxo;
use crate::DUST_LIMIT;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("insufficient funds: needed {needed} koinu, available {available} koinu")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("output {outpoint} carries {count} inscriptions and cannot be spent individually")]
    NonSeparableInscription { outpoint: Outpoint, count: usize },
}

/// Inputs chosen for a spend, in the order they must appear in the
/// transaction, plus the change left after the dust policy is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub inputs: Vec<Utxo>,
    pub change: u64,
}

impl Selection {
    pub fn input_value(&self) -> u64 {
        self.inputs.iter().map(|utxo| utxo.value).sum()
    }
}

/// Select safe inputs covering `target + fee`. Only the safe set is ever
/// considered; inscribed outputs are not fungible funds.
pub fn select_value(safe: &[Utxo], target: u64, fee: u64) -> Result<Selection, SelectionError> {
    let needed = target.saturating_add(fee);
    let mut ordered: Vec<&Utxo> = safe.iter().collect();
    sort_for_selection(&mut ordered);

    let mut inputs = Vec::new();
    let mut total = 0u64;
    for utxo in ordered {
        if total >= needed {
            break;
        }
        total = total.saturating_add(utxo.value);
        inputs.push(utxo.clone());
    }

    if total < needed {
        log::debug!("selection failed: needed {needed}, safe set holds {total}");
        return Err(SelectionError::InsufficientFunds {
            needed,
            available: total,
        });
    }

    log::trace!("selected {} inputs totalling {total} for target {needed}", inputs.len());

    Ok(Selection {
        inputs,
        change: apply_dust_policy(total - needed),
    })
}

/// Inscription transfer: the inscribed output is always input #0 and its
/// inscription travels to the recipient. Safe inputs are added only to
/// cover the fee and, when the inscribed output is below the dust floor, to
/// top the preserved output up to it.
pub fn select_inscription(
    subject: &InscribedUtxo,
    safe: &[Utxo],
    fee: u64,
) -> Result<Selection, SelectionError> {
    if !subject.is_separable() {
        return Err(SelectionError::NonSeparableInscription {
            outpoint: subject.utxo.outpoint(),
            count: subject.inscription_ids.len(),
        });
    }

    let preserved = subject.utxo.value.max(DUST_LIMIT);
    let needed = preserved.saturating_add(fee);
    let mut ordered: Vec<&Utxo> = safe.iter().collect();
    sort_for_selection(&mut ordered);

    let mut inputs = vec![subject.utxo.clone()];
    let mut total = subject.utxo.value;
    for utxo in ordered {
        if total >= needed {
            break;
        }
        total = total.saturating_add(utxo.value);
        inputs.push((*utxo).clone());
    }

    if total < needed {
        log::debug!("inscription funding failed: needed {needed}, reached {total}");
        return Err(SelectionError::InsufficientFunds {
            needed,
            available: total,
        });
    }

    Ok(Selection {
        inputs,
        change: apply_dust_policy(total - needed),
    })
}

/// Descending by value; ties broken by ascending txid then vout.
fn sort_for_selection(utxos: &mut [&Utxo]) {
    utxos.sort_by(|a, b| {
        b.value
            .cmp(&a.value)
            .then_with(|| a.txid.cmp(&b.txid))
            .then_with(|| a.vout.cmp(&b.vout))
    });
}

/// Surplus below the dust threshold is forfeited to fee instead of creating
/// a sub-dust change output.
fn apply_dust_policy(surplus: u64) -> u64 {
    if surplus < DUST_LIMIT {
        0
    } else {
        surplus
    }
}
