//! Wallet session: wires the indexer clients, the classifier, the
//! selector/assembler pipeline, and the security state machine together.

use std::sync::{Arc, Mutex};

use doge_indexer::{
    AddressBalance, ChainClient, HttpClient, InscriptionClient, NetworkError, TxSummary, Utxo,
};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::assembler::{AssemblyError, TransactionAssembler, TransactionPlan};
use crate::classifier::{Classification, UtxoClassifier};
use crate::config::WalletConfig;
use crate::lock_ignoring_poison;
use crate::security::biometric::PlatformAuthenticator;
use crate::security::{LockState, SecurityError, SecurityManager};
use crate::selector::{self, SelectionError};
use crate::signer::{Credentials, SignedTransaction, SignerError, WalletSigner};
use crate::store::{keys, KvStore, StoreError};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("session is locked")]
    Locked,
    #[error("no credentials loaded")]
    NoCredentials,
    #[error("no inscription {0} in this wallet")]
    UnknownInscription(String),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A single user's wallet session. All mutations of the classification and
/// the credentials happen through `&mut self`, so a coin selection can
/// never race a refresh.
pub struct WalletSession<S: WalletSigner, C: HttpClient + Clone> {
    config: WalletConfig,
    signer: S,
    chain: ChainClient<C>,
    classifier: UtxoClassifier<InscriptionClient<C>>,
    assembler: TransactionAssembler,
    security: SecurityManager,
    store: Arc<dyn KvStore>,
    credentials: Arc<Mutex<Option<Credentials<S::Key>>>>,
    classification: Option<Classification>,
}

impl<S, C> WalletSession<S, C>
where
    S: WalletSigner,
    C: HttpClient + Clone,
{
    pub fn new(
        config: WalletConfig,
        signer: S,
        transport: C,
        store: Arc<dyn KvStore>,
        authenticator: Option<Box<dyn PlatformAuthenticator>>,
    ) -> Self {
        let chain = ChainClient::new(transport.clone(), config.chain_url.clone());
        let classifier = UtxoClassifier::new(InscriptionClient::new(
            transport,
            config.inscriptions_url.clone(),
        ));
        let assembler = TransactionAssembler::new(config.fee_floor);
        let security = SecurityManager::new(Arc::clone(&store), authenticator);

        let credentials: Arc<Mutex<Option<Credentials<S::Key>>>> = Arc::new(Mutex::new(None));
        let handles = Arc::clone(&credentials);
        security.set_on_lock(move || {
            if lock_ignoring_poison(&handles).take().is_some() {
                log::debug!("credential handles dropped on lock");
            }
        });

        Self {
            config,
            signer,
            chain,
            classifier,
            assembler,
            security,
            store,
            credentials,
            classification: None,
        }
    }

    pub fn security(&self) -> &SecurityManager {
        &self.security
    }

    pub fn record_activity(&self) {
        self.security.record_activity();
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    /// Create a new wallet: set the password, generate a mnemonic through
    /// the signer, persist the exported credentials, unlock.
    pub async fn create(&mut self, password: &str) -> Result<Zeroizing<String>, WalletError> {
        self.security.set_password(password).await?;
        let (mnemonic, key) = self.signer.generate_mnemonic().await?;
        self.install_credentials(key, Some(mnemonic.clone())).await?;
        log::info!("wallet created");

        Ok(mnemonic)
    }

    /// Import an existing wallet from a mnemonic phrase or a WIF key.
    pub async fn import(&mut self, password: &str, seed_or_wif: &str) -> Result<(), WalletError> {
        self.security.set_password(password).await?;
        let key = self.signer.derive_key(seed_or_wif).await?;
        self.install_credentials(key, None).await?;
        log::info!("wallet imported");

        Ok(())
    }

    /// Restore persisted security state from the store. The session resumes
    /// locked; `unlock` reloads the credentials.
    pub async fn restore(&self) -> Result<(), WalletError> {
        Ok(self.security.restore().await?)
    }

    /// Unlock with a password and reload credentials from the store.
    pub async fn unlock(&self, password: &str) -> Result<(), WalletError> {
        self.security.unlock(password)?;
        self.reload_credentials().await
    }

    /// Biometric-first unlock; `Ok(false)` means fall back to the password
    /// path.
    pub async fn unlock_with_biometric(&self) -> Result<bool, WalletError> {
        if !self.security.unlock_with_biometric().await {
            return Ok(false);
        }
        self.reload_credentials().await?;

        Ok(true)
    }

    /// Receiving address of the unlocked wallet.
    pub fn address(&self) -> Result<String, WalletError> {
        let guard = lock_ignoring_poison(&self.credentials);
        guard
            .as_ref()
            .map(|credentials| self.signer.to_address(&credentials.key))
            .ok_or(WalletError::NoCredentials)
    }

    /// Reveal the mnemonic. Gated on an unlocked session, like every other
    /// sensitive disclosure.
    pub fn mnemonic(&self) -> Result<Option<Zeroizing<String>>, WalletError> {
        self.ensure_unlocked()?;
        self.security.record_activity();
        let guard = lock_ignoring_poison(&self.credentials);
        guard
            .as_ref()
            .map(|credentials| credentials.mnemonic.clone())
            .ok_or(WalletError::NoCredentials)
    }

    /// Re-fetch and re-classify the whole unspent set. Mandatory before any
    /// spend; the partition is never patched incrementally.
    pub async fn refresh(&mut self) -> Result<&Classification, WalletError> {
        self.ensure_unlocked()?;
        let address = self.address()?;

        let utxos = self.chain.get_utxos(&address).await?;
        let classification = self.classifier.classify(&address, utxos).await;

        let bytes =
            serde_json::to_vec(&classification).map_err(|err| StoreError(err.to_string()))?;
        self.store.set(keys::UTXO_CACHE, bytes).await?;

        Ok(&*self.classification.insert(classification))
    }

    pub async fn balance(&self) -> Result<AddressBalance, WalletError> {
        self.ensure_unlocked()?;
        Ok(self.chain.get_balance(&self.address()?).await?)
    }

    pub async fn history(&self) -> Result<Vec<TxSummary>, WalletError> {
        self.ensure_unlocked()?;
        Ok(self.chain.get_transactions(&self.address()?).await?)
    }

    /// Send `amount` koinu to `recipient`, funded from safe outputs only.
    /// Returns the broadcast txid.
    pub async fn send_value(&mut self, recipient: &str, amount: u64) -> Result<String, WalletError> {
        self.security.record_activity();
        self.ensure_unlocked()?;
        let change_address = self.address()?;
        let fee = self.config.flat_fee;

        let classification = self.refresh().await?.clone();
        // a lock event may have fired during the fetch
        self.ensure_unlocked()?;

        let selection = selector::select_value(&classification.safe, amount, fee)?;
        let plan = self
            .assembler
            .plan_transfer(&selection, recipient, amount, &change_address);
        let signed = self.sign_plan(&plan, &classification).await?;

        Ok(self.chain.broadcast(&signed.hex).await?)
    }

    /// Transfer a single inscription to `recipient`. The inscribed output is
    /// input #0; safe outputs fund the fee.
    pub async fn send_inscription(
        &mut self,
        recipient: &str,
        inscription_id: &str,
    ) -> Result<String, WalletError> {
        self.security.record_activity();
        self.ensure_unlocked()?;
        let change_address = self.address()?;
        let fee = self.config.flat_fee;

        let classification = self.refresh().await?.clone();
        self.ensure_unlocked()?;

        let subject = classification
            .find_inscription(inscription_id)
            .ok_or_else(|| WalletError::UnknownInscription(inscription_id.to_string()))?;
        let selection = selector::select_inscription(subject, &classification.safe, fee)?;
        let plan = self
            .assembler
            .plan_inscription_transfer(&selection, recipient, &change_address);
        let signed = self.sign_plan(&plan, &classification).await?;

        Ok(self.chain.broadcast(&signed.hex).await?)
    }

    /// Erase everything and return to the uninitialized state.
    pub async fn logout(&mut self) -> Result<(), WalletError> {
        self.security.logout().await?;
        self.classification = None;

        Ok(())
    }

    async fn install_credentials(
        &self,
        key: S::Key,
        mnemonic: Option<Zeroizing<String>>,
    ) -> Result<(), WalletError> {
        let key = Arc::new(key);
        let exported = self.signer.export_key(&key);
        self.store.set(keys::CREDENTIALS, exported.to_vec()).await?;
        *lock_ignoring_poison(&self.credentials) = Some(Credentials { key, mnemonic });

        Ok(())
    }

    async fn reload_credentials(&self) -> Result<(), WalletError> {
        if lock_ignoring_poison(&self.credentials).is_some() {
            return Ok(());
        }
        let Some(material) = self.store.get(keys::CREDENTIALS).await? else {
            return Err(WalletError::NoCredentials);
        };
        let key = self.signer.import_key(&material).await?;
        *lock_ignoring_poison(&self.credentials) = Some(Credentials {
            key: Arc::new(key),
            mnemonic: None,
        });

        Ok(())
    }

    async fn sign_plan(
        &self,
        plan: &TransactionPlan,
        classification: &Classification,
    ) -> Result<SignedTransaction, WalletError> {
        let latest: Vec<Utxo> = classification.utxos().cloned().collect();
        let key = {
            let guard = lock_ignoring_poison(&self.credentials);
            match guard.as_ref() {
                Some(credentials) => Arc::clone(&credentials.key),
                None => return Err(WalletError::NoCredentials),
            }
        };

        Ok(self
            .assembler
            .assemble(plan, &latest, &self.signer, &key)
            .await?)
    }

    fn ensure_unlocked(&self) -> Result<(), WalletError> {
        match self.security.lock_state() {
            LockState::Unlocked => Ok(()),
            LockState::Locked => Err(WalletError::Locked),
        }
    }
}
