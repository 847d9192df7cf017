//! Session security state machine.
//!
//! `Uninitialized -> PasswordSet -> {Unlocked, Locked}`: once a password is
//! set the session is either unlocked or locked until a full logout wipes
//! everything back to uninitialized. An unlocked session locks itself after
//! [`AUTO_LOCK_TIMEOUT`] without recorded activity.

pub mod biometric;
pub mod password;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::store::{keys, KvStore, StoreError};

use self::biometric::{BiometricError, PlatformAuthenticator};
use self::password::{is_strong, PasswordRecord};

/// Inactivity window before an unlocked session locks itself.
pub const AUTO_LOCK_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockState {
    Unlocked,
    #[default]
    Locked,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("password does not meet the strength rules")]
    WeakPassword,
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("no password has been set")]
    NotInitialized,
    #[error(transparent)]
    Biometric(#[from] BiometricError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Record persisted under [`keys::SECURITY_STATE`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedSecurity {
    password: PasswordRecord,
    biometric_credential_id: Option<String>,
}

type LockCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct SecurityState {
    password: Option<PasswordRecord>,
    biometric_credential_id: Option<String>,
    lock_state: LockState,
    last_activity: Option<Instant>,
}

struct Shared {
    state: Mutex<SecurityState>,
    store: Arc<dyn KvStore>,
    authenticator: Option<Box<dyn PlatformAuthenticator>>,
    lock_task: Mutex<Option<JoinHandle<()>>>,
    on_lock: Mutex<Option<LockCallback>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SecurityState> {
        crate::lock_ignoring_poison(&self.state)
    }

    fn notify_lock(&self) {
        let on_lock = crate::lock_ignoring_poison(&self.on_lock);
        if let Some(callback) = on_lock.as_ref() {
            callback();
        }
    }
}

pub struct SecurityManager {
    shared: Arc<Shared>,
}

impl SecurityManager {
    pub fn new(
        store: Arc<dyn KvStore>,
        authenticator: Option<Box<dyn PlatformAuthenticator>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SecurityState::default()),
                store,
                authenticator,
                lock_task: Mutex::new(None),
                on_lock: Mutex::new(None),
            }),
        }
    }

    /// Restore the persisted security record, if any. A restored session
    /// starts locked; `unlock` is required before credentials load.
    pub async fn restore(&self) -> Result<(), SecurityError> {
        let Some(bytes) = self.shared.store.get(keys::SECURITY_STATE).await? else {
            return Ok(());
        };

        match serde_json::from_slice::<PersistedSecurity>(&bytes) {
            Ok(persisted) => {
                let mut state = self.shared.state();
                state.password = Some(persisted.password);
                state.biometric_credential_id = persisted.biometric_credential_id;
                state.lock_state = LockState::Locked;
            }
            Err(err) => log::error!("discarding corrupt security record: {err}"),
        }

        Ok(())
    }

    pub fn lock_state(&self) -> LockState {
        self.shared.state().lock_state
    }

    pub fn is_unlocked(&self) -> bool {
        self.lock_state() == LockState::Unlocked
    }

    pub fn has_password(&self) -> bool {
        self.shared.state().password.is_some()
    }

    /// Hook invoked on every transition to Locked (auto-lock, explicit lock,
    /// logout). The session layer uses it to drop credential handles.
    pub fn set_on_lock(&self, callback: impl Fn() + Send + Sync + 'static) {
        *crate::lock_ignoring_poison(&self.shared.on_lock) = Some(Box::new(callback));
    }

    /// Set or replace the password. Callers are expected to validate
    /// strength up front; this re-validates independently. Rejected while
    /// locked: re-authentication comes first.
    pub async fn set_password(&self, password: &str) -> Result<(), SecurityError> {
        if !is_strong(password) {
            return Err(SecurityError::WeakPassword);
        }
        if self.has_password() && !self.is_unlocked() {
            return Err(SecurityError::AuthenticationFailed);
        }

        let record = PasswordRecord::derive(password);
        let persisted = PersistedSecurity {
            password: record.clone(),
            biometric_credential_id: self.shared.state().biometric_credential_id.clone(),
        };
        self.persist(&persisted).await?;

        {
            let mut state = self.shared.state();
            state.password = Some(record);
            state.lock_state = LockState::Unlocked;
        }
        self.arm_lock_timer();
        log::info!("password set; session unlocked");

        Ok(())
    }

    /// `true` only when a password is on record and matches. Expected
    /// failures never surface as errors.
    pub fn verify_password(&self, password: &str) -> bool {
        let record = self.shared.state().password.clone();
        match record {
            Some(record) => record.verify(password),
            None => false,
        }
    }

    /// Unlock with a password. Valid when locked; unlocking an already
    /// unlocked session just records activity.
    pub fn unlock(&self, password: &str) -> Result<(), SecurityError> {
        if !self.has_password() {
            return Err(SecurityError::NotInitialized);
        }
        if self.is_unlocked() {
            self.record_activity();
            return Ok(());
        }
        if !self.verify_password(password) {
            log::warn!("unlock attempt with wrong password");
            return Err(SecurityError::AuthenticationFailed);
        }

        self.shared.state().lock_state = LockState::Unlocked;
        self.arm_lock_timer();
        log::info!("session unlocked");

        Ok(())
    }

    /// Biometric unlock; success counts as password success. `false` tells
    /// the caller to fall back to the password path rather than fail.
    pub async fn unlock_with_biometric(&self) -> bool {
        if !self.has_password() || !self.verify_biometric().await {
            return false;
        }

        self.shared.state().lock_state = LockState::Unlocked;
        self.arm_lock_timer();
        log::info!("session unlocked via platform authenticator");

        true
    }

    /// Reset the inactivity countdown. No-op when locked.
    pub fn record_activity(&self) {
        if self.shared.state().lock_state != LockState::Unlocked {
            return;
        }
        self.arm_lock_timer();
    }

    /// Remaining time before auto-lock, when unlocked.
    pub fn time_until_lock(&self) -> Option<Duration> {
        let state = self.shared.state();
        if state.lock_state != LockState::Unlocked {
            return None;
        }
        let elapsed = state.last_activity?.elapsed();

        Some(AUTO_LOCK_TIMEOUT.saturating_sub(elapsed))
    }

    /// Transition to Locked and drop in-memory credentials. Idempotent.
    pub fn lock(&self) {
        self.cancel_lock_timer();
        {
            let mut state = self.shared.state();
            if state.password.is_none() || state.lock_state == LockState::Locked {
                return;
            }
            state.lock_state = LockState::Locked;
        }
        log::info!("session locked");
        self.shared.notify_lock();
    }

    /// Register a platform credential; persists only its opaque id.
    pub async fn enroll_biometric(&self) -> Result<String, SecurityError> {
        let authenticator = self
            .shared
            .authenticator
            .as_ref()
            .ok_or(BiometricError::Unavailable)?;
        let password = self
            .shared
            .state()
            .password
            .clone()
            .ok_or(SecurityError::NotInitialized)?;

        let credential_id = authenticator
            .create_credential(&random_challenge())
            .await?;
        let persisted = PersistedSecurity {
            password,
            biometric_credential_id: Some(credential_id.clone()),
        };
        self.persist(&persisted).await?;
        self.shared.state().biometric_credential_id = Some(credential_id.clone());
        log::info!("biometric credential enrolled");

        Ok(credential_id)
    }

    /// Challenge the enrolled credential. `false` covers "no authenticator",
    /// "nothing enrolled", and a failed assertion alike.
    pub async fn verify_biometric(&self) -> bool {
        let Some(authenticator) = self.shared.authenticator.as_ref() else {
            return false;
        };
        let Some(credential_id) = self.shared.state().biometric_credential_id.clone() else {
            return false;
        };

        authenticator
            .get_assertion(&random_challenge(), &credential_id)
            .await
    }

    /// Full wipe back to Uninitialized: password hash and salt, biometric
    /// id, credentials, and cached UTXOs all go. Idempotent.
    pub async fn logout(&self) -> Result<(), SecurityError> {
        self.cancel_lock_timer();
        self.shared.store.remove(keys::SECURITY_STATE).await?;
        self.shared.store.remove(keys::CREDENTIALS).await?;
        self.shared.store.remove(keys::UTXO_CACHE).await?;

        {
            let mut state = self.shared.state();
            state.password = None;
            state.biometric_credential_id = None;
            state.lock_state = LockState::Locked;
            state.last_activity = None;
        }
        self.shared.notify_lock();
        log::info!("logged out; wallet data erased");

        Ok(())
    }

    async fn persist(&self, record: &PersistedSecurity) -> Result<(), SecurityError> {
        let bytes = serde_json::to_vec(record).map_err(|err| StoreError(err.to_string()))?;
        self.shared.store.set(keys::SECURITY_STATE, bytes).await?;

        Ok(())
    }

    /// One cancellable deferred lock. Re-arming cancels the pending timer
    /// before scheduling a new one, so a stale timer can never fire a
    /// duplicate transition.
    fn arm_lock_timer(&self) {
        self.cancel_lock_timer();
        self.shared.state().last_activity = Some(Instant::now());

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(AUTO_LOCK_TIMEOUT).await;

            let fired = {
                let mut state = shared.state();
                if state.password.is_some() && state.lock_state == LockState::Unlocked {
                    state.lock_state = LockState::Locked;
                    true
                } else {
                    false
                }
            };
            if fired {
                log::info!("auto-lock timeout reached; locking session");
                shared.notify_lock();
            }
        });

        *crate::lock_ignoring_poison(&self.shared.lock_task) = Some(handle);
    }

    fn cancel_lock_timer(&self) {
        if let Some(handle) = crate::lock_ignoring_poison(&self.shared.lock_task).take() {
            handle.abort();
        }
    }
}

fn random_challenge() -> [u8; 32] {
    let mut challenge = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut challenge);
    challenge
}
