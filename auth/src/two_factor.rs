//! TOTP two-factor authentication.
//!
//! Lifecycle per account:
//!
//! ```text
//! NotSetUp ──setup──▶ Pending ──enable(code)──▶ Enabled ──disable──▶ NotSetUp
//!                       ▲   │
//!                       └───┘ setup again replaces the pending secret
//! ```
//!
//! Secrets are sealed with [`SecretCipher`] before they reach the store.
//! Backup codes are stored as keyed digests and consumed atomically by the
//! store, so each code works exactly once.

use crate::config::TwoFactorConfig;
use crate::constants::BACKUP_CODE_COUNT;
use crate::crypto::{random_hex, SecretCipher};
use crate::error::{AuthError, Result};
use crate::providers::{TwoFactorCredential, TwoFactorStore};
use crate::state::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::{info, warn};

const TOTP_DIGITS: usize = 6;
const TOTP_SKEW: u8 = 1;
const TOTP_STEP: u64 = 30;

/// Material handed to the user once, at setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoFactorSetup {
    /// Base32 TOTP secret for manual entry.
    pub secret: String,
    /// `otpauth://` URI.
    pub provisioning_uri: String,
    /// QR code of the URI as a `data:image/png;base64,` URL.
    pub qr_code: String,
    /// Plaintext backup codes; only digests are kept.
    pub backup_codes: Vec<String>,
}

/// Lifecycle state of an account's second factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoFactorState {
    /// No credential.
    NotSetUp,
    /// Set up, waiting for the first code.
    Pending,
    /// Required at login.
    Enabled,
}

/// Second factor summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoFactorStatus {
    /// Lifecycle state.
    pub state: TwoFactorState,
    /// When the credential was confirmed.
    pub enabled_at: Option<DateTime<Utc>>,
    /// Last successful verification.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Unused backup codes.
    pub backup_codes_remaining: usize,
}

/// Which factor satisfied a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoFactorMethod {
    /// Authenticator app code.
    Totp,
    /// Single-use backup code.
    BackupCode,
}

/// Two-factor engine over a [`TwoFactorStore`].
#[derive(Clone)]
pub struct TwoFactorEngine<S> {
    store: S,
    cipher: SecretCipher,
    issuer: String,
}

impl<S: TwoFactorStore> TwoFactorEngine<S> {
    /// Create an engine.
    #[must_use]
    pub fn new(store: S, config: &TwoFactorConfig) -> Self {
        Self {
            store,
            cipher: SecretCipher::from_secret(&config.encryption_secret),
            issuer: config.issuer.clone(),
        }
    }

    /// Start setup with a fresh secret and backup codes.
    ///
    /// Replaces any earlier pending setup.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyEnabled` if two-factor is already on.
    pub async fn setup(
        &self,
        account_id: AccountId,
        account_email: &str,
    ) -> Result<TwoFactorSetup> {
        if self.store.get(account_id).await?.is_some_and(|c| c.is_enabled) {
            return Err(AuthError::AlreadyEnabled);
        }

        let secret = Secret::generate_secret().to_encoded().to_string();
        let totp = self.totp(&secret, account_email)?;
        let qr = totp
            .get_qr_base64()
            .map_err(|e| AuthError::InternalError(format!("Failed to render QR code: {e}")))?;

        let backup_codes = generate_backup_codes();
        let credential = TwoFactorCredential {
            account_id,
            encrypted_secret: self.cipher.encrypt(&secret)?,
            backup_codes: self.digest_all(&backup_codes),
            is_enabled: false,
            enabled_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        };
        self.store.save_pending(&credential).await?;

        info!(account_id = %account_id, "Two-factor setup started");
        Ok(TwoFactorSetup {
            secret,
            provisioning_uri: totp.get_url(),
            qr_code: format!("data:image/png;base64,{qr}"),
            backup_codes,
        })
    }

    /// Confirm a pending setup with a TOTP code.
    ///
    /// Backup codes are not accepted here.
    ///
    /// # Errors
    ///
    /// - `NotEnabled` if nothing is pending
    /// - `AlreadyEnabled` if already confirmed
    /// - `InvalidTwoFactorCode` if the code does not match (nothing changes),
    ///   or if a newer setup replaced the secret the code was checked against
    pub async fn enable(&self, account_id: AccountId, code: &str) -> Result<()> {
        let credential = self.store.get(account_id).await?.ok_or(AuthError::NotEnabled)?;
        if credential.is_enabled {
            return Err(AuthError::AlreadyEnabled);
        }

        if !self.check_totp(&credential, code)? {
            warn!(account_id = %account_id, "Two-factor enable with invalid code");
            return Err(AuthError::InvalidTwoFactorCode);
        }

        let enabled = self
            .store
            .mark_enabled(account_id, &credential.encrypted_secret, Utc::now())
            .await?;
        if !enabled {
            return Err(if self.is_enabled(account_id).await? {
                AuthError::AlreadyEnabled
            } else {
                warn!(account_id = %account_id, "Pending secret replaced during enable");
                AuthError::InvalidTwoFactorCode
            });
        }

        info!(account_id = %account_id, "Two-factor enabled");
        Ok(())
    }

    /// Check a login-time code: TOTP first, then a backup code.
    ///
    /// # Errors
    ///
    /// - `NotEnabled` unless two-factor is enabled
    /// - `InvalidTwoFactorCode` if neither factor matches
    pub async fn verify(&self, account_id: AccountId, code: &str) -> Result<TwoFactorMethod> {
        let credential = self.enabled(account_id).await?;
        let method = self.match_code(&credential, code).await?;

        self.store.touch(account_id, Utc::now()).await?;
        Ok(method)
    }

    /// Turn two-factor off and delete the credential.
    ///
    /// # Errors
    ///
    /// Returns `NotEnabled` unless two-factor is enabled.
    pub async fn disable(&self, account_id: AccountId) -> Result<()> {
        self.enabled(account_id).await?;
        if !self.store.delete(account_id).await? {
            return Err(AuthError::NotEnabled);
        }
        info!(account_id = %account_id, "Two-factor disabled");
        Ok(())
    }

    /// Replace every backup code.
    ///
    /// # Errors
    ///
    /// Returns `NotEnabled` unless two-factor is enabled.
    pub async fn regenerate_backup_codes(&self, account_id: AccountId) -> Result<Vec<String>> {
        let codes = generate_backup_codes();
        if !self
            .store
            .replace_backup_codes(account_id, self.digest_all(&codes))
            .await?
        {
            return Err(AuthError::NotEnabled);
        }

        info!(account_id = %account_id, "Backup codes regenerated");
        Ok(codes)
    }

    /// Current state of the account's second factor.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    pub async fn status(&self, account_id: AccountId) -> Result<TwoFactorStatus> {
        Ok(match self.store.get(account_id).await? {
            None => TwoFactorStatus {
                state: TwoFactorState::NotSetUp,
                enabled_at: None,
                last_used_at: None,
                backup_codes_remaining: 0,
            },
            Some(c) => TwoFactorStatus {
                state: if c.is_enabled {
                    TwoFactorState::Enabled
                } else {
                    TwoFactorState::Pending
                },
                enabled_at: c.enabled_at,
                last_used_at: c.last_used_at,
                backup_codes_remaining: c.backup_codes.len(),
            },
        })
    }

    /// Whether login must stop for a second factor.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    pub async fn is_enabled(&self, account_id: AccountId) -> Result<bool> {
        Ok(self.store.get(account_id).await?.is_some_and(|c| c.is_enabled))
    }

    async fn enabled(&self, account_id: AccountId) -> Result<TwoFactorCredential> {
        self.store
            .get(account_id)
            .await?
            .filter(|c| c.is_enabled)
            .ok_or(AuthError::NotEnabled)
    }

    async fn match_code(
        &self,
        credential: &TwoFactorCredential,
        code: &str,
    ) -> Result<TwoFactorMethod> {
        if self.check_totp(credential, code)? {
            return Ok(TwoFactorMethod::Totp);
        }

        let digest = self.cipher.keyed_digest(&normalize_backup_code(code));
        if self
            .store
            .consume_backup_code(credential.account_id, &digest)
            .await?
        {
            info!(
                account_id = %credential.account_id,
                remaining = credential.backup_codes.len().saturating_sub(1),
                "Backup code consumed"
            );
            return Ok(TwoFactorMethod::BackupCode);
        }

        warn!(account_id = %credential.account_id, "Invalid two-factor code");
        Err(AuthError::InvalidTwoFactorCode)
    }

    fn check_totp(&self, credential: &TwoFactorCredential, code: &str) -> Result<bool> {
        let secret = self.cipher.decrypt(&credential.encrypted_secret)?;
        let totp = self.totp(&secret, &credential.account_id.to_string())?;
        Ok(totp.check_current(code.trim()).unwrap_or(false))
    }

    fn totp(&self, secret: &str, account_name: &str) -> Result<TOTP> {
        let bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|e| AuthError::InternalError(format!("Invalid TOTP secret: {e:?}")))?;

        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            bytes,
            Some(self.issuer.replace(':', "_")),
            account_name.replace(':', "_"),
        )
        .map_err(|e| AuthError::InternalError(format!("Failed to create TOTP: {e}")))
    }

    fn digest_all(&self, codes: &[String]) -> HashSet<String> {
        codes
            .iter()
            .map(|c| self.cipher.keyed_digest(&normalize_backup_code(c)))
            .collect()
    }
}

fn generate_backup_codes() -> Vec<String> {
    (0..BACKUP_CODE_COUNT)
        .map(|_| format!("{}-{}", random_hex(3), random_hex(3)))
        .collect()
}

fn normalize_backup_code(code: &str) -> String {
    code.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockTwoFactorStore;
    use std::sync::{Arc, Mutex};

    fn engine() -> TwoFactorEngine<MockTwoFactorStore> {
        TwoFactorEngine::new(
            MockTwoFactorStore::new(),
            &TwoFactorConfig::new("Sentinel".into(), "test-secret".into()),
        )
    }

    fn code_for(secret: &str) -> String {
        let bytes = Secret::Encoded(secret.to_string()).to_bytes().unwrap();
        TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes, None, String::new())
            .unwrap()
            .generate_current()
            .unwrap()
    }

    fn stale_code_for(secret: &str) -> String {
        let bytes = Secret::Encoded(secret.to_string()).to_bytes().unwrap();
        let totp = TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes, None, String::new()).unwrap();
        let ten_minutes_ago =
            u64::try_from((Utc::now() - chrono::Duration::minutes(10)).timestamp()).unwrap();
        totp.generate(ten_minutes_ago)
    }

    #[tokio::test]
    async fn test_setup_material() {
        let engine = engine();
        let setup = engine.setup(AccountId::new(), "jane@example.com").await.unwrap();

        assert!(setup.provisioning_uri.starts_with("otpauth://totp/"));
        assert!(setup.qr_code.starts_with("data:image/png;base64,"));
        assert_eq!(setup.backup_codes.len(), BACKUP_CODE_COUNT);
        for code in &setup.backup_codes {
            assert_eq!(code.len(), 13);
            assert_eq!(&code[6..7], "-");
        }
    }

    #[tokio::test]
    async fn test_enable_then_verify_with_totp() {
        let engine = engine();
        let account = AccountId::new();
        let setup = engine.setup(account, "jane@example.com").await.unwrap();

        assert_eq!(engine.status(account).await.unwrap().state, TwoFactorState::Pending);
        engine.enable(account, &code_for(&setup.secret)).await.unwrap();

        let status = engine.status(account).await.unwrap();
        assert_eq!(status.state, TwoFactorState::Enabled);
        assert!(status.enabled_at.is_some());

        let method = engine.verify(account, &code_for(&setup.secret)).await.unwrap();
        assert_eq!(method, TwoFactorMethod::Totp);
        assert!(engine.status(account).await.unwrap().last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_enable_with_stale_code_changes_nothing() {
        let engine = engine();
        let account = AccountId::new();
        let setup = engine.setup(account, "jane@example.com").await.unwrap();

        assert_eq!(
            engine.enable(account, &stale_code_for(&setup.secret)).await,
            Err(AuthError::InvalidTwoFactorCode)
        );
        assert_eq!(
            engine.enable(account, &setup.backup_codes[0]).await,
            Err(AuthError::InvalidTwoFactorCode)
        );

        let status = engine.status(account).await.unwrap();
        assert_eq!(status.state, TwoFactorState::Pending);
        assert_eq!(status.backup_codes_remaining, BACKUP_CODE_COUNT);
    }

    #[tokio::test]
    async fn test_backup_code_is_single_use() {
        let engine = engine();
        let account = AccountId::new();
        let setup = engine.setup(account, "jane@example.com").await.unwrap();
        engine.enable(account, &code_for(&setup.secret)).await.unwrap();

        let backup = setup.backup_codes[3].to_uppercase();
        assert_eq!(engine.verify(account, &backup).await.unwrap(), TwoFactorMethod::BackupCode);
        assert_eq!(engine.verify(account, &backup).await, Err(AuthError::InvalidTwoFactorCode));
        assert_eq!(
            engine.status(account).await.unwrap().backup_codes_remaining,
            BACKUP_CODE_COUNT - 1
        );
    }

    #[tokio::test]
    async fn test_concurrent_backup_code_use() {
        let engine = engine();
        let account = AccountId::new();
        let setup = engine.setup(account, "jane@example.com").await.unwrap();
        engine.enable(account, &code_for(&setup.secret)).await.unwrap();

        let code = setup.backup_codes[0].clone();
        let (a, b) = tokio::join!(engine.verify(account, &code), engine.verify(account, &code));

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    }

    #[tokio::test]
    async fn test_state_errors() {
        let engine = engine();
        let account = AccountId::new();

        assert_eq!(engine.enable(account, "123456").await, Err(AuthError::NotEnabled));
        assert_eq!(engine.verify(account, "123456").await, Err(AuthError::NotEnabled));

        let setup = engine.setup(account, "jane@example.com").await.unwrap();
        assert_eq!(
            engine.verify(account, &code_for(&setup.secret)).await,
            Err(AuthError::NotEnabled)
        );

        engine.enable(account, &code_for(&setup.secret)).await.unwrap();
        assert_eq!(
            engine.setup(account, "jane@example.com").await.map(|_| ()),
            Err(AuthError::AlreadyEnabled)
        );
        assert_eq!(
            engine.enable(account, &code_for(&setup.secret)).await,
            Err(AuthError::AlreadyEnabled)
        );
    }

    #[tokio::test]
    async fn test_disable_then_setup_yields_fresh_secret() {
        let engine = engine();
        let account = AccountId::new();
        let first = engine.setup(account, "jane@example.com").await.unwrap();
        engine.enable(account, &code_for(&first.secret)).await.unwrap();

        engine.disable(account).await.unwrap();
        assert_eq!(engine.status(account).await.unwrap().state, TwoFactorState::NotSetUp);
        assert_eq!(engine.disable(account).await, Err(AuthError::NotEnabled));

        let second = engine.setup(account, "jane@example.com").await.unwrap();
        assert_ne!(first.secret, second.secret);
    }

    #[tokio::test]
    async fn test_disable_pending_is_not_enabled() {
        let engine = engine();
        let account = AccountId::new();
        engine.setup(account, "jane@example.com").await.unwrap();

        assert_eq!(engine.disable(account).await, Err(AuthError::NotEnabled));
        assert_eq!(engine.regenerate_backup_codes(account).await, Err(AuthError::NotEnabled));
        assert_eq!(engine.status(account).await.unwrap().state, TwoFactorState::Pending);
    }

    #[tokio::test]
    async fn test_enable_rejects_secret_replaced_mid_flight() {
        let store = SetupDuringEnable::default();
        let engine = TwoFactorEngine::new(
            store.clone(),
            &TwoFactorConfig::new("Sentinel".into(), "test-secret".into()),
        );
        let account = AccountId::new();
        let first = engine.setup(account, "jane@example.com").await.unwrap();
        *store.replacement.lock().unwrap() = Some(engine.clone());

        assert_eq!(
            engine.enable(account, &code_for(&first.secret)).await,
            Err(AuthError::InvalidTwoFactorCode)
        );
        assert_eq!(engine.status(account).await.unwrap().state, TwoFactorState::Pending);
    }

    /// Runs a second `setup` between the code check and the enable flip.
    #[derive(Clone, Default)]
    struct SetupDuringEnable {
        inner: MockTwoFactorStore,
        replacement: Arc<Mutex<Option<TwoFactorEngine<SetupDuringEnable>>>>,
    }

    impl TwoFactorStore for SetupDuringEnable {
        async fn get(&self, account_id: AccountId) -> Result<Option<TwoFactorCredential>> {
            self.inner.get(account_id).await
        }

        async fn save_pending(&self, credential: &TwoFactorCredential) -> Result<()> {
            self.inner.save_pending(credential).await
        }

        async fn mark_enabled(
            &self,
            account_id: AccountId,
            sealed_secret: &str,
            at: DateTime<Utc>,
        ) -> Result<bool> {
            let engine = self.replacement.lock().unwrap().take();
            if let Some(engine) = engine {
                engine.setup(account_id, "jane@example.com").await?;
            }
            self.inner.mark_enabled(account_id, sealed_secret, at).await
        }

        async fn delete(&self, account_id: AccountId) -> Result<bool> {
            self.inner.delete(account_id).await
        }

        async fn consume_backup_code(
            &self,
            account_id: AccountId,
            code_digest: &str,
        ) -> Result<bool> {
            self.inner.consume_backup_code(account_id, code_digest).await
        }

        async fn replace_backup_codes(
            &self,
            account_id: AccountId,
            code_digests: HashSet<String>,
        ) -> Result<bool> {
            self.inner.replace_backup_codes(account_id, code_digests).await
        }

        async fn touch(&self, account_id: AccountId, at: DateTime<Utc>) -> Result<()> {
            self.inner.touch(account_id, at).await
        }
    }

    #[tokio::test]
    async fn test_regenerate_replaces_set() {
        let engine = engine();
        let account = AccountId::new();
        let setup = engine.setup(account, "jane@example.com").await.unwrap();
        engine.enable(account, &code_for(&setup.secret)).await.unwrap();

        let fresh = engine.regenerate_backup_codes(account).await.unwrap();
        assert_eq!(fresh.len(), BACKUP_CODE_COUNT);
        assert_eq!(
            engine.verify(account, &setup.backup_codes[1]).await,
            Err(AuthError::InvalidTwoFactorCode)
        );
        assert_eq!(engine.verify(account, &fresh[1]).await.unwrap(), TwoFactorMethod::BackupCode);
    }
}
