//! Credential custody: sealed storage and refresh of broadcaster tokens.

use std::sync::Arc;

use {
    dashmap::DashMap,
    secrecy::Secret,
    soulxbot_common::{Error, Result, time::now_ms},
    soulxbot_store::{EncryptedCredentials, Store},
    soulxbot_vault::Vault,
    tokio::sync::Mutex,
    tracing::{info, warn},
};

use crate::{api::PlatformApi, types::TokenPair};

/// Hands out valid access tokens for registered broadcasters.
///
/// Acquisition is single-flight per owner: concurrent callers for the same
/// owner queue on one lock, and each re-reads the stored pair once it holds
/// the lock, so only the first caller ever refreshes.
pub struct CredentialCustodian {
    store: Store,
    vault: Vault,
    api: Arc<dyn PlatformApi>,
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl CredentialCustodian {
    pub fn new(store: Store, vault: Vault, api: Arc<dyn PlatformApi>) -> Self {
        Self {
            store,
            vault,
            api,
            locks: DashMap::new(),
        }
    }

    /// Encrypt both halves of a token pair.
    pub fn seal(&self, pair: &TokenPair) -> Result<EncryptedCredentials> {
        Ok(EncryptedCredentials {
            access_token: self.vault.seal_token(&pair.access_token)?,
            refresh_token: pair
                .refresh_token
                .as_ref()
                .map(|t| self.vault.seal_token(t))
                .transpose()?,
        })
    }

    /// Seal and persist a fresh pair for `owner_id`.
    pub async fn store_tokens(&self, owner_id: i64, pair: &TokenPair) -> Result<()> {
        let sealed = self.seal(pair)?;
        self.store
            .update_credentials(owner_id, &sealed, now_ms())
            .await
    }

    /// A currently valid access token for `owner_id`, refreshing the stored
    /// pair if needed.
    ///
    /// Fails with [`Error::CredentialExpired`] when nothing is stored, the
    /// refresh token is missing, or the platform rejects it.
    pub async fn access_token(&self, owner_id: i64) -> Result<Secret<String>> {
        let lock = self.locks.entry(owner_id).or_default().clone();
        let _guard = lock.lock().await;

        let expired = Error::CredentialExpired { user_id: owner_id };
        let Some(sealed) = self.store.credentials(owner_id).await? else {
            warn!(user_id = owner_id, "no stored credentials");
            return Err(expired);
        };

        let access = self.vault.open_token(&sealed.access_token)?;
        if self.api.validate_token(&access).await?.is_some() {
            return Ok(access);
        }

        let Some(sealed_refresh) = sealed.refresh_token else {
            warn!(user_id = owner_id, "access token invalid and no refresh token stored");
            return Err(expired);
        };
        let refresh = self.vault.open_token(&sealed_refresh)?;

        let pair = match self.api.refresh_token(&refresh).await {
            Ok(pair) => pair,
            Err(Error::Unauthorized) => {
                warn!(user_id = owner_id, "refresh token rejected, re-authorization required");
                return Err(expired);
            },
            Err(e) => return Err(e),
        };

        let mut updated = self.seal(&pair)?;
        // Keep the old refresh token if the platform did not rotate it.
        if updated.refresh_token.is_none() {
            updated.refresh_token = Some(sealed_refresh);
        }
        self.store
            .update_credentials(owner_id, &updated, now_ms())
            .await?;
        info!(user_id = owner_id, "access token refreshed");

        Ok(pair.access_token)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::FakePlatform,
        secrecy::ExposeSecret,
        std::sync::atomic::Ordering,
    };

    fn pair(access: &str, refresh: Option<&str>) -> TokenPair {
        TokenPair {
            access_token: Secret::new(access.into()),
            refresh_token: refresh.map(|r| Secret::new(r.into())),
            scopes: Vec::new(),
        }
    }

    async fn setup(fake: Arc<FakePlatform>) -> (Store, Arc<CredentialCustodian>) {
        let store = Store::in_memory().await.unwrap();
        store.upsert_user(1, "streamer", "Streamer").await.unwrap();
        store.register_stream_user(1, "key", None, 0).await.unwrap();
        let vault = soulxbot_vault::fast_vault("pass").unwrap();
        let custodian = Arc::new(CredentialCustodian::new(store.clone(), vault, fake));
        (store, custodian)
    }

    #[tokio::test]
    async fn valid_token_is_returned_as_is() {
        let fake = Arc::new(FakePlatform::default());
        fake.accept_token("a-1");
        let (_, custodian) = setup(fake.clone()).await;
        custodian.store_tokens(1, &pair("a-1", Some("r-1"))).await.unwrap();

        let token = custodian.access_token(1).await.unwrap();
        assert_eq!(token.expose_secret(), "a-1");
        assert_eq!(fake.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_token_is_refreshed_and_persisted() {
        let fake = Arc::new(FakePlatform::default());
        fake.on_refresh("r-1", "a-2", Some("r-2"));
        let (store, custodian) = setup(fake.clone()).await;
        custodian.store_tokens(1, &pair("a-1", Some("r-1"))).await.unwrap();

        let token = custodian.access_token(1).await.unwrap();
        assert_eq!(token.expose_secret(), "a-2");

        let vault = soulxbot_vault::fast_vault("pass").unwrap();
        let stored = store.credentials(1).await.unwrap().unwrap();
        assert_eq!(vault.open_token(&stored.access_token).unwrap().expose_secret(), "a-2");
        assert_eq!(
            vault
                .open_token(stored.refresh_token.as_ref().unwrap())
                .unwrap()
                .expose_secret(),
            "r-2"
        );
    }

    #[tokio::test]
    async fn concurrent_callers_refresh_once() {
        let fake = Arc::new(FakePlatform::default());
        fake.on_refresh("r-1", "a-2", Some("r-2"));
        let (_, custodian) = setup(fake.clone()).await;
        custodian.store_tokens(1, &pair("a-1", Some("r-1"))).await.unwrap();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let custodian = custodian.clone();
                tokio::spawn(async move { custodian.access_token(1).await })
            })
            .collect();
        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.expose_secret(), "a-2");
        }
        assert_eq!(fake.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_or_rejected_refresh_is_credential_expired() {
        let fake = Arc::new(FakePlatform::default());
        let (_, custodian) = setup(fake.clone()).await;

        // nothing stored
        assert!(matches!(
            custodian.access_token(1).await,
            Err(Error::CredentialExpired { user_id: 1 })
        ));

        // no refresh token
        custodian.store_tokens(1, &pair("a-1", None)).await.unwrap();
        assert!(matches!(
            custodian.access_token(1).await,
            Err(Error::CredentialExpired { user_id: 1 })
        ));

        // refresh token unknown to the platform
        custodian.store_tokens(1, &pair("a-1", Some("revoked"))).await.unwrap();
        assert!(matches!(
            custodian.access_token(1).await,
            Err(Error::CredentialExpired { user_id: 1 })
        ));
    }

    #[tokio::test]
    async fn unrotated_refresh_token_is_kept() {
        let fake = Arc::new(FakePlatform::default());
        fake.on_refresh("r-1", "a-2", None);
        let (store, custodian) = setup(fake.clone()).await;
        custodian.store_tokens(1, &pair("a-1", Some("r-1"))).await.unwrap();

        custodian.access_token(1).await.unwrap();

        let vault = soulxbot_vault::fast_vault("pass").unwrap();
        let stored = store.credentials(1).await.unwrap().unwrap();
        let refresh = vault.open_token(stored.refresh_token.as_ref().unwrap()).unwrap();
        assert_eq!(refresh.expose_secret(), "r-1");
    }
}
