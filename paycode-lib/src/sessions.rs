//! SSO session lifecycle.
//!
//! ```text
//! active --revoke--> revoked            (written, terminal)
//! active --now >= expires_at--> expired (computed on read, terminal)
//! ```
//!
//! # Security
//!
//! - A session is only issued for a bundle that verifies against its challenge
//! - At most one effectively-active session exists per `(service_url, nonce)`;
//!   the check and the write happen under the collection's write lock
//! - Expired sessions are never rewritten, so expiry cannot be undone

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};

use crate::collection::{Collection, SSO_SESSIONS};
use crate::config::PaycodeConfig;
use crate::models::{PaymentCode, SessionStatus, SsoChallenge, SsoSession};
use crate::secure_storage::SecureKeyStorage;
use crate::signer::{self, SignatureBundle};
use crate::{PaycodeError, Result};

/// Status of `session` at `now` under the lazy expiry rule.
pub fn effective_status(session: &SsoSession, now: DateTime<Utc>) -> SessionStatus {
    match session.status {
        SessionStatus::Active if now >= session.expires_at => SessionStatus::Expired,
        status => status,
    }
}

fn with_effective_status(mut session: SsoSession, now: DateTime<Utc>) -> SsoSession {
    session.status = effective_status(&session, now);
    session
}

/// Owner of the `sso_sessions` collection.
pub struct SessionStore<S: SecureKeyStorage> {
    sessions: Collection<SsoSession, S>,
    default_ttl: Duration,
}

impl<S: SecureKeyStorage> SessionStore<S> {
    pub fn new(storage: Arc<S>, config: &PaycodeConfig) -> Self {
        Self {
            sessions: Collection::new(storage, SSO_SESSIONS),
            default_ttl: config.session_ttl(),
        }
    }

    /// Record a verified authentication with the configured lifetime.
    pub async fn issue(
        &self,
        challenge: &SsoChallenge,
        bundle: &SignatureBundle,
        code: &PaymentCode,
    ) -> Result<SsoSession> {
        self.issue_with_ttl(challenge, bundle, code, self.default_ttl)
            .await
    }

    /// Record a verified authentication valid for `ttl`.
    ///
    /// # Errors
    /// - `SignatureRejected` if the bundle does not verify against `challenge`
    ///   or was made for another payment code
    /// - `ReplayDetected` if an active session exists for the same service and nonce
    /// - `InvalidFormat` for a non-positive `ttl`
    #[instrument(skip(self, challenge, bundle, code), fields(service = %challenge.service_url, code_id = %code.id))]
    pub async fn issue_with_ttl(
        &self,
        challenge: &SsoChallenge,
        bundle: &SignatureBundle,
        code: &PaymentCode,
        ttl: Duration,
    ) -> Result<SsoSession> {
        if ttl <= Duration::zero() {
            return Err(PaycodeError::invalid_format("session lifetime must be positive"));
        }
        if bundle.payment_code != code.code {
            warn!("bundle was made for a different payment code");
            return Err(PaycodeError::SignatureRejected(
                "bundle names a different payment code".into(),
            ));
        }
        let verification = signer::verify(bundle, challenge);
        if !verification.is_valid() {
            warn!(reason = %verification.reason, "rejecting unverifiable bundle");
            return Err(PaycodeError::SignatureRejected(
                verification.reason.to_string(),
            ));
        }

        let now = Utc::now();
        let session = SsoSession {
            id: uuid::Uuid::new_v4().to_string(),
            service_name: challenge.service_name.clone(),
            service_url: challenge.service_url.clone(),
            challenge: challenge.challenge.clone(),
            nonce: challenge.nonce.clone(),
            signature: bundle.to_armored(),
            payment_code_id: code.id.clone(),
            timestamp: now,
            expires_at: now + ttl,
            status: SessionStatus::Active,
            auth47_enabled: bundle.is_hybrid(),
        };

        let issued = self
            .sessions
            .update(|sessions| {
                let replayed = sessions.iter().any(|s| {
                    s.service_url == session.service_url
                        && s.nonce == session.nonce
                        && effective_status(s, now) == SessionStatus::Active
                });
                if replayed {
                    return Err(PaycodeError::ReplayDetected {
                        service_url: session.service_url.clone(),
                        nonce: session.nonce.clone(),
                    });
                }
                sessions.push(session.clone());
                Ok(session)
            })
            .await?;
        info!(session_id = %issued.id, expires_at = %issued.expires_at, "session issued");
        Ok(issued)
    }

    /// Revoke an active session.
    ///
    /// # Errors
    /// - `NotFound` if no session has this id
    /// - `AlreadyTerminal` if it is revoked or expired
    #[instrument(skip(self))]
    pub async fn revoke(&self, session_id: &str) -> Result<SsoSession> {
        let now = Utc::now();
        let revoked = self
            .sessions
            .update(|sessions| {
                let session = sessions
                    .iter_mut()
                    .find(|s| s.id == session_id)
                    .ok_or_else(|| PaycodeError::not_found("session", session_id))?;
                let status = effective_status(session, now);
                if status.is_terminal() {
                    return Err(PaycodeError::AlreadyTerminal {
                        session_id: session_id.to_string(),
                        status: status.to_string(),
                    });
                }
                session.status = SessionStatus::Revoked;
                Ok(session.clone())
            })
            .await?;
        info!("session revoked");
        Ok(revoked)
    }

    /// Every session, with expiry applied.
    pub async fn list(&self) -> Result<Vec<SsoSession>> {
        let now = Utc::now();
        Ok(self
            .sessions
            .load()
            .await?
            .into_iter()
            .map(|s| with_effective_status(s, now))
            .collect())
    }

    /// One session, with expiry applied.
    pub async fn get(&self, session_id: &str) -> Result<SsoSession> {
        self.list()
            .await?
            .into_iter()
            .find(|s| s.id == session_id)
            .ok_or_else(|| PaycodeError::not_found("session", session_id))
    }

    /// Sessions still active at `now`.
    pub async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<SsoSession>> {
        Ok(self
            .sessions
            .load()
            .await?
            .into_iter()
            .map(|s| with_effective_status(s, now))
            .filter(|s| s.status == SessionStatus::Active)
            .collect())
    }

    /// Sessions authenticated with the payment code `payment_code_id`.
    pub async fn list_for_code(&self, payment_code_id: &str) -> Result<Vec<SsoSession>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|s| s.payment_code_id == payment_code_id)
            .collect())
    }

    /// Delete every session. Returns how many were removed.
    #[instrument(skip(self))]
    pub async fn purge(&self) -> Result<usize> {
        let removed = self.sessions.clear().await?;
        info!(removed, "session store purged");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PaycodeErrorCode;
    use crate::signer;
    use crate::test_utils::{
        alice_keys, bob_keys, in_memory_storage, owned_code_record, sample_challenge,
    };

    fn session_at(status: SessionStatus, expires_at: DateTime<Utc>) -> SsoSession {
        SsoSession {
            id: "s".into(),
            service_name: "svc".into(),
            service_url: "https://svc".into(),
            challenge: "c".into(),
            nonce: "n".into(),
            signature: String::new(),
            payment_code_id: "p".into(),
            timestamp: expires_at - Duration::hours(1),
            expires_at,
            status,
            auth47_enabled: false,
        }
    }

    #[test]
    fn test_effective_status() {
        let expiry = Utc::now();
        let active = session_at(SessionStatus::Active, expiry);
        assert_eq!(
            effective_status(&active, expiry - Duration::seconds(1)),
            SessionStatus::Active
        );
        assert_eq!(effective_status(&active, expiry), SessionStatus::Expired);

        let revoked = session_at(SessionStatus::Revoked, expiry);
        assert_eq!(
            effective_status(&revoked, expiry - Duration::seconds(1)),
            SessionStatus::Revoked
        );
        assert_eq!(
            effective_status(&revoked, expiry + Duration::days(1)),
            SessionStatus::Revoked
        );
    }

    #[tokio::test]
    async fn test_issue_and_revoke() {
        let store = SessionStore::new(in_memory_storage(), &PaycodeConfig::default());
        let keys = alice_keys();
        let code = owned_code_record(&keys, "Alice");
        let challenge = sample_challenge("n-1");
        let bundle = signer::sign(&challenge, &code, &keys, false).unwrap();

        let session = store.issue(&challenge, &bundle, &code).await.unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.expires_at - session.timestamp, Duration::hours(24));
        assert!(!session.auth47_enabled);
        assert_eq!(store.list_active(Utc::now()).await.unwrap().len(), 1);

        let revoked = store.revoke(&session.id).await.unwrap();
        assert_eq!(revoked.status, SessionStatus::Revoked);

        let err = store.revoke(&session.id).await.unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::AlreadyTerminal);
        assert_eq!(
            store.get(&session.id).await.unwrap().status,
            SessionStatus::Revoked
        );

        let err = store.revoke("missing").await.unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_replay_rejected() {
        let store = SessionStore::new(in_memory_storage(), &PaycodeConfig::default());
        let keys = alice_keys();
        let code = owned_code_record(&keys, "Alice");
        let challenge = sample_challenge("n-1");
        let bundle = signer::sign(&challenge, &code, &keys, false).unwrap();

        store.issue(&challenge, &bundle, &code).await.unwrap();
        let err = store.issue(&challenge, &bundle, &code).await.unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::ReplayDetected);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_session_is_terminal() {
        let store = SessionStore::new(in_memory_storage(), &PaycodeConfig::default());
        let keys = alice_keys();
        let code = owned_code_record(&keys, "Alice");
        let challenge = sample_challenge("n-1");
        let bundle = signer::sign(&challenge, &code, &keys, false).unwrap();

        let session = store
            .issue_with_ttl(&challenge, &bundle, &code, Duration::milliseconds(1))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(
            store.get(&session.id).await.unwrap().status,
            SessionStatus::Expired
        );
        let err = store.revoke(&session.id).await.unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::AlreadyTerminal);

        // The expired session no longer blocks the same nonce.
        store.issue(&challenge, &bundle, &code).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_unverifiable_bundles() {
        let store = SessionStore::new(in_memory_storage(), &PaycodeConfig::default());
        let alice = alice_keys();
        let alice_code = owned_code_record(&alice, "Alice");
        let bob = bob_keys();
        let bob_code = owned_code_record(&bob, "Bob");

        let challenge = sample_challenge("n-1");
        let bundle = signer::sign(&challenge, &alice_code, &alice, false).unwrap();

        let err = store
            .issue(&sample_challenge("n-2"), &bundle, &alice_code)
            .await
            .unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::SignatureRejected);

        let err = store.issue(&challenge, &bundle, &bob_code).await.unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::SignatureRejected);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_for_code_and_purge() {
        let store = SessionStore::new(in_memory_storage(), &PaycodeConfig::default());
        let keys = alice_keys();
        let code = owned_code_record(&keys, "Alice");

        for nonce in ["n-1", "n-2", "n-3"] {
            let challenge = sample_challenge(nonce);
            let bundle = signer::sign(&challenge, &code, &keys, false).unwrap();
            store.issue(&challenge, &bundle, &code).await.unwrap();
        }
        assert_eq!(store.list_for_code(&code.id).await.unwrap().len(), 3);
        assert!(store.list_for_code("other").await.unwrap().is_empty());

        assert_eq!(store.purge().await.unwrap(), 3);
        assert!(store.list().await.unwrap().is_empty());
    }
}
