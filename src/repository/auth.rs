//! Sign-in and session persistence

use std::sync::Arc;

use tokio::sync::watch;

use crate::api::{now_seconds, OpenWebUiClient, SignInResponse};
use crate::error::StoreResult;
use crate::preferences::{AuthPreferences, AuthSession};

/// Keeps the client's bearer token in step with the stored session
#[derive(Debug, Clone)]
pub struct AuthRepository {
    client: OpenWebUiClient,
    session: Arc<AuthPreferences>,
}

impl AuthRepository {
    pub fn new(client: OpenWebUiClient, session: Arc<AuthPreferences>) -> Self {
        Self { client, session }
    }

    /// Install the stored token on the client
    ///
    /// Returns whether a usable token was found. Expired tokens are left in
    /// the store but not installed.
    pub fn restore_session(&self) -> bool {
        let session = self.session.get();
        if !session.is_signed_in() {
            return false;
        }
        if session.is_expired(now_seconds()) {
            tracing::warn!("Stored session has expired; run `chatdroid login` again");
            return false;
        }
        self.client.set_token(session.token);
        true
    }

    /// Sign in, persist the session and install the token
    pub async fn login(&self, email: &str, password: &str) -> StoreResult<SignInResponse> {
        let response = self.client.sign_in(email, password).await?;

        self.session.update(|session| {
            *session = AuthSession {
                token: Some(response.token.clone()),
                token_type: Some(response.token_type.clone()).filter(|t| !t.is_empty()),
                expires_at: response.expires_at,
                user_id: Some(response.id.clone()),
                email: Some(response.email.clone()),
                name: response.name.clone(),
                role: response.role.clone(),
            };
        })?;
        self.client.set_token(Some(response.token.clone()));

        tracing::info!("Signed in as {}", response.email);
        Ok(response)
    }

    /// Forget the stored session and clear the client's token
    pub fn logout(&self) -> StoreResult<()> {
        self.session.reset()?;
        self.client.set_token(None);
        tracing::info!("Signed out");
        Ok(())
    }

    pub fn current_token(&self) -> Option<String> {
        self.session.get().token.filter(|t| !t.is_empty())
    }

    pub fn session(&self) -> AuthSession {
        self.session.get()
    }

    /// Observe session changes
    pub fn watch(&self) -> watch::Receiver<AuthSession> {
        self.session.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::preferences::SESSION_FILE;
    use tempfile::tempdir;

    fn repository(dir: &std::path::Path) -> (AuthRepository, OpenWebUiClient) {
        let client = OpenWebUiClient::new(&ServerConfig::default()).unwrap();
        let prefs = Arc::new(AuthPreferences::open(dir.join(SESSION_FILE)).unwrap());
        (AuthRepository::new(client.clone(), prefs), client)
    }

    #[test]
    fn test_restore_without_session() {
        let dir = tempdir().unwrap();
        let (repo, client) = repository(dir.path());
        assert!(!repo.restore_session());
        assert!(client.token().is_none());
        assert!(repo.current_token().is_none());
    }

    #[test]
    fn test_restore_installs_token() {
        let dir = tempdir().unwrap();
        let (repo, client) = repository(dir.path());
        repo.session
            .update(|s| s.token = Some("abc".to_string()))
            .unwrap();

        assert!(repo.restore_session());
        assert_eq!(client.token().as_deref(), Some("abc"));
    }

    #[test]
    fn test_restore_skips_expired_token() {
        let dir = tempdir().unwrap();
        let (repo, client) = repository(dir.path());
        repo.session
            .update(|s| {
                s.token = Some("old".to_string());
                s.expires_at = Some(1);
            })
            .unwrap();

        assert!(!repo.restore_session());
        assert!(client.token().is_none());
        assert_eq!(repo.current_token().as_deref(), Some("old"));
    }

    #[test]
    fn test_logout_clears_everything() {
        let dir = tempdir().unwrap();
        let (repo, client) = repository(dir.path());
        repo.session
            .update(|s| s.token = Some("abc".to_string()))
            .unwrap();
        repo.restore_session();
        let mut rx = repo.watch();

        repo.logout().unwrap();
        assert!(client.token().is_none());
        assert!(repo.current_token().is_none());
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().is_signed_in());
    }
}
