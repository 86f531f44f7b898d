//! Client session manager for the medinsight CLI.
//!
//! `App` owns the configuration, the persisted session, and the API
//! client, and enforces the session lifecycle: the bearer token is
//! attached to requests exactly while a session exists, and an
//! authorization failure from any call clears the session exactly once.
//! The only states are Unauthenticated and Authenticated; login or
//! registration moves forward, logout or a rejected token moves back.

use anyhow::Result;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError, RegisterResponse};
use crate::auth::{CredentialStore, Session, SessionData};
use crate::config::Config;
use crate::models::User;
use crate::utils::validators;

pub struct App {
    pub config: Config,
    session: Session,
    api: ApiClient,
}

impl App {
    /// Create the application, loading config and any persisted session
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };

        let state_dir = config.state_dir()?;
        let mut session = Session::new(
            state_dir,
            config.token_storage_key(),
            config.user_storage_key(),
        );
        if let Err(e) = session.load() {
            warn!(error = %e, "Failed to load session, starting unauthenticated");
        }

        let mut api = ApiClient::new(config.api_base_url())?;
        if let Some(token) = session.token() {
            api.set_token(token.to_string());
        }

        Ok(Self {
            config,
            session,
            api,
        })
    }

    // =========================================================================
    // Session state
    // =========================================================================

    /// Check if the user is authenticated with an unexpired session
    pub fn is_authenticated(&self) -> bool {
        self.session.is_valid()
    }

    pub fn current_user(&self) -> Option<&User> {
        self.session.user()
    }

    pub fn session_minutes_left(&self) -> Option<i64> {
        self.session.data.as_ref().map(|d| d.minutes_until_expiry())
    }

    /// Install a freshly issued session. Memory, disk, and the API client
    /// token move together, so requests carry the token exactly while a
    /// session exists.
    fn install_session(&mut self, data: SessionData) {
        self.api.set_token(data.token.clone());
        self.session.update(data);
        if let Err(e) = self.session.save() {
            warn!(error = %e, "Failed to persist session");
        }
    }

    /// Drop the session everywhere. Safe to call in any state.
    fn discard_session(&mut self) {
        self.api.clear_token();
        if let Err(e) = self.session.clear() {
            warn!(error = %e, "Failed to remove session file");
        }
    }

    /// React to a rejected token. Returns true if this call performed the
    /// Authenticated -> Unauthenticated transition; false if there was no
    /// session, so repeated failures collapse to a single transition.
    pub fn handle_auth_failure(&mut self) -> bool {
        if self.session.data.is_none() {
            return false;
        }
        info!("Token rejected by server, clearing session");
        self.discard_session();
        true
    }

    /// Inspect an error from an authenticated call and clear the session
    /// if the token was rejected.
    fn note_auth_failure(&mut self, err: &anyhow::Error) {
        if err
            .downcast_ref::<ApiError>()
            .is_some_and(ApiError::is_auth_failure)
        {
            self.handle_auth_failure();
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Log in with email and password. On failure any prior session is
    /// left untouched.
    pub async fn login(&mut self, email: &str, password: &str, remember: bool) -> Result<User> {
        if email.is_empty() || password.is_empty() {
            anyhow::bail!("Email and password required");
        }

        let auth = self.api.login(email, password).await?;
        let user = auth
            .user
            .ok_or_else(|| anyhow::anyhow!("Login response did not include a user record"))?;

        if remember {
            if let Err(e) = CredentialStore::store(email, password) {
                warn!(error = %e, "Failed to store password in keychain");
            }
        }

        self.remember_email(email);
        self.install_session(SessionData::new(
            auth.access_token,
            auth.refresh_token,
            user.clone(),
        ));

        info!(email, "Login successful");
        Ok(user)
    }

    /// Create an account and end up authenticated as it. When no username
    /// is given, one is derived from the email's local part.
    pub async fn register(
        &mut self,
        email: &str,
        username: Option<&str>,
        password: &str,
        full_name: &str,
    ) -> Result<User> {
        validators::validate_email(email).map_err(|msg| anyhow::anyhow!("Invalid email: {msg}"))?;
        let username = match username {
            Some(name) => {
                validators::validate_username(name)
                    .map_err(|msg| anyhow::anyhow!("Invalid username: {msg}"))?;
                name.to_string()
            }
            None => validators::username_from_email(email),
        };
        let issues = validators::password_issues(password);
        if !issues.is_empty() {
            anyhow::bail!("Password rejected: {}", issues.join("; "));
        }

        let outcome = self
            .api
            .register(email, &username, password, full_name)
            .await?;

        match outcome {
            RegisterResponse::Tokens(auth) => {
                let user = auth.user.ok_or_else(|| {
                    anyhow::anyhow!("Register response did not include a user record")
                })?;
                self.remember_email(email);
                self.install_session(SessionData::new(
                    auth.access_token,
                    auth.refresh_token,
                    user.clone(),
                ));
                info!(email, "Registration successful");
                Ok(user)
            }
            // The server created the account without issuing tokens;
            // finish with a login.
            RegisterResponse::Created(_) => {
                info!(email, "Account created, logging in");
                self.login(email, password, false).await
            }
        }
    }

    /// Clear the current session unconditionally. Never fails: the
    /// server-side revocation is best-effort and the local state is
    /// dropped regardless of its outcome.
    pub async fn logout(&mut self) {
        if self.session.data.is_some() {
            if let Err(e) = self.api.logout().await {
                warn!(error = %e, "Server-side logout failed, clearing local session anyway");
            }
        }
        self.discard_session();
        info!("Logged out");
    }

    /// Fetch the server's view of the current user and keep the stored
    /// record current.
    pub async fn whoami(&mut self) -> Result<User> {
        self.refresh_if_needed().await;

        match self.api.me().await {
            Ok(user) => {
                if let Some(data) = self.session.data.as_mut() {
                    data.user = user.clone();
                }
                if let Err(e) = self.session.save() {
                    warn!(error = %e, "Failed to persist session");
                }
                Ok(user)
            }
            Err(e) => {
                self.note_auth_failure(&e);
                Err(e)
            }
        }
    }

    /// Exchange the stored refresh token for a new token pair
    pub async fn refresh(&mut self) -> Result<()> {
        let Some(refresh_token) = self
            .session
            .data
            .as_ref()
            .and_then(|d| d.refresh_token.clone())
        else {
            anyhow::bail!("No refresh token in the current session");
        };

        match self.api.refresh(&refresh_token).await {
            Ok(auth) => {
                let user = auth
                    .user
                    .or_else(|| self.session.user().cloned())
                    .ok_or_else(|| {
                        anyhow::anyhow!("Refresh response did not include a user record")
                    })?;
                self.install_session(SessionData::new(
                    auth.access_token,
                    auth.refresh_token,
                    user,
                ));
                info!("Session refreshed");
                Ok(())
            }
            Err(e) => {
                // A rejected refresh token is an authorization failure
                self.note_auth_failure(&e);
                Err(e)
            }
        }
    }

    /// Refresh proactively when inside the expiry buffer. Errors are
    /// swallowed here; the next authenticated call surfaces any real
    /// failure.
    pub async fn refresh_if_needed(&mut self) {
        let due = self
            .session
            .data
            .as_ref()
            .map(|d| d.needs_refresh() && d.refresh_token.is_some())
            .unwrap_or(false);

        if due {
            if let Err(e) = self.refresh().await {
                warn!(error = %e, "Proactive token refresh failed");
            }
        }
    }

    /// Change the account password
    pub async fn change_password(&mut self, current: &str, new: &str) -> Result<()> {
        let issues = validators::password_issues(new);
        if !issues.is_empty() {
            anyhow::bail!("New password rejected: {}", issues.join("; "));
        }

        match self.api.change_password(current, new).await {
            Ok(()) => {
                // The server revokes all refresh tokens on success; drop
                // ours so we never present a dead one.
                if let Some(data) = self.session.data.as_mut() {
                    data.refresh_token = None;
                }
                if let Err(e) = self.session.save() {
                    warn!(error = %e, "Failed to persist session");
                }
                info!("Password changed");
                Ok(())
            }
            Err(e) => {
                self.note_auth_failure(&e);
                Err(e)
            }
        }
    }

    /// Probe service availability
    pub async fn health(&self) -> Result<String> {
        let status = self.api.health().await?;
        Ok(status.status)
    }

    fn remember_email(&mut self, email: &str) {
        self.config.last_email = Some(email.to_string());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }
}

/// Map an operation error to a message suitable for the terminal
pub fn friendly_error(err: &anyhow::Error) -> String {
    if let Some(api_err) = err.downcast_ref::<ApiError>() {
        return match api_err {
            ApiError::Unauthorized => "Invalid credentials or expired session".to_string(),
            ApiError::BadRequest(detail) => detail.clone(),
            ApiError::RateLimited => "Too many attempts, please wait and retry".to_string(),
            other => other.to_string(),
        };
    }

    // Transport failures arrive context-wrapped rather than as ApiError
    if let Some(req_err) = err.downcast_ref::<reqwest::Error>() {
        if req_err.is_timeout() {
            return "Connection timed out. Please try again.".to_string();
        }
        if req_err.is_connect() {
            return "Unable to connect to server. Check your internet connection.".to_string();
        }
    }

    err.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Session;

    fn sample_user() -> User {
        User {
            id: 1,
            email: "test@example.com".to_string(),
            ..Default::default()
        }
    }

    fn sample_session_data() -> SessionData {
        SessionData::new("abc".to_string(), Some("def".to_string()), sample_user())
    }

    fn test_app(dir: &std::path::Path) -> App {
        let session = Session::new(
            dir.to_path_buf(),
            "medinsight_token".to_string(),
            "medinsight_user".to_string(),
        );
        // Port 1 is never bound, so network calls fail fast
        App {
            config: Config::default(),
            session,
            api: ApiClient::new("http://127.0.0.1:1").unwrap(),
        }
    }

    #[test]
    fn test_install_session_sets_token_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        assert!(!app.is_authenticated());
        assert!(!app.api.has_token());

        app.install_session(sample_session_data());

        // Token attached iff session exists
        assert!(app.is_authenticated());
        assert!(app.api.has_token());
        assert_eq!(app.current_user().unwrap().email, "test@example.com");

        app.discard_session();
        assert!(!app.is_authenticated());
        assert!(!app.api.has_token());
    }

    #[test]
    fn test_auth_failure_transitions_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.install_session(sample_session_data());

        assert!(app.handle_auth_failure());
        assert!(!app.is_authenticated());
        assert!(!app.api.has_token());

        // Repeated failures are a no-op
        assert!(!app.handle_auth_failure());
        assert!(!app.handle_auth_failure());
        assert!(!app.is_authenticated());
    }

    #[test]
    fn test_auth_failure_without_session_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        assert!(!app.handle_auth_failure());
        assert!(!app.is_authenticated());
    }

    #[test]
    fn test_note_auth_failure_only_on_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.install_session(sample_session_data());

        // Non-auth errors leave the session alone
        app.note_auth_failure(&anyhow::Error::from(ApiError::RateLimited));
        app.note_auth_failure(&anyhow::anyhow!("some other failure"));
        assert!(app.is_authenticated());

        app.note_auth_failure(&anyhow::Error::from(ApiError::Unauthorized));
        assert!(!app.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_always_ends_unauthenticated() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());

        // Logout while already unauthenticated is fine
        app.logout().await;
        assert!(!app.is_authenticated());

        // Session present but no reachable server: the failed revocation
        // must not stop the local clear
        app.install_session(sample_session_data());
        app.logout().await;
        assert!(!app.is_authenticated());
        assert!(!app.api.has_token());
        assert!(!dir.path().join("session.json").exists());
    }

    #[test]
    fn test_friendly_error_messages() {
        let msg = friendly_error(&anyhow::Error::from(ApiError::Unauthorized));
        assert!(msg.contains("Invalid credentials"));

        let msg = friendly_error(&anyhow::Error::from(ApiError::BadRequest(
            "Email already registered".to_string(),
        )));
        assert_eq!(msg, "Email already registered");

        let msg = friendly_error(&anyhow::anyhow!("plain failure"));
        assert_eq!(msg, "plain failure");
    }
}
