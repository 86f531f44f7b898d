use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::models::User;

/// Session file name in the state directory
const SESSION_FILE: &str = "session.json";

/// Access token lifetime in minutes.
/// The engine issues JWTs that expire 30 minutes after issuance.
const TOKEN_EXPIRY_MINUTES: i64 = 30;

/// Buffer time before expiry to trigger refresh (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// The client-held proof of authentication: the bearer token plus the
/// user record it was issued for.
#[derive(Debug, Clone)]
pub struct SessionData {
    pub token: String,
    pub refresh_token: Option<String>,
    pub user: User,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(token: String, refresh_token: Option<String>, user: User) -> Self {
        Self {
            token,
            refresh_token,
            user,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        let expiry = self.created_at + Duration::minutes(TOKEN_EXPIRY_MINUTES);
        Utc::now() > expiry
    }

    /// Check if the session will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        let refresh_at = self.created_at
            + Duration::minutes(TOKEN_EXPIRY_MINUTES - TOKEN_REFRESH_BUFFER_MINUTES);
        Utc::now() > refresh_at
    }

    pub fn time_until_expiry(&self) -> Duration {
        let expiry = self.created_at + Duration::minutes(TOKEN_EXPIRY_MINUTES);
        expiry - Utc::now()
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        self.time_until_expiry().num_minutes().max(0)
    }
}

/// On-disk session store.
///
/// The JSON field names holding the token and the user record are the
/// configurable storage keys, so deployments can point other tooling at
/// the same state file under whatever names it expects.
pub struct Session {
    state_dir: PathBuf,
    token_key: String,
    user_key: String,
    pub data: Option<SessionData>,
}

impl Session {
    pub fn new(state_dir: PathBuf, token_key: String, user_key: String) -> Self {
        Self {
            state_dir,
            token_key,
            user_key,
            data: None,
        }
    }

    /// Load session from disk. Expired sessions are discarded, not
    /// resurrected.
    pub fn load(&mut self) -> Result<bool> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(false);
        }

        let contents =
            std::fs::read_to_string(&path).context("Failed to read session file")?;
        let value: Value =
            serde_json::from_str(&contents).context("Failed to parse session file")?;

        match self.data_from_value(&value) {
            Some(data) if !data.is_expired() => {
                self.data = Some(data);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        if let Some(ref data) = self.data {
            let path = self.session_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(&self.data_to_value(data)?)?;
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    /// Clear session data
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Update session with new data
    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    /// Get the bearer token if a session exists
    pub fn token(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.token.as_str())
    }

    /// Get the user record if a session exists
    pub fn user(&self) -> Option<&User> {
        self.data.as_ref().map(|d| &d.user)
    }

    /// Check if session is valid (exists and not expired)
    pub fn is_valid(&self) -> bool {
        self.data.as_ref().map(|d| !d.is_expired()).unwrap_or(false)
    }

    fn session_path(&self) -> PathBuf {
        self.state_dir.join(SESSION_FILE)
    }

    fn data_from_value(&self, value: &Value) -> Option<SessionData> {
        let token = value.get(&self.token_key)?.as_str()?.to_string();
        let user: User = serde_json::from_value(value.get(&self.user_key)?.clone()).ok()?;
        let refresh_token = value
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(String::from);
        let created_at = value
            .get("created_at")
            .and_then(Value::as_str)?
            .parse()
            .ok()?;

        Some(SessionData {
            token,
            refresh_token,
            user,
            created_at,
        })
    }

    fn data_to_value(&self, data: &SessionData) -> Result<Value> {
        let mut map = serde_json::Map::new();
        map.insert(self.token_key.clone(), Value::String(data.token.clone()));
        map.insert(self.user_key.clone(), serde_json::to_value(&data.user)?);
        if let Some(ref refresh_token) = data.refresh_token {
            map.insert(
                "refresh_token".to_string(),
                Value::String(refresh_token.clone()),
            );
        }
        map.insert(
            "created_at".to_string(),
            Value::String(data.created_at.to_rfc3339()),
        );
        Ok(Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_user() -> User {
        User {
            id: 1,
            email: "test@example.com".to_string(),
            full_name: Some("Test User".to_string()),
            ..Default::default()
        }
    }

    fn new_session(dir: &std::path::Path) -> Session {
        Session::new(
            dir.to_path_buf(),
            "medinsight_token".to_string(),
            "medinsight_user".to_string(),
        )
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = new_session(dir.path());
        session.update(SessionData::new(
            "abc".to_string(),
            Some("def".to_string()),
            sample_user(),
        ));
        session.save().unwrap();

        let mut loaded = new_session(dir.path());
        assert!(loaded.load().unwrap());
        assert_eq!(loaded.token(), Some("abc"));
        let data = loaded.data.as_ref().unwrap();
        assert_eq!(data.refresh_token.as_deref(), Some("def"));
        assert_eq!(data.user.email, "test@example.com");
        assert!(loaded.is_valid());
    }

    #[test]
    fn test_persisted_file_uses_storage_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(
            dir.path().to_path_buf(),
            "custom_token".to_string(),
            "custom_user".to_string(),
        );
        session.update(SessionData::new("abc".to_string(), None, sample_user()));
        session.save().unwrap();

        let raw = std::fs::read_to_string(dir.path().join(SESSION_FILE)).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["custom_token"], "abc");
        assert_eq!(value["custom_user"]["email"], "test@example.com");

        // A store configured with different keys does not see the session
        let mut other = new_session(dir.path());
        assert!(!other.load().unwrap());
        assert!(other.data.is_none());
    }

    #[test]
    fn test_expired_session_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = new_session(dir.path());
        let mut data = SessionData::new("abc".to_string(), None, sample_user());
        data.created_at = Utc::now() - Duration::minutes(TOKEN_EXPIRY_MINUTES + 1);
        session.update(data);
        session.save().unwrap();

        let mut loaded = new_session(dir.path());
        assert!(!loaded.load().unwrap());
        assert!(loaded.data.is_none());
        assert!(!loaded.is_valid());
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = new_session(dir.path());
        session.update(SessionData::new("abc".to_string(), None, sample_user()));
        session.save().unwrap();
        assert!(dir.path().join(SESSION_FILE).exists());

        session.clear().unwrap();
        assert!(session.data.is_none());
        assert!(!dir.path().join(SESSION_FILE).exists());

        // Clearing again is a no-op
        session.clear().unwrap();
    }

    #[test]
    fn test_needs_refresh_inside_buffer() {
        let mut data = SessionData::new("abc".to_string(), None, sample_user());
        assert!(!data.needs_refresh());
        assert!(!data.is_expired());

        data.created_at = Utc::now()
            - Duration::minutes(TOKEN_EXPIRY_MINUTES - TOKEN_REFRESH_BUFFER_MINUTES + 1);
        assert!(data.needs_refresh());
        assert!(!data.is_expired());
        assert!(data.minutes_until_expiry() <= TOKEN_REFRESH_BUFFER_MINUTES);
    }
}
