//! Embedded identity provider backed by `SQLite`.
//!
//! Accounts live in their own database next to the document store. Password
//! reset "e-mails" are appended to an outbox table and logged; nothing is sent
//! over the network.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock};

use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::store::schema::IDENTITY_SCHEMA;
use crate::store::{generate_id, migrations, timestamp_text};
use crate::validation::{is_valid_email, MIN_PASSWORD_LENGTH};

use super::{AuthErrorCode, AuthUser, IdentityProvider, ProviderError, ProviderResult};

/// Length of generated user ids.
const UID_LEN: usize = 28;

/// Length of per-account password salts.
const SALT_LEN: usize = 16;

/// Context string for deriving password keys.
const PASSWORD_CONTEXT: &str = "bistro local identity 2024-06 password digest";

/// Keyed hash rounds applied to every password digest.
const PASSWORD_ROUNDS: u32 = 10_000;

/// Sign-in method reported for password accounts.
const PASSWORD_METHOD: &str = "password";

/// Rules enforced by the embedded provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityPolicy {
    /// Shortest accepted password, in characters.
    pub min_password_length: usize,
    /// Reset requests accepted per address in any rolling hour.
    pub max_reset_requests_per_hour: u32,
}

impl Default for IdentityPolicy {
    fn default() -> Self {
        Self {
            min_password_length: MIN_PASSWORD_LENGTH,
            max_reset_requests_per_hour: 5,
        }
    }
}

/// Identity provider storing accounts and the session in a local database.
#[derive(Debug)]
pub struct LocalIdentityProvider {
    path: PathBuf,
    conn: Mutex<Connection>,
    session: RwLock<Option<AuthUser>>,
    policy: IdentityPolicy,
}

impl LocalIdentityProvider {
    /// Open or create an identity database, restoring any saved session.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>, policy: IdentityPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening identity database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn, &IDENTITY_SCHEMA)?;

        Self::with_connection(path, conn, policy)
    }

    /// Create an in-memory identity provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory(policy: IdentityPolicy) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn, &IDENTITY_SCHEMA)?;

        Self::with_connection(PathBuf::from(":memory:"), conn, policy)
    }

    fn with_connection(path: PathBuf, conn: Connection, policy: IdentityPolicy) -> Result<Self> {
        let session = load_session(&conn)?;
        if let Some(user) = &session {
            debug!("Restored session for {}", user.uid);
        }

        Ok(Self {
            path,
            conn: Mutex::new(conn),
            session: RwLock::new(session),
            policy,
        })
    }

    /// Get the path to the identity database.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the rules this provider enforces.
    #[must_use]
    pub fn policy(&self) -> IdentityPolicy {
        self.policy
    }

    fn lock(&self) -> ProviderResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ProviderError::other("identity database lock poisoned"))
    }

    fn set_session(&self, user: Option<AuthUser>) {
        if let Ok(mut session) = self.session.write() {
            *session = user;
        }
    }

    /// Enable or disable an account.
    ///
    /// Disabling the signed-in account also ends the session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthErrorCode::UserNotFound`] if no account uses `email`.
    pub fn set_disabled(&self, email: &str, disabled: bool) -> ProviderResult<()> {
        let email = normalize_email(email);
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE accounts SET disabled = ?1 WHERE email = ?2",
            params![disabled, email],
        )?;
        if affected == 0 {
            return Err(ProviderError::new(
                AuthErrorCode::UserNotFound,
                format!("no account for {email}"),
            ));
        }

        let signed_in = self.current().is_some_and(|user| user.email == email);
        if disabled && signed_in {
            conn.execute("DELETE FROM session", [])?;
            drop(conn);
            self.set_session(None);
        }

        info!(
            "Account {} {}",
            email,
            if disabled { "disabled" } else { "enabled" }
        );
        Ok(())
    }

    /// Number of reset requests recorded for an address within the last hour.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_reset_requests(&self, email: &str) -> ProviderResult<u32> {
        let conn = self.lock()?;
        count_recent_resets(&conn, &normalize_email(email))
    }

    fn current(&self) -> Option<AuthUser> {
        self.session.read().ok().and_then(|session| session.clone())
    }

    fn create_user_sync(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> ProviderResult<AuthUser> {
        let email = checked_email(email)?;
        if password.chars().count() < self.policy.min_password_length {
            return Err(ProviderError::new(
                AuthErrorCode::WeakPassword,
                format!(
                    "password must be at least {} characters",
                    self.policy.min_password_length
                ),
            ));
        }

        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = ?1)",
            [&email],
            |row| row.get(0),
        )?;
        if exists {
            return Err(ProviderError::new(
                AuthErrorCode::EmailAlreadyInUse,
                format!("{email} is already registered"),
            ));
        }

        let user = AuthUser {
            uid: generate_id(UID_LEN),
            email,
            display_name: display_name.map(str::to_string),
        };
        let salt = generate_id(SALT_LEN);
        let hash = hash_password(&salt, password);

        conn.execute(
            r"
            INSERT INTO accounts (uid, email, display_name, password_salt, password_hash, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                user.uid,
                user.email,
                user.display_name,
                salt,
                hash.to_hex().as_str(),
                timestamp_text(Utc::now()),
            ],
        )?;
        save_session(&conn, &user.uid)?;
        drop(conn);

        self.set_session(Some(user.clone()));
        Ok(user)
    }

    fn sign_in_sync(&self, email: &str, password: &str) -> ProviderResult<AuthUser> {
        let email = checked_email(email)?;
        let conn = self.lock()?;

        let row: Option<(String, Option<String>, String, String, bool)> = conn
            .query_row(
                r"
                SELECT uid, display_name, password_salt, password_hash, disabled
                FROM accounts WHERE email = ?1
                ",
                [&email],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        let Some((uid, display_name, salt, stored_hash, disabled)) = row else {
            return Err(ProviderError::new(
                AuthErrorCode::UserNotFound,
                format!("no account for {email}"),
            ));
        };
        if disabled {
            return Err(ProviderError::new(
                AuthErrorCode::UserDisabled,
                format!("account {uid} is disabled"),
            ));
        }

        let stored = blake3::Hash::from_hex(&stored_hash)
            .map_err(|e| ProviderError::other(format!("corrupt password hash: {e}")))?;
        // `Hash` equality is constant time.
        if hash_password(&salt, password) != stored {
            return Err(ProviderError::new(
                AuthErrorCode::WrongPassword,
                "password does not match",
            ));
        }

        save_session(&conn, &uid)?;
        drop(conn);

        let user = AuthUser {
            uid,
            email,
            display_name,
        };
        self.set_session(Some(user.clone()));
        Ok(user)
    }

    fn send_password_reset_sync(&self, email: &str) -> ProviderResult<()> {
        let email = checked_email(email)?;
        let conn = self.lock()?;

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = ?1)",
            [&email],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(ProviderError::new(
                AuthErrorCode::UserNotFound,
                format!("no account for {email}"),
            ));
        }

        if count_recent_resets(&conn, &email)? >= self.policy.max_reset_requests_per_hour {
            return Err(ProviderError::new(
                AuthErrorCode::TooManyRequests,
                "reset request limit reached",
            ));
        }

        conn.execute(
            "INSERT INTO password_resets (email, requested_at) VALUES (?1, ?2)",
            params![email, timestamp_text(Utc::now())],
        )?;

        info!("Queued password reset message for {}", email);
        Ok(())
    }

    fn sign_in_methods_sync(&self, email: &str) -> ProviderResult<Vec<String>> {
        let email = checked_email(email)?;
        let exists: bool = self.lock()?.query_row(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = ?1)",
            [&email],
            |row| row.get(0),
        )?;

        Ok(if exists {
            vec![PASSWORD_METHOD.to_string()]
        } else {
            Vec::new()
        })
    }

    fn sign_out_sync(&self) -> ProviderResult<()> {
        self.lock()?.execute("DELETE FROM session", [])?;
        self.set_session(None);
        Ok(())
    }
}

#[async_trait::async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn create_user(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> ProviderResult<AuthUser> {
        self.create_user_sync(email, password, display_name)
    }

    async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<AuthUser> {
        self.sign_in_sync(email, password)
    }

    async fn send_password_reset(&self, email: &str) -> ProviderResult<()> {
        self.send_password_reset_sync(email)
    }

    async fn sign_in_methods(&self, email: &str) -> ProviderResult<Vec<String>> {
        self.sign_in_methods_sync(email)
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.current()
    }

    async fn sign_out(&self) -> ProviderResult<()> {
        self.sign_out_sync()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn checked_email(email: &str) -> ProviderResult<String> {
    let email = normalize_email(email);
    if is_valid_email(&email) {
        Ok(email)
    } else {
        Err(ProviderError::new(
            AuthErrorCode::InvalidEmail,
            format!("malformed address: {email}"),
        ))
    }
}

/// Stretch a salted password into its stored digest.
///
/// The salt has a fixed length, so salt and password can't be shifted into
/// each other.
fn hash_password(salt: &str, password: &str) -> blake3::Hash {
    let mut material = Vec::with_capacity(salt.len() + password.len());
    material.extend_from_slice(salt.as_bytes());
    material.extend_from_slice(password.as_bytes());
    let key = blake3::derive_key(PASSWORD_CONTEXT, &material);

    // Each guess costs PASSWORD_ROUNDS keyed hashes
    let mut digest = blake3::keyed_hash(&key, salt.as_bytes());
    for _ in 1..PASSWORD_ROUNDS {
        digest = blake3::keyed_hash(&key, digest.as_bytes());
    }
    digest
}

fn save_session(conn: &Connection, uid: &str) -> ProviderResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO session (slot, uid, signed_in_at) VALUES (0, ?1, ?2)",
        params![uid, timestamp_text(Utc::now())],
    )?;
    Ok(())
}

fn load_session(conn: &Connection) -> Result<Option<AuthUser>> {
    let user = conn
        .query_row(
            r"
            SELECT a.uid, a.email, a.display_name
            FROM session s JOIN accounts a ON a.uid = s.uid
            WHERE s.slot = 0 AND a.disabled = 0
            ",
            [],
            |row| {
                Ok(AuthUser {
                    uid: row.get(0)?,
                    email: row.get(1)?,
                    display_name: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

fn count_recent_resets(conn: &Connection, email: &str) -> ProviderResult<u32> {
    let since = timestamp_text(Utc::now() - Duration::hours(1));
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM password_resets WHERE email = ?1 AND requested_at >= ?2",
        params![email, since],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_provider() -> LocalIdentityProvider {
        LocalIdentityProvider::open_in_memory(IdentityPolicy::default())
            .expect("failed to create test provider")
    }

    fn register(provider: &LocalIdentityProvider, email: &str) -> AuthUser {
        provider
            .create_user_sync(email, "secret1", Some("Cook"))
            .unwrap()
    }

    #[test]
    fn test_policy_defaults() {
        let policy = IdentityPolicy::default();
        assert_eq!(policy.min_password_length, 6);
        assert_eq!(policy.max_reset_requests_per_hour, 5);
    }

    #[test]
    fn test_create_user_signs_in() {
        let provider = create_test_provider();
        assert!(provider.current().is_none());

        let user = register(&provider, "Cook@Example.com");
        assert_eq!(user.email, "cook@example.com");
        assert_eq!(user.display_name.as_deref(), Some("Cook"));
        assert_eq!(user.uid.len(), UID_LEN);
        assert_eq!(provider.current(), Some(user));
    }

    #[test]
    fn test_create_user_rejects_invalid_email() {
        let provider = create_test_provider();
        let err = provider
            .create_user_sync("not-an-email", "secret1", None)
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::InvalidEmail);
    }

    #[test]
    fn test_create_user_rejects_weak_password() {
        let provider = create_test_provider();
        let err = provider
            .create_user_sync("a@example.com", "12345", None)
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::WeakPassword);
    }

    #[test]
    fn test_create_user_rejects_duplicate_email_case_insensitively() {
        let provider = create_test_provider();
        register(&provider, "a@example.com");
        let err = provider
            .create_user_sync("A@EXAMPLE.COM", "secret1", None)
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::EmailAlreadyInUse);
    }

    #[test]
    fn test_sign_in() {
        let provider = create_test_provider();
        let user = register(&provider, "a@example.com");
        provider.sign_out_sync().unwrap();

        let signed_in = provider.sign_in_sync("a@example.com", "secret1").unwrap();
        assert_eq!(signed_in, user);
        assert_eq!(provider.current(), Some(user));
    }

    #[test]
    fn test_sign_in_wrong_password() {
        let provider = create_test_provider();
        register(&provider, "a@example.com");
        provider.sign_out_sync().unwrap();

        let err = provider.sign_in_sync("a@example.com", "wrong!").unwrap_err();
        assert_eq!(err.code, AuthErrorCode::WrongPassword);
        assert!(provider.current().is_none());
    }

    #[test]
    fn test_sign_in_unknown_user() {
        let provider = create_test_provider();
        let err = provider.sign_in_sync("nobody@example.com", "secret1").unwrap_err();
        assert_eq!(err.code, AuthErrorCode::UserNotFound);
    }

    #[test]
    fn test_disabled_account() {
        let provider = create_test_provider();
        register(&provider, "a@example.com");

        provider.set_disabled("a@example.com", true).unwrap();
        assert!(provider.current().is_none());

        let err = provider.sign_in_sync("a@example.com", "secret1").unwrap_err();
        assert_eq!(err.code, AuthErrorCode::UserDisabled);

        provider.set_disabled("a@example.com", false).unwrap();
        assert!(provider.sign_in_sync("a@example.com", "secret1").is_ok());
    }

    #[test]
    fn test_set_disabled_unknown_user() {
        let provider = create_test_provider();
        let err = provider.set_disabled("x@example.com", true).unwrap_err();
        assert_eq!(err.code, AuthErrorCode::UserNotFound);
    }

    #[test]
    fn test_password_reset_rate_limit() {
        let provider = LocalIdentityProvider::open_in_memory(IdentityPolicy {
            min_password_length: 6,
            max_reset_requests_per_hour: 2,
        })
        .unwrap();
        register(&provider, "a@example.com");

        provider.send_password_reset_sync("a@example.com").unwrap();
        provider.send_password_reset_sync("a@example.com").unwrap();
        let err = provider.send_password_reset_sync("a@example.com").unwrap_err();
        assert_eq!(err.code, AuthErrorCode::TooManyRequests);
        assert_eq!(provider.recent_reset_requests("a@example.com").unwrap(), 2);
    }

    #[test]
    fn test_password_reset_unknown_user() {
        let provider = create_test_provider();
        let err = provider
            .send_password_reset_sync("nobody@example.com")
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::UserNotFound);

        let err = provider.send_password_reset_sync("nope").unwrap_err();
        assert_eq!(err.code, AuthErrorCode::InvalidEmail);
    }

    #[test]
    fn test_sign_in_methods() {
        let provider = create_test_provider();
        register(&provider, "a@example.com");

        assert_eq!(
            provider.sign_in_methods_sync("a@example.com").unwrap(),
            vec!["password".to_string()]
        );
        assert!(provider
            .sign_in_methods_sync("b@example.com")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_session_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("bistro-identity-{}", generate_id(12)));
        let path = dir.join("identity.db");

        let user = {
            let provider = LocalIdentityProvider::open(&path, IdentityPolicy::default()).unwrap();
            register(&provider, "a@example.com")
        };

        let reopened = LocalIdentityProvider::open(&path, IdentityPolicy::default()).unwrap();
        assert_eq!(reopened.current(), Some(user));

        reopened.sign_out_sync().unwrap();
        drop(reopened);
        let reopened = LocalIdentityProvider::open(&path, IdentityPolicy::default()).unwrap();
        assert!(reopened.current().is_none());

        drop(reopened);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_passwords_are_not_stored_in_plain_text() {
        let provider = create_test_provider();
        register(&provider, "a@example.com");

        let conn = provider.lock().unwrap();
        let (salt, hash): (String, String) = conn
            .query_row(
                "SELECT password_salt, password_hash FROM accounts",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_ne!(hash, "secret1");
        assert_eq!(salt.len(), SALT_LEN);
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_password_digest_is_stretched() {
        let digest = hash_password("0123456789abcdef", "secret1");

        assert_eq!(digest, hash_password("0123456789abcdef", "secret1"));
        assert_ne!(digest, hash_password("fedcba9876543210", "secret1"));
        assert_ne!(digest, hash_password("0123456789abcdef", "secret2"));

        let mut single_pass = blake3::Hasher::new();
        single_pass.update(b"0123456789abcdef");
        single_pass.update(b"secret1");
        assert_ne!(digest, single_pass.finalize());
    }
}
