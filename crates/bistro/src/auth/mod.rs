//! Authentication gateway.
//!
//! [`IdentityProvider`] is the port to whatever manages accounts and the
//! current session; [`LocalIdentityProvider`] is the embedded implementation.
//! [`AuthGateway`] sits in front of a provider and turns its error codes into
//! the fixed set of messages shown to users, which differ per operation.

mod local;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};

pub use local::{IdentityPolicy, LocalIdentityProvider};

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    /// Stable user id.
    pub uid: String,
    /// E-mail address the account is registered under.
    pub email: String,
    /// Display name given at registration.
    pub display_name: Option<String>,
}

/// Error codes reported by an identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    /// The e-mail address is malformed.
    InvalidEmail,
    /// The password does not match.
    WrongPassword,
    /// No account exists for the e-mail address.
    UserNotFound,
    /// The account exists but is disabled.
    UserDisabled,
    /// The password does not meet the provider's strength rules.
    WeakPassword,
    /// Another account already uses the e-mail address.
    EmailAlreadyInUse,
    /// The provider is rate limiting the request.
    TooManyRequests,
    /// Anything else.
    Other,
}

impl AuthErrorCode {
    /// The provider's name for this code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidEmail => "INVALID_EMAIL",
            Self::WrongPassword => "WRONG_PASSWORD",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::UserDisabled => "USER_DISABLED",
            Self::WeakPassword => "WEAK_PASSWORD",
            Self::EmailAlreadyInUse => "EMAIL_ALREADY_IN_USE",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error reported by an identity provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {detail}")]
pub struct ProviderError {
    /// What went wrong.
    pub code: AuthErrorCode,
    /// Provider-supplied detail text.
    pub detail: String,
}

impl ProviderError {
    /// Create a new provider error.
    #[must_use]
    pub fn new(code: AuthErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    /// Create an error with [`AuthErrorCode::Other`].
    #[must_use]
    pub fn other(detail: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Other, detail)
    }
}

impl From<rusqlite::Error> for ProviderError {
    fn from(err: rusqlite::Error) -> Self {
        Self::other(err.to_string())
    }
}

/// Result type of identity provider calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Port to an identity provider.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync + fmt::Debug {
    /// Create an account and sign it in.
    async fn create_user(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> ProviderResult<AuthUser>;

    /// Sign in with e-mail and password.
    async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<AuthUser>;

    /// Dispatch a password reset message.
    async fn send_password_reset(&self, email: &str) -> ProviderResult<()>;

    /// List the sign-in methods registered for an e-mail address.
    async fn sign_in_methods(&self, email: &str) -> ProviderResult<Vec<String>>;

    /// The currently signed-in user, if any.
    fn current_user(&self) -> Option<AuthUser>;

    /// End the current session.
    async fn sign_out(&self) -> ProviderResult<()>;
}

/// The gateway operations with their own message tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    SignIn,
    Register,
    ResetPassword,
    SignOut,
}

impl Operation {
    fn message(self, err: &ProviderError) -> String {
        use AuthErrorCode as Code;

        let fixed = match (self, err.code) {
            (Self::SignIn | Self::Register, Code::InvalidEmail) => "Invalid email format",
            (Self::SignIn, Code::WrongPassword) => "Incorrect password",
            (Self::SignIn, Code::UserNotFound) => "No account found with this email",
            (Self::SignIn, Code::UserDisabled) => "This account has been disabled",
            (Self::Register, Code::WeakPassword) => "Password is too weak",
            (Self::Register, Code::EmailAlreadyInUse) => "Email is already registered",
            (Self::ResetPassword, Code::InvalidEmail) => "Please enter a valid email address",
            (Self::ResetPassword, Code::UserNotFound) => {
                "No account found with this email address"
            }
            (Self::ResetPassword, Code::TooManyRequests) => {
                "Too many attempts. Please try again later"
            }
            (Self::ResetPassword, _) => "Failed to send reset email. Please try again",
            (Self::SignIn, _) => return format!("Authentication failed: {}", err.detail),
            (Self::Register, _) => return format!("Registration failed: {}", err.detail),
            (Self::SignOut, _) => return format!("Failed to sign out: {}", err.detail),
        };
        fixed.to_string()
    }

    fn error(self, err: &ProviderError) -> Error {
        Error::Auth {
            code: err.code,
            message: self.message(err),
        }
    }
}

/// Front door for authentication.
#[derive(Debug, Clone)]
pub struct AuthGateway {
    provider: Arc<dyn IdentityProvider>,
}

impl AuthGateway {
    /// Create a gateway over an identity provider.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Sign in with e-mail and password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] with the sign-in message for the provider's code.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
        let user = self
            .provider
            .sign_in(email.trim(), password)
            .await
            .map_err(|e| Operation::SignIn.error(&e))?;
        info!("Signed in as {}", user.uid);
        Ok(user)
    }

    /// Register a new account. The new account is signed in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] with the registration message for the provider's code.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthUser> {
        let name = name.trim();
        let display_name = (!name.is_empty()).then_some(name);
        let user = self
            .provider
            .create_user(email.trim(), password, display_name)
            .await
            .map_err(|e| Operation::Register.error(&e))?;
        info!("Registered account {}", user.uid);
        Ok(user)
    }

    /// Send a password reset message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] with the reset message for the provider's code.
    pub async fn reset_password(&self, email: &str) -> Result<()> {
        self.provider
            .send_password_reset(email.trim())
            .await
            .map_err(|e| Operation::ResetPassword.error(&e))
    }

    /// End the current session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the provider fails to sign out.
    pub async fn sign_out(&self) -> Result<()> {
        self.provider
            .sign_out()
            .await
            .map_err(|e| Operation::SignOut.error(&e))
    }

    /// The currently signed-in user, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        self.provider.current_user()
    }

    /// The currently signed-in user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] carrying `message` when nobody is
    /// signed in.
    pub fn require_user(&self, message: &str) -> Result<AuthUser> {
        self.current_user()
            .ok_or_else(|| Error::not_authenticated(message))
    }

    /// Check if an account exists for an e-mail address.
    ///
    /// Any provider failure counts as "not registered".
    pub async fn is_email_registered(&self, email: &str) -> bool {
        match self.provider.sign_in_methods(email.trim()).await {
            Ok(methods) => !methods.is_empty(),
            Err(err) => {
                warn!("Could not look up sign-in methods: {}", err);
                false
            }
        }
    }
}
