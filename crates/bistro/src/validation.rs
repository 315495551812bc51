//! Client-side input validation.
//!
//! These checks run before anything reaches the identity provider or the
//! store, and fail with [`Error::Validation`] naming the offending field.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Default shortest password accepted at registration.
pub const MIN_PASSWORD_LENGTH: usize = 6;

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

/// Check that an address looks like `local@domain.tld`.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$")
            .expect("Invalid regex pattern")
    });
    regex.is_match(email.trim())
}

/// Validate the login form.
///
/// # Errors
///
/// Returns a validation error if either field is blank.
pub fn validate_login(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() {
        let field = if email.trim().is_empty() {
            "email"
        } else {
            "password"
        };
        return Err(Error::validation(field, "Please fill in all fields"));
    }
    Ok(())
}

/// Validate the registration form.
///
/// # Errors
///
/// Returns a validation error for the first field that fails.
pub fn validate_registration(
    name: &str,
    email: &str,
    password: &str,
    confirm_password: &str,
    min_password_length: usize,
) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation("name", "Name is required"));
    }
    if email.trim().is_empty() {
        return Err(Error::validation("email", "Email is required"));
    }
    if !is_valid_email(email) {
        return Err(Error::validation("email", "Invalid email format"));
    }
    if password.is_empty() {
        return Err(Error::validation("password", "Password is required"));
    }
    if password.chars().count() < min_password_length {
        return Err(Error::validation(
            "password",
            format!("Password must be at least {min_password_length} characters"),
        ));
    }
    if confirm_password.is_empty() {
        return Err(Error::validation(
            "confirm_password",
            "Please confirm your password",
        ));
    }
    if password != confirm_password {
        return Err(Error::validation("confirm_password", "Passwords do not match"));
    }
    Ok(())
}

/// Validate the password reset form.
///
/// # Errors
///
/// Returns a validation error if the address is blank.
pub fn validate_reset(email: &str) -> Result<()> {
    if email.trim().is_empty() {
        return Err(Error::validation("email", "Email is required"));
    }
    Ok(())
}

/// Split multi-line form text into trimmed, non-blank lines.
#[must_use]
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
