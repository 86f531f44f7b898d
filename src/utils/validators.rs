//! Input validation for account fields.
//!
//! These mirror the server-side checks so obviously-bad input fails
//! locally before a request is made. The server remains the authority;
//! anything it rejects surfaces as a `BadRequest` with its own message.

/// Minimum password length accepted by the server
const MIN_PASSWORD_LENGTH: usize = 8;

/// Passwords rejected outright regardless of complexity
const COMMON_PASSWORDS: &[&str] = &["password", "12345678", "qwerty", "admin", "letmein"];

/// Special characters that satisfy the complexity rule
const SPECIAL_CHARACTERS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Validate the shape of an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email cannot be empty".to_string());
    }
    if email.chars().any(char::is_whitespace) {
        return Err("Email cannot contain spaces".to_string());
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err("Email must contain an @".to_string());
    };

    if local.is_empty() {
        return Err("Email is missing the part before the @".to_string());
    }
    if domain.is_empty() || !domain.contains('.') {
        return Err("Email domain is not valid".to_string());
    }
    if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return Err("Email domain is not valid".to_string());
    }

    Ok(())
}

/// Check password complexity. Returns the list of rules the password
/// fails; empty means acceptable.
pub fn password_issues(password: &str) -> Vec<String> {
    let mut issues = Vec::new();

    if password.len() < MIN_PASSWORD_LENGTH {
        issues.push(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        issues.push("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        issues.push("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        issues.push("Password must contain at least one digit".to_string());
    }
    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        issues.push("Password must contain at least one special character".to_string());
    }
    if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        issues.push("Password is too common".to_string());
    }

    issues
}

/// Validate a username: 3-50 chars, alphanumeric with underscores and
/// hyphens, starting with a letter
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username cannot be empty".to_string());
    }
    if username.len() < 3 || username.len() > 50 {
        return Err("Username must be between 3 and 50 characters".to_string());
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(
            "Username can only contain letters, numbers, underscores, and hyphens".to_string(),
        );
    }
    if !username.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Err("Username must start with a letter".to_string());
    }

    Ok(())
}

/// Derive a username from the local part of an email address, replacing
/// characters the server rejects.
pub fn username_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    let mut username: String = local
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if !username.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        username.insert(0, 'u');
    }
    while username.len() < 3 {
        username.push('_');
    }
    username.truncate(50);
    username
}
