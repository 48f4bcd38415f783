use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

pub const MAX_CHAT_MESSAGE_CHARS: usize = 2000;
const MIN_PASSWORD_CHARS: usize = 8;
const USERNAME_MIN_CHARS: usize = 3;
const USERNAME_MAX_CHARS: usize = 30;

/// First rule a form broke. Raised before anything goes over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    fn new(message: &str) -> Self {
        Self(message.to_string())
    }
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"))
}

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("username pattern"))
}

fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::new("Email is required"));
    }
    if !email_pattern().is_match(email) {
        return Err(ValidationError::new("Please enter a valid email address"));
    }
    Ok(())
}

pub fn validate_login(email: &str, password: &str) -> Result<(), ValidationError> {
    validate_email(email)?;
    if password.is_empty() {
        return Err(ValidationError::new("Password is required"));
    }
    Ok(())
}

pub fn validate_signup(email: &str, username: &str, password: &str) -> Result<(), ValidationError> {
    validate_email(email)?;

    let username = username.trim();
    let len = username.chars().count();
    if len < USERNAME_MIN_CHARS {
        return Err(ValidationError::new(
            "Username must be at least 3 characters",
        ));
    }
    if len > USERNAME_MAX_CHARS {
        return Err(ValidationError::new(
            "Username must be at most 30 characters",
        ));
    }
    if !username_pattern().is_match(username) {
        return Err(ValidationError::new(
            "Username may only contain letters, numbers, underscores and hyphens",
        ));
    }

    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ValidationError::new(
            "Password must be at least 8 characters",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic())
        || !password.chars().any(|c| c.is_ascii_digit())
    {
        return Err(ValidationError::new(
            "Password must contain at least one letter and one number",
        ));
    }
    Ok(())
}

pub fn validate_chat_message(message: &str) -> Result<(), ValidationError> {
    if message.trim().is_empty() {
        return Err(ValidationError::new("Message cannot be empty"));
    }
    if message.chars().count() > MAX_CHAT_MESSAGE_CHARS {
        return Err(ValidationError::new(
            "Message must be at most 2000 characters",
        ));
    }
    Ok(())
}

pub fn validate_anilist_key(key: &str) -> Result<(), ValidationError> {
    if key.trim().is_empty() {
        return Err(ValidationError::new("AniList API key is required"));
    }
    Ok(())
}

/// Public-profile sync needs exactly one way to find the profile.
pub fn validate_sync_profile(
    username: Option<&str>,
    user_id: Option<u64>,
) -> Result<(), ValidationError> {
    let username = username.map(str::trim).filter(|s| !s.is_empty());
    match (username, user_id) {
        (Some(_), Some(_)) => Err(ValidationError::new(
            "Cannot provide both username and userId",
        )),
        (None, None) => Err(ValidationError::new(
            "Either username or userId must be provided",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_reports_first_broken_rule() {
        assert_eq!(
            validate_login("", "").unwrap_err().to_string(),
            "Email is required"
        );
        assert_eq!(
            validate_login("not-an-email", "").unwrap_err().to_string(),
            "Please enter a valid email address"
        );
        assert_eq!(
            validate_login("a@b.co", "").unwrap_err().to_string(),
            "Password is required"
        );
        assert!(validate_login(" a@b.co ", "x").is_ok());
    }

    #[test]
    fn signup_checks_username_then_password() {
        assert_eq!(
            validate_signup("a@b.co", "ab", "password1")
                .unwrap_err()
                .to_string(),
            "Username must be at least 3 characters"
        );
        assert_eq!(
            validate_signup("a@b.co", "bad name", "password1")
                .unwrap_err()
                .to_string(),
            "Username may only contain letters, numbers, underscores and hyphens"
        );
        assert_eq!(
            validate_signup("a@b.co", "mika", "short1")
                .unwrap_err()
                .to_string(),
            "Password must be at least 8 characters"
        );
        assert_eq!(
            validate_signup("a@b.co", "mika", "passwordonly")
                .unwrap_err()
                .to_string(),
            "Password must contain at least one letter and one number"
        );
        assert!(validate_signup("a@b.co", "mika_01", "password1").is_ok());
    }

    #[test]
    fn chat_message_must_have_content_and_fit() {
        assert!(validate_chat_message("   ").is_err());
        assert!(validate_chat_message(&"a".repeat(MAX_CHAT_MESSAGE_CHARS)).is_ok());
        assert!(validate_chat_message(&"a".repeat(MAX_CHAT_MESSAGE_CHARS + 1)).is_err());
    }

    #[test]
    fn sync_profile_requires_exactly_one_identifier() {
        assert_eq!(
            validate_sync_profile(Some("mika"), Some(5))
                .unwrap_err()
                .to_string(),
            "Cannot provide both username and userId"
        );
        assert_eq!(
            validate_sync_profile(None, None).unwrap_err().to_string(),
            "Either username or userId must be provided"
        );
        assert_eq!(
            validate_sync_profile(Some("  "), None)
                .unwrap_err()
                .to_string(),
            "Either username or userId must be provided"
        );
        assert!(validate_sync_profile(Some("mika"), None).is_ok());
        assert!(validate_sync_profile(None, Some(5)).is_ok());
    }
}
