use crate::error::ValidationError;
use regex::Regex;
use std::sync::LazyLock;

/// Centralized validation for form input.
///
/// Services call these before touching storage, so a `ValidationError` always
/// means nothing was written.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("Invalid email regex pattern")
});

static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]{3,20}$").expect("Invalid username regex pattern"));

/// Minimum password length in bytes.
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Maximum password length in bytes.
pub const PASSWORD_MAX_LENGTH: usize = 128;

/// Maximum post title length in characters.
pub const TITLE_MAX_LENGTH: usize = 255;

/// Validates an email address
///
/// # Examples
///
/// ```rust
/// use quill_core::validation::validate_email;
///
/// assert!(validate_email("user@example.com").is_ok());
/// assert!(validate_email("invalid-email").is_err());
/// ```
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::MissingField(
            "Email is required".to_string(),
        ));
    }

    if email.len() > 254 {
        return Err(ValidationError::InvalidEmail(
            "Email is too long".to_string(),
        ));
    }

    if EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(email.to_string()))
    }
}

/// Validates a username: 3 to 20 ASCII letters, digits or underscores.
///
/// ```rust
/// use quill_core::validation::validate_username;
///
/// assert!(validate_username("alice_59").is_ok());
/// assert!(validate_username("no spaces").is_err());
/// ```
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::MissingField(
            "Username is required".to_string(),
        ));
    }

    if USERNAME_REGEX.is_match(username) {
        Ok(())
    } else {
        Err(ValidationError::InvalidUsername(
            "Username must be 3-20 characters of letters, digits and underscores".to_string(),
        ))
    }
}

/// Validates a password according to security requirements
///
/// - Minimum 8 characters
/// - Maximum 128 characters
/// - Cannot be empty or whitespace only
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::MissingField(
            "Password is required".to_string(),
        ));
    }

    if password.trim().is_empty() {
        return Err(ValidationError::InvalidPassword(
            "Password cannot be only whitespace".to_string(),
        ));
    }

    if password.len() < PASSWORD_MIN_LENGTH {
        return Err(ValidationError::InvalidPassword(format!(
            "Password must be at least {PASSWORD_MIN_LENGTH} characters long"
        )));
    }

    if password.len() > PASSWORD_MAX_LENGTH {
        return Err(ValidationError::InvalidPassword(format!(
            "Password must be no more than {PASSWORD_MAX_LENGTH} characters long"
        )));
    }

    Ok(())
}

/// Validates a new password together with its confirmation field.
pub fn validate_new_password(password: &str, confirmation: &str) -> Result<(), ValidationError> {
    validate_password(password)?;
    if password != confirmation {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

/// Validates an optional display name (at most 100 characters, not blank).
pub fn validate_display_name(name: Option<&str>) -> Result<(), ValidationError> {
    if let Some(name) = name {
        if name.trim().is_empty() {
            return Err(ValidationError::InvalidField(
                "Display name cannot be empty or whitespace only".to_string(),
            ));
        }

        if name.chars().count() > 100 {
            return Err(ValidationError::InvalidField(
                "Display name must be no more than 100 characters long".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates a post title: required, at most 255 characters.
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::MissingField(
            "Title is required".to_string(),
        ));
    }

    if title.chars().count() > TITLE_MAX_LENGTH {
        return Err(ValidationError::InvalidField(format!(
            "Title must be no more than {TITLE_MAX_LENGTH} characters long"
        )));
    }

    Ok(())
}

/// Validates a category name: required, at most 50 characters.
pub fn validate_category_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::MissingField(
            "Category name is required".to_string(),
        ));
    }

    if name.chars().count() > 50 {
        return Err(ValidationError::InvalidField(
            "Category name must be no more than 50 characters long".to_string(),
        ));
    }

    Ok(())
}
