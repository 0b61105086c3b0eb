use crate::errors::BackendError;

/// Implemented by submitted forms that check their own fields.
pub trait Validate {
    fn validate(&self) -> Result<(), BackendError>;
}

/// Checks that `value` has between `min` and `max` characters.
pub fn length(field: &'static str, value: &str, min: usize, max: usize) -> Result<(), BackendError> {
    let count = value.chars().count();

    if count < min || count > max {
        Err(BackendError::validation(
            field,
            format!("must be between {} and {} characters long", min, max),
        ))
    } else {
        Ok(())
    }
}

/// Checks that `value` has at least `min` characters.
pub fn min_length(field: &'static str, value: &str, min: usize) -> Result<(), BackendError> {
    if value.chars().count() < min {
        Err(BackendError::validation(
            field,
            format!("must be at least {} characters long", min),
        ))
    } else {
        Ok(())
    }
}

/// A structural check: one `@`, something before it, and a dotted
/// domain after it. Deliverability is the mail server’s problem.
pub fn email(field: &'static str, value: &str) -> Result<(), BackendError> {
    let invalid = || BackendError::validation(field, "must be a valid email address");

    if value.chars().any(char::is_whitespace) || value.len() > 254 {
        return Err(invalid());
    }

    let mut parts = value.split('@');

    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None)
            if !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.') =>
        {
            Ok(())
        }
        _ => Err(invalid()),
    }
}

pub fn positive(field: &'static str, value: i32) -> Result<(), BackendError> {
    if value > 0 {
        Ok(())
    } else {
        Err(BackendError::validation(field, "must be a positive number"))
    }
}

/// Checks that a password and its confirmation match.
pub fn confirmed(password: &str, confirmation: &str) -> Result<(), BackendError> {
    if password == confirmation {
        Ok(())
    } else {
        Err(BackendError::validation(
            "confirm_password",
            "must match the password",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_count_characters() {
        assert!(length("name", "Zoë", 2, 3).is_ok());
        assert!(length("name", "Z", 2, 20).is_err());
        assert!(length("name", &"x".repeat(21), 2, 20).is_err());
    }

    #[test]
    fn emails() {
        for ok in &["a@b.co", "first.last@example.org"] {
            assert!(email("email", ok).is_ok(), "{:?} must be accepted", ok);
        }

        for bad in &["", "a", "a@b", "@b.co", "a@.co", "a@b.", "a@b@c.co", "a b@c.co"] {
            assert!(email("email", bad).is_err(), "{:?} must be rejected", bad);
        }
    }

    #[test]
    fn confirmations_must_match() {
        assert!(confirmed("hunter2", "hunter2").is_ok());
        assert!(confirmed("hunter2", "hunter3").is_err());
    }
}
