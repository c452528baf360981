use serde::Deserialize;
use sqlx::FromRow;
use validator::{Validate, ValidationError, ValidationErrors};

#[derive(Debug, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// argon2 PHC string, never the plaintext.
    pub password: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RegisterForm {
    #[validate(
        length(min = 1, max = 20, message = "must be 1-20 characters"),
        custom(function = "valid_username")
    )]
    pub username: String,

    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,

    #[validate(
        length(min = 1, max = 50, message = "must be 1-50 characters"),
        email(message = "must be a valid email address")
    )]
    pub email: String,

    #[validate(length(min = 1, max = 30, message = "must be 1-30 characters"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 30, message = "must be 1-30 characters"))]
    pub last_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(length(min = 1, message = "is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

/// Usernames end up in URLs and cookies, so keep them to a boring charset.
fn valid_username(username: &str) -> Result<(), ValidationError> {
    let ok = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if ok {
        Ok(())
    } else {
        let mut err = ValidationError::new("username_charset");
        err.message = Some("may only contain letters, digits, '-', '_' and '.'".into());
        Err(err)
    }
}

pub fn validation_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut messages = Vec::new();

    for (field, errs) in errors.field_errors() {
        for err in errs {
            match &err.message {
                Some(msg) => messages.push(format!("{field} {msg}")),
                None => messages.push(format!("{field} is invalid")),
            }
        }
    }

    messages.sort();
    messages
}

#[cfg(test)]
mod test {
    use super::*;

    fn register_form() -> RegisterForm {
        RegisterForm {
            username: "alice".into(),
            password: "hunter2hunter2".into(),
            email: "alice@example.com".into(),
            first_name: "Alice".into(),
            last_name: "Archer".into(),
        }
    }

    #[test]
    fn well_formed_registration_passes() {
        assert!(register_form().validate().is_ok());
    }

    #[test]
    fn malformed_email_rejected() {
        let mut form = register_form();
        form.email = "not-an-email".into();

        let errors = form.validate().unwrap_err();
        let messages = validation_messages(&errors);
        assert_eq!(messages, ["email must be a valid email address"]);
    }

    #[test]
    fn short_password_rejected() {
        let mut form = register_form();
        form.password = "short".into();

        assert!(form.validate().is_err());
    }

    #[test]
    fn username_charset_restricted() {
        let mut form = register_form();
        form.username = "al ice".into();

        let errors = form.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("username"));
    }

    #[test]
    fn missing_fields_rejected() {
        let mut form = register_form();
        form.first_name = String::new();

        assert!(form.validate().is_err());

        let empty_login = LoginForm {
            username: String::new(),
            password: String::new(),
        };
        let errors = empty_login.validate().unwrap_err();
        assert_eq!(validation_messages(&errors).len(), 2);
    }
}
