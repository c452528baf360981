use serde::Deserialize;
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, FromRow, PartialEq, Eq)]
pub struct Feedback {
    pub id: i64,
    pub title: String,
    pub content: String,
    /// Owner, references users.username.
    pub username: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FeedbackForm {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub title: String,

    #[validate(length(min = 1, message = "must not be empty"))]
    pub content: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_title_rejected() {
        let form = FeedbackForm {
            title: String::new(),
            content: "some content".into(),
        };
        assert!(form.validate().is_err());
    }

    #[test]
    fn filled_form_passes() {
        let form = FeedbackForm {
            title: "a title".into(),
            content: "some content".into(),
        };
        assert!(form.validate().is_ok());
    }
}
