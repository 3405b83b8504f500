//! Form payloads and their validation rules.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::errors::{AppError, FieldErrors};
use crate::request::Request;

/// Lifetimes, in days, a snippet may be created with.
pub const EXPIRY_OPTIONS: [i64; 3] = [1, 7, 365];
const TITLE_MAX_CHARS: usize = 100;
const PASSWORD_MIN_CHARS: usize = 10;

const BLANK: &str = "This field cannot be blank";
const INVALID: &str = "This field is invalid";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$")
        .expect("email pattern compiles")
});

/// Decode an `application/x-www-form-urlencoded` body.
pub fn parse<T: DeserializeOwned>(req: &Request) -> Result<T, AppError> {
    serde_urlencoded::from_bytes(req.body()).map_err(|e| AppError::BadRequest(e.to_string()))
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SnippetForm {
    pub title: String,
    pub content: String,
    pub expires: String,
}

impl SnippetForm {
    /// Blank form with the longest lifetime preselected.
    pub fn blank() -> Self {
        Self { expires: "365".to_owned(), ..Self::default() }
    }

    /// The requested lifetime in days, or every field problem found.
    pub fn validate(&self) -> Result<i64, FieldErrors> {
        let mut errors = FieldErrors::new();

        if self.title.trim().is_empty() {
            errors.insert("title", BLANK.to_owned());
        } else if self.title.chars().count() > TITLE_MAX_CHARS {
            errors.insert("title", format!("This field is too long (maximum is {TITLE_MAX_CHARS} characters)"));
        }
        if self.content.trim().is_empty() {
            errors.insert("content", BLANK.to_owned());
        }

        let days = self.expires.trim().parse::<i64>().ok().filter(|d| EXPIRY_OPTIONS.contains(d));
        if self.expires.trim().is_empty() {
            errors.insert("expires", BLANK.to_owned());
        } else if days.is_none() {
            errors.insert("expires", INVALID.to_owned());
        }

        match days {
            Some(days) if errors.is_empty() => Ok(days),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl SignupForm {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        if self.name.trim().is_empty() {
            errors.insert("name", BLANK.to_owned());
        }
        if self.email.trim().is_empty() {
            errors.insert("email", BLANK.to_owned());
        } else if !EMAIL_RE.is_match(self.email.trim()) {
            errors.insert("email", INVALID.to_owned());
        }
        if self.password.is_empty() {
            errors.insert("password", BLANK.to_owned());
        } else if self.password.chars().count() < PASSWORD_MIN_CHARS {
            errors.insert("password", format!("This field is too short (minimum is {PASSWORD_MIN_CHARS} characters)"));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    fn snippet(title: &str, content: &str, expires: &str) -> SnippetForm {
        SnippetForm { title: title.into(), content: content.into(), expires: expires.into() }
    }

    #[test]
    fn valid_snippet_yields_days() {
        assert_eq!(snippet("Title", "Body", "7").validate(), Ok(7));
    }

    #[test]
    fn snippet_field_errors_are_collected() {
        let errors = snippet(" ", "", "3").validate().unwrap_err();
        assert_eq!(errors["title"], BLANK);
        assert_eq!(errors["content"], BLANK);
        assert_eq!(errors["expires"], INVALID);

        let errors = snippet(&"x".repeat(101), "Body", "").validate().unwrap_err();
        assert!(errors["title"].contains("maximum is 100"));
        assert_eq!(errors["expires"], BLANK);
    }

    #[test]
    fn title_limit_counts_characters_not_bytes() {
        assert_eq!(snippet(&"é".repeat(100), "Body", "1").validate(), Ok(1));
    }

    #[test]
    fn signup_rules() {
        let ok = SignupForm { name: "Ann".into(), email: "ann@example.com".into(), password: "long-enough-pw".into() };
        assert!(ok.validate().is_ok());

        let bad = SignupForm { name: "".into(), email: "not-an-email".into(), password: "short".into() };
        let errors = bad.validate().unwrap_err();
        assert_eq!(errors["name"], BLANK);
        assert_eq!(errors["email"], INVALID);
        assert!(errors["password"].contains("minimum is 10"));
    }

    #[test]
    fn parses_urlencoded_bodies_with_missing_fields() {
        let req = Request::new(Method::Post, "/snippet/create").with_body("title=Hi+there&expires=7");
        let form: SnippetForm = parse(&req).unwrap();
        assert_eq!(form.title, "Hi there");
        assert_eq!(form.content, "");
        assert_eq!(form.expires, "7");
    }

    #[test]
    fn serialised_forms_never_echo_passwords() {
        let form = LoginForm { email: "a@b.co".into(), password: "secret-value".into() };
        let json = serde_json::to_string(&form).unwrap();
        assert!(!json.contains("secret-value"));
    }
}
