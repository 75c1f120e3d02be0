use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::OnceLock;

use crate::entities::accounts;

pub const USERNAME_LENGTH: RangeInclusive<usize> = 3..=30;
pub const EMAIL_LENGTH: RangeInclusive<usize> = 3..=255;
pub const PASSWORD_LENGTH: RangeInclusive<usize> = 6..=255;

/// Local part, `@`, then dot-separated DNS labels (the HTML5 / RFC 5322 subset
/// browsers accept for `type=email`).
const EMAIL_PATTERN: &str = r"\A[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*\z";

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("Invalid email regex"))
}

#[must_use]
pub fn is_email(input: &str) -> bool {
    email_regex().is_match(input)
}

/// Account data without the password digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub session_token: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<accounts::Model> for Account {
    fn from(model: accounts::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            session_token: model.session_token,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Registration input. `password` is never persisted; `session_token` is
/// filled by the pre-save hook when left empty.
#[derive(Clone, Default)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[set]"))
            .finish()
    }
}

impl NewAccount {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            session_token: None,
        }
    }

    /// Format and length checks. Uniqueness is checked against the store.
    #[must_use]
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::default();

        check_length(&mut errors, "username", &self.username, &USERNAME_LENGTH);
        if is_email(&self.username) {
            errors.add("username", "can't be an email");
        }

        check_length(&mut errors, "email", &self.email, &EMAIL_LENGTH);
        if !is_email(&self.email) {
            errors.add("email", "is invalid");
        }

        if self.password.is_empty() {
            errors.add("password", "can't be blank");
        } else {
            check_length(&mut errors, "password", &self.password, &PASSWORD_LENGTH);
        }

        errors
    }
}

fn check_length(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: &str,
    range: &RangeInclusive<usize>,
) {
    let len = value.chars().count();
    if len < *range.start() {
        errors.add(
            field,
            format!("is too short (minimum is {} characters)", range.start()),
        );
    } else if len > *range.end() {
        errors.add(
            field,
            format!("is too long (maximum is {} characters)", range.end()),
        );
    }
}

/// Field-level validation messages, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn on(&self, field: &str) -> &[String] {
        self.0.get(field).map_or(&[], Vec::as_slice)
    }

    /// Messages prefixed with their humanized field name, e.g.
    /// `"Username is too short (minimum is 3 characters)"`.
    #[must_use]
    pub fn full_messages(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(field, messages)| {
                let label = humanize(field);
                messages.iter().map(move |m| format!("{label} {m}"))
            })
            .collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_messages().join(", "))
    }
}

fn humanize(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// The lookup key a login attempt resolves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    Email(&'a str),
    Username(&'a str),
}

impl<'a> Credential<'a> {
    /// Email-shaped input is an email; anything else is a username.
    #[must_use]
    pub fn classify(input: &'a str) -> Self {
        if is_email(input) {
            Self::Email(input)
        } else {
            Self::Username(input)
        }
    }
}
