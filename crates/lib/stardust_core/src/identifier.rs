//! Login identifier classification (email or phone).

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

/// E.164: `+`, first digit 1-9, 2 to 15 digits in total.
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9][0-9]{1,14}$").expect("valid phone pattern"));

/// What the user typed into the "email or phone" field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Email(String),
    Phone(String),
}

impl Identifier {
    /// Classify raw input; `None` when it is neither an email nor a phone number.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if EMAIL.is_match(input) {
            Some(Identifier::Email(input.to_string()))
        } else if PHONE.is_match(input) {
            Some(Identifier::Phone(input.to_string()))
        } else {
            None
        }
    }

    /// Name of the login body field carrying this identifier.
    pub fn field(&self) -> &'static str {
        match self {
            Identifier::Email(_) => "email",
            Identifier::Phone(_) => "phone",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Identifier::Email(v) | Identifier::Phone(v) => v,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}
