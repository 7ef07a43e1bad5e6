//! Record validation
//!
//! Checks that make a single record fail without touching the run: missing
//! mandatory attributes, malformed values, and identifiers used twice in the
//! same input.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex_lite::Regex;

use crate::{Error, Result};

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@]+@.+\..+$").expect("valid regex"));

pub const BIRTHDAY_FORMAT: &str = "%Y-%m-%d";

pub fn check_mandatory(attributes: &BTreeMap<String, String>, mandatory: &[String]) -> Result<()> {
    let missing: Vec<&str> = mandatory
        .iter()
        .filter(|name| attributes.get(*name).is_none_or(|v| v.trim().is_empty()))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "missing mandatory attributes: {}",
            missing.join(", ")
        )))
    }
}

/// An empty value clears the address and is always valid
pub fn check_email(email: &str) -> Result<()> {
    if email.is_empty() || EMAIL_PATTERN.is_match(email) {
        Ok(())
    } else {
        Err(Error::validation(format!("'{}' is not a valid e-mail address", email)))
    }
}

/// `None` for an empty value, which clears the birthday
pub fn check_birthday(birthday: &str) -> Result<Option<NaiveDate>> {
    if birthday.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(birthday, BIRTHDAY_FORMAT)
        .map(Some)
        .map_err(|_| {
            Error::validation(format!("birthday '{}' is not in YYYY-MM-DD format", birthday))
        })
}

/// Values already used by earlier records of the run
#[derive(Debug, Default)]
pub struct RunIndex {
    record_uids: BTreeSet<String>,
    usernames: BTreeSet<String>,
    emails: BTreeSet<String>,
}

impl RunIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(set: &mut BTreeSet<String>, what: &str, value: &str) -> Result<()> {
        if set.insert(value.to_string()) {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "{} '{}' appears more than once in the input",
                what, value
            )))
        }
    }

    pub fn claim_record_uid(&mut self, source_uid: &str, record_uid: &str) -> Result<()> {
        Self::claim(&mut self.record_uids, "record_uid", &format!("{}/{}", source_uid, record_uid))
    }

    pub fn claim_username(&mut self, username: &str) -> Result<()> {
        Self::claim(&mut self.usernames, "username", username)
    }

    /// Empty addresses are not tracked
    pub fn claim_email(&mut self, email: &str) -> Result<()> {
        if email.is_empty() {
            return Ok(());
        }
        Self::claim(&mut self.emails, "e-mail address", &email.to_lowercase())
    }
}
