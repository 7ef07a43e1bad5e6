//! Historically unique usernames
//!
//! A name is free for an identity if no other identity ever reserved it and
//! the directory holds no other user with that name. The first free
//! rendering is reserved for good; reservations are never released, not even
//! when the record fails later on.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::scheme::{Scheme, SchemeContext};
use crate::config::UsernameConfig;
use crate::directory::with_timeout;
use crate::models::Identity;
use crate::traits::{DirectoryBackend, StateStore};
use crate::{Error, Result};

/// Whether `c` may appear in a username
pub fn is_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.'
}

/// Drop characters not allowed in usernames
pub fn sanitize(value: &str) -> String {
    value.chars().filter(|c| is_username_char(*c)).collect()
}

/// Generates and reserves usernames
pub struct UsernameGenerator {
    store: Arc<dyn StateStore>,
    directory: Arc<dyn DirectoryBackend>,
    counter_width: usize,
    max_attempts: usize,
    timeout: Duration,
}

impl UsernameGenerator {
    pub fn new(
        store: Arc<dyn StateStore>,
        directory: Arc<dyn DirectoryBackend>,
        settings: &UsernameConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            counter_width: settings.counter_width,
            max_attempts: settings.max_attempts.max(1),
            timeout,
        }
    }

    /// Render `scheme` for `identity` and reserve the first free result
    ///
    /// Umlauts are always transliterated. Literal text is shortened to fit
    /// `max_length`; the counter is never cut.
    ///
    /// # Errors
    ///
    /// - `Error::Format` if the scheme renders to nothing usable
    /// - `Error::UsernameExhausted` if no counter value yields a free name
    pub async fn generate(
        &self,
        scheme: &Scheme,
        ctx: &SchemeContext<'_>,
        identity: &Identity,
        max_length: usize,
    ) -> Result<String> {
        let scheme = scheme.clone().with_umlauts();
        let rendered = scheme.render(ctx);
        let before = sanitize(&rendered.before);
        let after = sanitize(&rendered.after);
        if before.trim_matches('.').is_empty() && after.trim_matches('.').is_empty() {
            return Err(Error::format(format!(
                "no username in scheme '{}'",
                scheme.template()
            )));
        }

        let attempts = if scheme.counter().is_some() {
            self.max_attempts
        } else {
            1
        };

        for attempt in 0..attempts {
            let counter = scheme
                .counter()
                .map(|kind| kind.render(attempt, self.counter_width))
                .unwrap_or_default();
            let budget = max_length.saturating_sub(counter.len());
            let (head, tail) = fit(&before, &after, budget);
            let candidate = format!("{}{}{}", head, counter, tail)
                .trim_matches('.')
                .to_string();
            if candidate.is_empty() || candidate.len() > max_length {
                continue;
            }

            if self.claim(&candidate, identity).await? {
                debug!("Reserved username '{}' for {}", candidate, identity);
                return Ok(candidate);
            }
        }

        Err(Error::UsernameExhausted {
            scheme: scheme.template().to_string(),
            attempts,
        })
    }

    /// Reserve `username` for `identity` if it is free
    ///
    /// Returns `false` if another identity holds the name in the store or in
    /// the directory.
    pub async fn claim(&self, username: &str, identity: &Identity) -> Result<bool> {
        if let Some(owner) = self.store.username_owner(username).await? {
            return Ok(&owner == identity);
        }

        let existing = with_timeout(
            self.timeout,
            "lookup_by_username",
            self.directory.lookup_by_username(username),
        )
        .await?;
        if let Some(user) = existing {
            if &user.identity() != identity {
                return Ok(false);
            }
        }

        self.store.reserve_username(username, identity).await
    }

    /// Validate and reserve a username given explicitly in the input
    pub async fn claim_explicit(
        &self,
        username: &str,
        identity: &Identity,
        max_length: usize,
    ) -> Result<String> {
        if username.is_empty()
            || !username.chars().all(is_username_char)
            || username.starts_with('.')
            || username.ends_with('.')
        {
            return Err(Error::validation(format!(
                "username '{}' contains disallowed characters",
                username
            )));
        }
        if username.len() > max_length {
            return Err(Error::validation(format!(
                "username '{}' is longer than {} characters",
                username, max_length
            )));
        }
        if !self.claim(username, identity).await? {
            warn!("Username '{}' is already taken", username);
            return Err(Error::validation(format!(
                "username '{}' is already taken",
                username
            )));
        }
        Ok(username.to_string())
    }
}

/// Shorten `before` and then `after` to `budget` characters in total
fn fit(before: &str, after: &str, budget: usize) -> (String, String) {
    let head: String = before.chars().take(budget).collect();
    let remaining = budget.saturating_sub(head.len());
    let tail: String = after.chars().take(remaining).collect();
    (head, tail)
}
