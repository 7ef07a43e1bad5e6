// # Directory Backends
//
// Reference implementations of DirectoryBackend. Both keep users in a map
// keyed by username; the file backend persists it as a JSON snapshot.

pub mod file;
pub mod memory;

pub use file::FileDirectory;
pub use memory::MemoryDirectory;

use std::collections::BTreeMap;

use crate::Error;
use crate::models::{DirectoryUserState, ExistingUser};

/// Users by username
pub(crate) type UserTable = BTreeMap<String, ExistingUser>;

pub(crate) fn find_identity<'a>(
    users: &'a UserTable,
    source_uid: &str,
    record_uid: &str,
) -> Option<&'a ExistingUser> {
    users
        .values()
        .find(|u| u.source_uid == source_uid && u.record_uid == record_uid)
}

pub(crate) fn insert_user(users: &mut UserTable, user: &DirectoryUserState) -> Result<(), Error> {
    if users.contains_key(&user.username) {
        return Err(Error::directory(format!(
            "username '{}' already exists",
            user.username
        )));
    }
    if find_identity(users, &user.source_uid, &user.record_uid).is_some() {
        return Err(Error::directory(format!(
            "a user with {} already exists",
            user.identity()
        )));
    }
    users.insert(user.username.clone(), user.to_existing());
    Ok(())
}

pub(crate) fn update_user(users: &mut UserTable, user: &DirectoryUserState) -> Result<(), Error> {
    let existing = users
        .get_mut(&user.username)
        .ok_or_else(|| Error::directory(format!("no such user '{}'", user.username)))?;
    *existing = user.to_existing();
    Ok(())
}

pub(crate) fn move_user(users: &mut UserTable, username: &str, new_school: &str) -> Result<(), Error> {
    let existing = users
        .get_mut(username)
        .ok_or_else(|| Error::directory(format!("no such user '{}'", username)))?;
    let old_school = std::mem::replace(&mut existing.school, new_school.to_string());
    existing.schools.retain(|s| s != &old_school);
    if !existing.schools.iter().any(|s| s == new_school) {
        existing.schools.insert(0, new_school.to_string());
    }
    Ok(())
}

pub(crate) fn remove_user(users: &mut UserTable, username: &str) -> Result<(), Error> {
    users
        .remove(username)
        .map(|_| ())
        .ok_or_else(|| Error::directory(format!("no such user '{}'", username)))
}

pub(crate) fn list_users(
    users: &UserTable,
    source_uid: &str,
    partition: Option<&str>,
) -> Vec<ExistingUser> {
    users
        .values()
        .filter(|u| u.source_uid == source_uid)
        .filter(|u| partition.is_none_or(|school| u.school == school))
        .cloned()
        .collect()
}

/// Await a directory call, failing with `Error::Timeout` after `timeout`
pub(crate) async fn with_timeout<T, F>(timeout: std::time::Duration, call: &str, fut: F) -> Result<T, Error>
where
    F: std::future::Future<Output = Result<T, Error>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "{} did not finish within {}s",
            call,
            timeout.as_secs_f32()
        ))),
    }
}
