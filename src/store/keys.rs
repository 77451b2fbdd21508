use std::fmt::Display;
use std::str::{self, FromStr};

use fjall::{Slice, UserKey};
use uuid::Uuid;

use super::{StoreError, StoreResult};

/// Time ordered record id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct RecordKey(Uuid);

impl RecordKey {
    pub(crate) fn new() -> RecordKey {
        RecordKey(Uuid::now_v7())
    }
}

impl From<RecordKey> for UserKey {
    fn from(value: RecordKey) -> Self {
        UserKey::new(value.0.as_bytes())
    }
}

impl AsRef<[u8]> for RecordKey {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.as_simple().fmt(f)
    }
}

impl FromStr for RecordKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RecordKey(Uuid::try_parse(s)?))
    }
}

impl TryFrom<&[u8]> for RecordKey {
    type Error = std::array::TryFromSliceError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(RecordKey(Uuid::from_bytes(value.try_into()?)))
    }
}

/// Parses an id received from a client.
pub(crate) fn parse_record_key(id: &str) -> StoreResult<RecordKey> {
    id.parse()
        .map_err(|_| StoreError::InvalidRequest(format!("malformed id '{id}'")))
}

/// Key of a record owned by a user: `owner NUL suffix`. Keys of one owner
/// share a prefix and sort by suffix.
#[derive(Clone)]
pub(crate) struct OwnedKey(Slice);

impl OwnedKey {
    pub(crate) fn new(owner: &str, suffix: impl AsRef<[u8]>) -> OwnedKey {
        let mut key = owner_prefix(owner);
        key.extend_from_slice(suffix.as_ref());
        OwnedKey(key.into())
    }
    pub(crate) fn owner(&self) -> &str {
        let owner = self
            .0
            .split(|&b| b == 0)
            .next()
            .expect("OwnedKey should be NUL delimited");
        str::from_utf8(owner).expect("owner should be valid UTF-8 string")
    }
    pub(crate) fn suffix(&self) -> &[u8] {
        let start = self.owner().len() + 1;
        &self.0[start..]
    }
    pub(crate) fn suffix_str(&self) -> StoreResult<&str> {
        str::from_utf8(self.suffix()).map_err(|e| StoreError::Decode(e.to_string()))
    }
    pub(crate) fn record_key(&self) -> StoreResult<RecordKey> {
        RecordKey::try_from(self.suffix()).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

impl From<OwnedKey> for UserKey {
    fn from(value: OwnedKey) -> Self {
        value.0
    }
}

impl AsRef<[u8]> for OwnedKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for OwnedKey {
    fn from(value: &[u8]) -> Self {
        OwnedKey(Slice::new(value))
    }
}

/// Prefix matching every [`OwnedKey`] of `owner`.
pub(crate) fn owner_prefix(owner: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(owner.len() + 1);
    prefix.extend_from_slice(owner.as_bytes());
    prefix.push(0);
    prefix
}

/// User ids become key prefixes, so they must be non-empty and NUL free.
pub(crate) fn check_user_id(id: &str) -> StoreResult<()> {
    if id.is_empty() || id.as_bytes().contains(&0) {
        return Err(StoreError::InvalidRequest(format!("invalid user id '{id}'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{OwnedKey, RecordKey, check_user_id, owner_prefix};

    #[test]
    fn owned_key_parts() {
        let record = RecordKey::new();
        let key = OwnedKey::new("alice", record);
        assert_eq!(key.owner(), "alice");
        assert_eq!(key.record_key().unwrap(), record);

        let key = OwnedKey::new("alice", "bob");
        assert_eq!(key.suffix_str().unwrap(), "bob");
        let bytes: fjall::UserKey = key.into();
        assert!(bytes.starts_with(&owner_prefix("alice")));
        assert!(!bytes.starts_with(&owner_prefix("ali")));
    }

    #[test]
    fn record_keys_sort_by_creation() {
        let first = RecordKey::new();
        let second = RecordKey::new();
        assert!(first < second);
        assert_eq!(first.to_string().parse::<RecordKey>().unwrap(), first);
    }

    #[test]
    fn user_ids_are_checked() {
        assert!(check_user_id("u-1").is_ok());
        assert!(check_user_id("").is_err());
        assert!(check_user_id("a\0b").is_err());
    }
}
