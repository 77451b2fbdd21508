use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use jiff::Timestamp;
use minicbor::{Decode, Encode};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::keys::{OwnedKey, check_user_id, owner_prefix};
use super::locks::WriteLocks;
use super::{StoreError, StoreResult, from_bytes, to_bytes};

#[derive(Clone, Debug, Encode, Decode)]
struct BadgeRecord {
    #[n(0)]
    name: String,
    #[n(1)]
    description: Option<String>,
    #[n(2)]
    icon: Option<String>,
}

#[derive(Clone, Debug, Encode, Decode)]
struct AwardRecord {
    /// Unix milliseconds.
    #[n(0)]
    awarded_at: i64,
}

/// Badge definition, keyed by its unique code.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub(crate) struct Badge {
    pub(crate) code: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) icon: Option<String>,
}

impl Badge {
    fn from_record(code: &str, record: BadgeRecord) -> Badge {
        Badge {
            code: code.to_string(),
            name: record.name,
            description: record.description,
            icon: record.icon,
        }
    }
}

/// A badge a user has earned, joined with its definition.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct UserBadge {
    #[serde(flatten)]
    pub(crate) badge: Badge,
    pub(crate) awarded_at: Timestamp,
}

/// Badge definitions keyed by code, and awards keyed `user NUL code`.
#[derive(Clone)]
pub(crate) struct BadgeRepo {
    badges: PartitionHandle,
    user_badges: PartitionHandle,
    locks: WriteLocks,
}

impl BadgeRepo {
    pub(crate) fn new(keyspace: Keyspace, locks: WriteLocks) -> StoreResult<BadgeRepo> {
        let badges = keyspace.open_partition("badges", PartitionCreateOptions::default())?;
        let user_badges =
            keyspace.open_partition("user_badges", PartitionCreateOptions::default())?;
        Ok(BadgeRepo {
            badges,
            user_badges,
            locks,
        })
    }

    pub(crate) fn create(&self, badge: Badge) -> StoreResult<Badge> {
        let code = badge.code.trim();
        check_code(code)?;
        let name = badge.name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidRequest("badge name is required".to_string()));
        }
        // Definitions share the stripes, keyed by code.
        let _guard = self.locks.user(code);
        if self.badges.contains_key(code)? {
            return Err(StoreError::Conflict(format!("badge '{code}' already exists")));
        }
        let record = BadgeRecord {
            name: name.to_string(),
            description: badge.description,
            icon: badge.icon,
        };
        self.badges.insert(code, to_bytes(&record)?)?;
        info!(target: "store", code, "badge defined");
        Ok(Badge::from_record(code, record))
    }

    pub(crate) fn find(&self, code: &str) -> StoreResult<Option<Badge>> {
        let Some(bytes) = self.badges.get(code)? else {
            return Ok(None);
        };
        Ok(Some(Badge::from_record(code, from_bytes(&bytes)?)))
    }

    /// Every definition, in code order.
    pub(crate) fn all(&self) -> StoreResult<Vec<Badge>> {
        let mut result = vec![];
        for pair in self.badges.iter() {
            let (key, bytes) = pair?;
            let code = std::str::from_utf8(&key).map_err(|e| StoreError::Decode(e.to_string()))?;
            result.push(Badge::from_record(code, from_bytes(&bytes)?));
        }
        Ok(result)
    }

    /// Grants `code` to `user`. A badge is held at most once.
    pub(crate) fn award(&self, user: &str, code: &str, now: Timestamp) -> StoreResult<UserBadge> {
        check_user_id(user)?;
        let Some(badge) = self.find(code)? else {
            return Err(StoreError::NotFound(format!("badge {code}")));
        };
        let key = OwnedKey::new(user, code);
        let _guard = self.locks.user(user);
        if self.user_badges.contains_key(key.clone())? {
            return Err(StoreError::Conflict(format!("badge '{code}' already awarded")));
        }
        let award = AwardRecord {
            awarded_at: now.as_millisecond(),
        };
        self.user_badges.insert(key, to_bytes(&award)?)?;
        info!(target: "store", user, code, "badge awarded");
        Ok(UserBadge {
            badge,
            awarded_at: millis_to_timestamp(award.awarded_at)?,
        })
    }

    /// Badges `user` has earned, most recently awarded first. Awards whose
    /// definition was removed are skipped.
    pub(crate) fn for_user(&self, user: &str) -> StoreResult<Vec<UserBadge>> {
        let mut result = vec![];
        for pair in self.user_badges.prefix(owner_prefix(user)) {
            let (key, bytes) = pair?;
            let key = OwnedKey::from(key.as_ref());
            let award: AwardRecord = from_bytes(&bytes)?;
            if let Some(badge) = self.find(key.suffix_str()?)? {
                result.push(UserBadge {
                    badge,
                    awarded_at: millis_to_timestamp(award.awarded_at)?,
                });
            }
        }
        result.sort_by(|a, b| b.awarded_at.cmp(&a.awarded_at));
        Ok(result)
    }
}

fn check_code(code: &str) -> StoreResult<()> {
    let valid = !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(StoreError::InvalidRequest(format!("invalid badge code '{code}'")));
    }
    Ok(())
}

fn millis_to_timestamp(millis: i64) -> StoreResult<Timestamp> {
    Timestamp::from_millisecond(millis).map_err(|e| StoreError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use jiff::{Timestamp, ToSpan};

    use crate::store::StoreError;
    use crate::store::testing::temp_store;

    use super::Badge;

    fn badge(code: &str, name: &str) -> Badge {
        Badge {
            code: code.to_string(),
            name: name.to_string(),
            description: None,
            icon: Some("leaf".to_string()),
        }
    }

    #[test]
    fn define_and_award() {
        let (_dir, store) = temp_store();
        let repo = &store.badges;
        let created = repo.create(badge(" first-ride ", "First ride")).unwrap();
        assert_eq!(created.code, "first-ride");
        assert!(matches!(
            repo.create(badge("first-ride", "Again")),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            repo.create(badge("no spaces", "Bad")),
            Err(StoreError::InvalidRequest(_))
        ));
        repo.create(badge("composter", "Composter")).unwrap();
        let codes: Vec<_> = repo.all().unwrap().into_iter().map(|b| b.code).collect();
        assert_eq!(codes, vec!["composter", "first-ride"]);

        let now = Timestamp::now();
        let awarded = repo.award("u1", "first-ride", now).unwrap();
        assert_eq!(awarded.badge.name, "First ride");
        assert!(matches!(
            repo.award("u1", "first-ride", now),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            repo.award("u1", "missing", now),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn user_badges_newest_first() {
        let (_dir, store) = temp_store();
        let repo = &store.badges;
        repo.create(badge("a-first", "A")).unwrap();
        repo.create(badge("b-second", "B")).unwrap();
        let earlier: Timestamp = "2025-08-01T10:00:00Z".parse().unwrap();
        repo.award("u1", "b-second", earlier).unwrap();
        repo.award("u1", "a-first", earlier + 2.hours()).unwrap();
        repo.award("u10", "a-first", earlier).unwrap();

        let earned: Vec<_> = repo
            .for_user("u1")
            .unwrap()
            .into_iter()
            .map(|b| b.badge.code)
            .collect();
        assert_eq!(earned, vec!["a-first", "b-second"]);
        assert!(repo.for_user("u2").unwrap().is_empty());
    }
}
