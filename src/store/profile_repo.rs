use fjall::{Batch, Keyspace, PartitionCreateOptions, PartitionHandle};
use greensteps_core::ProfileSummary;
use minicbor::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::keys::check_user_id;
use super::locks::WriteLocks;
use super::{StoreResult, from_bytes, to_bytes};

#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode, Serialize)]
pub(crate) struct Profile {
    #[n(0)]
    pub(crate) id: String,
    #[n(1)]
    pub(crate) display_name: Option<String>,
    #[n(2)]
    pub(crate) avatar_url: Option<String>,
    #[n(3)]
    pub(crate) total_points: i64,
    #[n(4)]
    pub(crate) state: Option<String>,
    #[n(5)]
    pub(crate) is_private: bool,
    #[n(6)]
    pub(crate) onboarding_completed: bool,
}

impl From<Profile> for ProfileSummary {
    fn from(value: Profile) -> Self {
        ProfileSummary {
            id: value.id,
            display_name: value.display_name,
            avatar_url: value.avatar_url,
            total_points: Some(value.total_points),
            state: value.state,
            is_private: value.is_private,
        }
    }
}

/// Fields a user may change on their own profile. Absent fields keep their
/// stored value; points are never client supplied.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ProfileUpdate {
    pub(crate) display_name: Option<String>,
    pub(crate) avatar_url: Option<String>,
    pub(crate) state: Option<String>,
    pub(crate) is_private: Option<bool>,
    pub(crate) onboarding_completed: Option<bool>,
}

#[derive(Clone)]
pub(crate) struct ProfileRepo {
    profiles: PartitionHandle,
    locks: WriteLocks,
}

impl ProfileRepo {
    pub(crate) fn new(keyspace: Keyspace, locks: WriteLocks) -> StoreResult<ProfileRepo> {
        let profiles = keyspace.open_partition("profiles", PartitionCreateOptions::default())?;
        Ok(ProfileRepo { profiles, locks })
    }
    pub(crate) fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.profiles.is_empty()?)
    }
    pub(crate) fn find_one(&self, id: &str) -> StoreResult<Option<Profile>> {
        if let Some(bytes) = self.profiles.get(id)? {
            return Ok(Some(from_bytes(&bytes)?));
        }
        Ok(None)
    }
    /// Profiles for `ids` that exist, in id order.
    pub(crate) fn find_many<'a, I>(&self, ids: I) -> StoreResult<Vec<Profile>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut ids: Vec<&str> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        let mut result = vec![];
        for id in ids {
            if let Some(profile) = self.find_one(id)? {
                result.push(profile);
            }
        }
        Ok(result)
    }
    /// Every profile, in id order.
    pub(crate) fn all(&self) -> StoreResult<Vec<Profile>> {
        let mut result = vec![];
        for bytes in self.profiles.values() {
            result.push(from_bytes(&bytes?)?);
        }
        Ok(result)
    }
    pub(crate) fn upsert(&self, id: &str, update: ProfileUpdate) -> StoreResult<Profile> {
        check_user_id(id)?;
        let _guard = self.locks.user(id);
        let mut profile = self.find_one(id)?.unwrap_or_else(|| Profile {
            id: id.to_string(),
            ..Default::default()
        });
        let ProfileUpdate {
            display_name,
            avatar_url,
            state,
            is_private,
            onboarding_completed,
        } = update;
        if let Some(display_name) = display_name {
            profile.display_name = non_empty(display_name);
        }
        if let Some(avatar_url) = avatar_url {
            profile.avatar_url = non_empty(avatar_url);
        }
        if let Some(state) = state {
            profile.state = non_empty(state.to_ascii_lowercase());
        }
        if let Some(is_private) = is_private {
            profile.is_private = is_private;
        }
        if let Some(onboarding_completed) = onboarding_completed {
            profile.onboarding_completed = onboarding_completed;
        }
        self.profiles.insert(id, to_bytes(&profile)?)?;
        Ok(profile)
    }
    /// Adds `delta` points inside `batch`, creating the profile if needed.
    /// The caller must hold `id`'s write lock until the batch commits.
    pub(crate) fn add_points(&self, b: &mut Batch, id: &str, delta: i64) -> StoreResult<Profile> {
        let mut profile = self.find_one(id)?.unwrap_or_else(|| Profile {
            id: id.to_string(),
            ..Default::default()
        });
        profile.total_points = profile.total_points.saturating_add(delta);
        b.insert(&self.profiles, id, to_bytes(&profile)?);
        Ok(profile)
    }
    /// Case-insensitive substring match on display names.
    pub(crate) fn search(&self, term: &str, exclude: &str, limit: usize) -> StoreResult<Vec<Profile>> {
        let needle = term.trim().to_lowercase();
        let mut result = vec![];
        for profile in self.all()? {
            if result.len() >= limit {
                break;
            }
            if profile.id == exclude {
                continue;
            }
            let matches = profile
                .display_name
                .as_deref()
                .is_some_and(|name| name.to_lowercase().contains(&needle));
            if matches {
                result.push(profile);
            }
        }
        Ok(result)
    }
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
