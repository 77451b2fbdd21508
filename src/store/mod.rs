//! Typed access to the embedded record store.
//!
//! Every partition is owned by exactly one repo. Repos decode into plain
//! structs and report failures as [`StoreError`]; nothing above this module
//! touches raw keys or bytes. Writes that read a record first hold the
//! affected users' [`WriteLocks`] stripes until they commit.

mod activity_repo;
mod badge_repo;
mod factor_repo;
mod friend_repo;
mod keys;
mod locks;
mod profile_repo;
mod quest_repo;

use fjall::Keyspace;
use minicbor::{Decode, Encode};
use thiserror::Error;

use self::locks::WriteLocks;

pub(crate) use activity_repo::{ActivityRecord, ActivityRepo};
pub(crate) use badge_repo::{Badge, BadgeRepo, UserBadge};
pub(crate) use factor_repo::FactorRepo;
pub(crate) use friend_repo::{FriendRepo, FriendRequest, FriendStatus};
pub(crate) use profile_repo::{Profile, ProfileRepo, ProfileUpdate};
pub(crate) use quest_repo::{NewQuest, QuestBoard, QuestRepo, UserQuestView};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("storage error: {0}")]
    Storage(#[from] fjall::Error),
    #[error("unable to encode record: {0}")]
    Encode(String),
    #[error("unable to decode record: {0}")]
    Decode(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidRequest(String),
}

impl From<minicbor::decode::Error> for StoreError {
    fn from(value: minicbor::decode::Error) -> Self {
        StoreError::Decode(value.to_string())
    }
}

pub(crate) type StoreResult<T> = Result<T, StoreError>;

fn to_bytes<T: Encode<()>>(record: &T) -> StoreResult<Vec<u8>> {
    minicbor::to_vec(record).map_err(|e| StoreError::Encode(e.to_string()))
}

fn from_bytes<'b, T: Decode<'b, ()>>(bytes: &'b [u8]) -> StoreResult<T> {
    Ok(minicbor::decode(bytes)?)
}

/// Handles to every repo, opened once at startup and shared by all
/// requests.
#[derive(Clone)]
pub(crate) struct Store {
    keyspace: Keyspace,
    pub(crate) profiles: ProfileRepo,
    pub(crate) activities: ActivityRepo,
    pub(crate) friends: FriendRepo,
    pub(crate) quests: QuestRepo,
    pub(crate) factors: FactorRepo,
    pub(crate) badges: BadgeRepo,
}

impl Store {
    pub(crate) fn open(keyspace: Keyspace) -> StoreResult<Store> {
        let locks = WriteLocks::new();
        let profiles = ProfileRepo::new(keyspace.clone(), locks.clone())?;
        let activities = ActivityRepo::new(keyspace.clone())?;
        let friends = FriendRepo::new(keyspace.clone(), locks.clone())?;
        let quests = QuestRepo::new(keyspace.clone(), profiles.clone(), locks.clone())?;
        let factors = FactorRepo::new(keyspace.clone())?;
        let badges = BadgeRepo::new(keyspace.clone(), locks)?;
        Ok(Store {
            keyspace,
            profiles,
            activities,
            friends,
            quests,
            factors,
            badges,
        })
    }

    /// Cheap liveness check used by `/ping`.
    pub(crate) fn ping(&self) -> StoreResult<()> {
        self.profiles.is_empty()?;
        Ok(())
    }

    pub(crate) fn persist(&self) -> StoreResult<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use fjall::{Batch, Config, Keyspace};
    use tempfile::TempDir;

    use super::Store;

    pub(crate) fn batch(store: &Store) -> Batch {
        store.keyspace.batch()
    }

    /// A store backed by a throwaway keyspace. Keep the directory alive for
    /// as long as the store is used.
    pub(crate) fn temp_store() -> (TempDir, Store) {
        let tmp_dir = tempfile::tempdir().expect("create temp dir");
        let keyspace = Keyspace::open(Config::new(tmp_dir.path()).temporary(true))
            .expect("open temporary keyspace");
        let store = Store::open(keyspace).expect("open store");
        (tmp_dir, store)
    }
}
