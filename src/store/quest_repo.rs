use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use greensteps_core::QuestDefinition;
use greensteps_core::quest::{advance, completion_points, percent};
use jiff::Timestamp;
use minicbor::{Decode, Encode};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::keys::{OwnedKey, RecordKey, check_user_id, owner_prefix, parse_record_key};
use super::locks::WriteLocks;
use super::{ProfileRepo, StoreError, StoreResult, from_bytes, to_bytes};

#[derive(Clone, Debug, Encode, Decode)]
struct QuestRecord {
    #[n(0)]
    name: String,
    #[n(1)]
    description: Option<String>,
    #[n(2)]
    category: Option<String>,
    #[n(3)]
    min_value: Option<f64>,
    #[n(4)]
    max_value: Option<f64>,
    #[n(5)]
    points_multiplier: f64,
    #[n(6)]
    active: bool,
}

impl QuestRecord {
    fn definition(self, id: RecordKey) -> QuestDefinition {
        QuestDefinition {
            id: id.to_string(),
            name: self.name,
            description: self.description,
            category: self.category,
            min_value: self.min_value,
            max_value: self.max_value,
            points_multiplier: self.points_multiplier,
        }
    }
}

#[derive(Clone, Debug, Encode, Decode)]
struct UserQuestRecord {
    #[cbor(n(0), with = "minicbor::bytes")]
    quest_id: Vec<u8>,
    #[n(1)]
    progress: f64,
    #[n(2)]
    completed: bool,
    /// Unix milliseconds.
    #[n(3)]
    enrolled_at: i64,
    #[n(4)]
    completed_at: Option<i64>,
}

/// Quest definition submitted by an administrator.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct NewQuest {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) category: Option<String>,
    #[serde(default)]
    pub(crate) min_value: Option<f64>,
    #[serde(default)]
    pub(crate) max_value: Option<f64>,
    #[serde(default = "default_multiplier")]
    pub(crate) points_multiplier: f64,
    #[serde(default = "default_active")]
    pub(crate) active: bool,
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_active() -> bool {
    true
}

/// A user's enrolment joined with its quest definition.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct UserQuestView {
    pub(crate) id: String,
    pub(crate) quest: QuestDefinition,
    pub(crate) progress: f64,
    pub(crate) completed: bool,
    pub(crate) percent: u8,
    pub(crate) enrolled_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) completed_at: Option<Timestamp>,
    /// Points granted by this update. Only set on the completing update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) awarded_points: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct QuestBoard {
    pub(crate) active: Vec<UserQuestView>,
    pub(crate) completed: Vec<UserQuestView>,
    /// Active quests the user has not enrolled in.
    pub(crate) discover: Vec<QuestDefinition>,
}

#[derive(Clone)]
pub(crate) struct QuestRepo {
    keyspace: Keyspace,
    quests: PartitionHandle,
    user_quests: PartitionHandle,
    profiles: ProfileRepo,
    locks: WriteLocks,
}

impl QuestRepo {
    pub(crate) fn new(
        keyspace: Keyspace,
        profiles: ProfileRepo,
        locks: WriteLocks,
    ) -> StoreResult<QuestRepo> {
        let quests = keyspace.open_partition("quests", PartitionCreateOptions::default())?;
        let user_quests =
            keyspace.open_partition("user_quests", PartitionCreateOptions::default())?;
        Ok(QuestRepo {
            keyspace,
            quests,
            user_quests,
            profiles,
            locks,
        })
    }

    pub(crate) fn create_quest(&self, quest: NewQuest) -> StoreResult<QuestDefinition> {
        if quest.name.trim().is_empty() {
            return Err(StoreError::InvalidRequest("quest name is required".to_string()));
        }
        if !quest.points_multiplier.is_finite() || quest.points_multiplier < 0.0 {
            return Err(StoreError::InvalidRequest(
                "points_multiplier must be a non-negative number".to_string(),
            ));
        }
        let id = RecordKey::new();
        let record = QuestRecord {
            name: quest.name.trim().to_string(),
            description: quest.description,
            category: quest.category,
            min_value: quest.min_value,
            max_value: quest.max_value,
            points_multiplier: quest.points_multiplier,
            active: quest.active,
        };
        self.quests.insert(id, to_bytes(&record)?)?;
        info!(target: "store", %id, name = %record.name, "quest created");
        Ok(record.definition(id))
    }

    /// Active quests, oldest first.
    pub(crate) fn active_quests(&self) -> StoreResult<Vec<QuestDefinition>> {
        let mut result = vec![];
        for pair in self.quests.iter() {
            let (key, bytes) = pair?;
            let record: QuestRecord = from_bytes(&bytes)?;
            if record.active {
                result.push(record.definition(decode_record_key(&key)?));
            }
        }
        Ok(result)
    }

    /// Every enrolment of `user`, oldest first.
    pub(crate) fn user_quests(&self, user: &str) -> StoreResult<Vec<UserQuestView>> {
        let mut result = vec![];
        for pair in self.user_quests.prefix(owner_prefix(user)) {
            let (key, bytes) = pair?;
            let key = OwnedKey::from(key.as_ref());
            if let Some(view) = self.view(&key, from_bytes(&bytes)?, None)? {
                result.push(view);
            }
        }
        Ok(result)
    }

    pub(crate) fn board(&self, user: &str) -> StoreResult<QuestBoard> {
        let mut board = QuestBoard::default();
        let mut enrolled = vec![];
        for view in self.user_quests(user)? {
            enrolled.push(view.quest.id.clone());
            if view.completed {
                board.completed.push(view);
            } else {
                board.active.push(view);
            }
        }
        board.discover = self
            .active_quests()?
            .into_iter()
            .filter(|quest| !enrolled.contains(&quest.id))
            .collect();
        Ok(board)
    }

    pub(crate) fn enroll(&self, user: &str, quest_id: &str, now: Timestamp) -> StoreResult<UserQuestView> {
        check_user_id(user)?;
        let quest_key = parse_record_key(quest_id)?;
        match self.find_record(quest_key)? {
            Some(record) if record.active => {}
            _ => return Err(StoreError::NotFound(format!("quest {quest_id}"))),
        }
        let _guard = self.locks.user(user);
        for pair in self.user_quests.prefix(owner_prefix(user)) {
            let (_, bytes) = pair?;
            let existing: UserQuestRecord = from_bytes(&bytes)?;
            if existing.quest_id == quest_key.as_ref() {
                return Err(StoreError::Conflict("already enrolled in quest".to_string()));
            }
        }
        let key = OwnedKey::new(user, RecordKey::new());
        let record = UserQuestRecord {
            quest_id: quest_key.as_ref().to_vec(),
            progress: 0.0,
            completed: false,
            enrolled_at: now.as_millisecond(),
            completed_at: None,
        };
        self.user_quests.insert(key.clone(), to_bytes(&record)?)?;
        info!(target: "store", user, quest_id, "enrolled in quest");
        self.view(&key, record, None)?
            .ok_or_else(|| StoreError::NotFound(format!("quest {quest_id}")))
    }

    /// Adds `delta` to the enrolment's progress. Reaching the target marks it
    /// completed and credits the quest's points to the user's profile in the
    /// same batch.
    pub(crate) fn increment(
        &self,
        user: &str,
        user_quest_id: &str,
        delta: f64,
        now: Timestamp,
    ) -> StoreResult<UserQuestView> {
        if !delta.is_finite() || delta <= 0.0 {
            return Err(StoreError::InvalidRequest(
                "delta must be a positive number".to_string(),
            ));
        }
        let key = OwnedKey::new(user, parse_record_key(user_quest_id)?);
        let _guard = self.locks.user(user);
        let Some(bytes) = self.user_quests.get(key.clone())? else {
            return Err(StoreError::NotFound(format!("user quest {user_quest_id}")));
        };
        let mut record: UserQuestRecord = from_bytes(&bytes)?;
        if record.completed {
            return Err(StoreError::Conflict("quest already completed".to_string()));
        }
        let quest_key = decode_record_key(&record.quest_id)?;
        let Some(quest) = self.find_record(quest_key)? else {
            return Err(StoreError::NotFound(format!("quest {quest_key}")));
        };
        let quest = quest.definition(quest_key);

        let step = advance(Some(record.progress), delta, quest.max_value);
        record.progress = step.progress;
        record.completed = step.completed;

        let mut b = self.keyspace.batch();
        let mut awarded = None;
        if step.completed {
            record.completed_at = Some(now.as_millisecond());
            let points = completion_points(&quest);
            self.profiles.add_points(&mut b, user, points)?;
            awarded = Some(points);
        }
        b.insert(&self.user_quests, key.clone(), to_bytes(&record)?);
        b.commit()?;
        if let Some(points) = awarded {
            info!(target: "store", user, quest = %quest.name, points, "quest completed");
        }
        self.view(&key, record, awarded)?
            .ok_or_else(|| StoreError::NotFound(format!("quest {quest_key}")))
    }

    /// Drops an enrolment that is still in progress. Completed enrolments
    /// stay so the quest cannot be earned twice.
    pub(crate) fn cancel(&self, user: &str, user_quest_id: &str) -> StoreResult<()> {
        let key = OwnedKey::new(user, parse_record_key(user_quest_id)?);
        let _guard = self.locks.user(user);
        let Some(bytes) = self.user_quests.get(key.clone())? else {
            return Err(StoreError::NotFound(format!("user quest {user_quest_id}")));
        };
        let record: UserQuestRecord = from_bytes(&bytes)?;
        if record.completed {
            return Err(StoreError::Conflict(
                "completed quests cannot be cancelled".to_string(),
            ));
        }
        self.user_quests.remove(key)?;
        Ok(())
    }

    fn find_record(&self, id: RecordKey) -> StoreResult<Option<QuestRecord>> {
        if let Some(bytes) = self.quests.get(id)? {
            return Ok(Some(from_bytes(&bytes)?));
        }
        Ok(None)
    }

    /// Joins an enrolment with its quest. Enrolments whose quest vanished
    /// yield `None`.
    fn view(
        &self,
        key: &OwnedKey,
        record: UserQuestRecord,
        awarded_points: Option<i64>,
    ) -> StoreResult<Option<UserQuestView>> {
        let quest_key = decode_record_key(&record.quest_id)?;
        let Some(quest) = self.find_record(quest_key)? else {
            return Ok(None);
        };
        let quest = quest.definition(quest_key);
        let completed_at = record.completed_at.map(millis_to_timestamp).transpose()?;
        Ok(Some(UserQuestView {
            id: key.record_key()?.to_string(),
            percent: percent(Some(record.progress), quest.max_value),
            quest,
            progress: record.progress,
            completed: record.completed,
            enrolled_at: millis_to_timestamp(record.enrolled_at)?,
            completed_at,
            awarded_points,
        }))
    }
}

fn decode_record_key(bytes: &[u8]) -> StoreResult<RecordKey> {
    RecordKey::try_from(bytes).map_err(|e| StoreError::Decode(e.to_string()))
}

fn millis_to_timestamp(millis: i64) -> StoreResult<Timestamp> {
    Timestamp::from_millisecond(millis).map_err(|e| StoreError::Decode(e.to_string()))
}
