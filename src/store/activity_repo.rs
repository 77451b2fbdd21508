use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use greensteps_core::{Category, Emission, LoggedActivity};
use jiff::Timestamp;
use jiff::tz::TimeZone;
use minicbor::{Decode, Encode};
use serde::Serialize;
use serde_json::Value;

use super::keys::{OwnedKey, RecordKey, check_user_id, owner_prefix};
use super::{StoreError, StoreResult, from_bytes, to_bytes};

/// One persisted activity row.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
struct StoredActivity {
    #[n(0)]
    category: String,
    #[n(1)]
    kind: String,
    #[n(2)]
    quantity: f64,
    #[n(3)]
    unit: String,
    #[n(4)]
    emission_kg: f64,
    #[n(5)]
    factor_key: String,
    /// JSON text of the submitted payload.
    #[n(6)]
    meta: String,
    /// Unix milliseconds.
    #[n(7)]
    created_at: i64,
}

/// An activity as returned to clients.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct ActivityRecord {
    pub(crate) id: String,
    pub(crate) user_id: String,
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) category: String,
    pub(crate) quantity: f64,
    pub(crate) unit: String,
    pub(crate) emission_kg: f64,
    pub(crate) factor_key: String,
    pub(crate) meta: Value,
    pub(crate) created_at: Timestamp,
}

impl ActivityRecord {
    fn from_stored(key: &OwnedKey, stored: StoredActivity) -> StoreResult<ActivityRecord> {
        let created_at = Timestamp::from_millisecond(stored.created_at)
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let meta = serde_json::from_str(&stored.meta)
            .map_err(|e| StoreError::Decode(format!("activity meta: {e}")))?;
        Ok(ActivityRecord {
            id: key.record_key()?.to_string(),
            user_id: key.owner().to_string(),
            kind: stored.kind,
            category: stored.category,
            quantity: stored.quantity,
            unit: stored.unit,
            emission_kg: stored.emission_kg,
            factor_key: stored.factor_key,
            meta,
            created_at,
        })
    }

    /// Projection used by the dashboard summary. Rows with an unknown
    /// category are skipped.
    pub(crate) fn logged(&self, tz: &TimeZone) -> Option<LoggedActivity> {
        let category: Category = self.category.parse().ok()?;
        Some(LoggedActivity {
            category,
            quantity: self.quantity,
            emission_kg: self.emission_kg,
            day: self.created_at.to_zoned(tz.clone()).date(),
        })
    }
}

#[derive(Clone)]
pub(crate) struct ActivityRepo {
    activities: PartitionHandle,
}

impl ActivityRepo {
    pub(crate) fn new(keyspace: Keyspace) -> StoreResult<ActivityRepo> {
        let activities =
            keyspace.open_partition("activities", PartitionCreateOptions::default())?;
        Ok(ActivityRepo { activities })
    }
    pub(crate) fn insert(
        &self,
        user_id: &str,
        emission: Emission,
        now: Timestamp,
    ) -> StoreResult<ActivityRecord> {
        check_user_id(user_id)?;
        let key = OwnedKey::new(user_id, RecordKey::new());
        let stored = StoredActivity {
            category: emission.category.as_str().to_string(),
            kind: emission.kind,
            quantity: emission.quantity,
            unit: emission.unit,
            emission_kg: emission.emission_kg,
            factor_key: emission.factor_key,
            meta: emission.meta.to_string(),
            created_at: now.as_millisecond(),
        };
        self.activities.insert(key.clone(), to_bytes(&stored)?)?;
        ActivityRecord::from_stored(&key, stored)
    }
    /// Newest first, at most `limit` rows.
    pub(crate) fn recent(&self, user_id: &str, limit: usize) -> StoreResult<Vec<ActivityRecord>> {
        let mut result = vec![];
        for pair in self.activities.prefix(owner_prefix(user_id)).rev().take(limit) {
            let (key, bytes) = pair?;
            let key = OwnedKey::from(key.as_ref());
            result.push(ActivityRecord::from_stored(&key, from_bytes(&bytes)?)?);
        }
        Ok(result)
    }
    /// Every activity of `user_id`, oldest first.
    pub(crate) fn all_for(&self, user_id: &str) -> StoreResult<Vec<ActivityRecord>> {
        let mut result = vec![];
        for pair in self.activities.prefix(owner_prefix(user_id)) {
            let (key, bytes) = pair?;
            let key = OwnedKey::from(key.as_ref());
            result.push(ActivityRecord::from_stored(&key, from_bytes(&bytes)?)?);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use greensteps_core::{ActivityForm, compute_emission};
    use jiff::Timestamp;
    use jiff::tz::TimeZone;
    use serde_json::json;

    use crate::store::StoreError;
    use crate::store::keys::{OwnedKey, RecordKey};
    use crate::store::testing::temp_store;
    use crate::store::to_bytes;

    use super::StoredActivity;

    fn emission(value: serde_json::Value) -> greensteps_core::Emission {
        let form: ActivityForm = serde_json::from_value(value).unwrap();
        compute_emission(form).unwrap()
    }

    #[test]
    fn insert_then_list_newest_first() {
        let (_dir, store) = temp_store();
        let repo = &store.activities;
        let now: Timestamp = "2025-08-11T09:30:00Z".parse().unwrap();
        let first = repo
            .insert(
                "u1",
                emission(json!({"food": {"subcategory": "Red Meat", "amountKg": 0.25}})),
                now,
            )
            .unwrap();
        let second = repo
            .insert(
                "u1",
                emission(json!({"transport": {"mode": "Bus", "durationMinutes": 60}})),
                now,
            )
            .unwrap();
        repo.insert("u2", emission(json!({"waste": {"amountKg": 1}})), now)
            .unwrap();

        assert_eq!(first.emission_kg, 5.9);
        assert_eq!(first.category, "food");
        assert_eq!(first.meta, json!({"subcategory": "Red Meat", "amountKg": 0.25}));

        let recent = repo.recent("u1", 10).unwrap();
        assert_eq!(recent, vec![second.clone(), first.clone()]);
        assert_eq!(repo.recent("u1", 1).unwrap(), vec![second]);
        assert_eq!(repo.all_for("u1").unwrap().len(), 2);
        assert_eq!(repo.all_for("u").unwrap().len(), 0);
    }

    #[test]
    fn logged_uses_local_calendar_day() {
        let (_dir, store) = temp_store();
        let late_evening: Timestamp = "2025-08-10T23:30:00Z".parse().unwrap();
        let record = store
            .activities
            .insert("u1", emission(json!({"diet": {"meals": 1}})), late_evening)
            .unwrap();
        let utc = record.logged(&TimeZone::UTC).unwrap();
        assert_eq!(utc.day, jiff::civil::date(2025, 8, 10));
        let east = record
            .logged(&TimeZone::fixed(jiff::tz::offset(10)))
            .unwrap();
        assert_eq!(east.day, jiff::civil::date(2025, 8, 11));
    }

    #[test]
    fn corrupt_meta_is_a_decode_error() {
        let (_dir, store) = temp_store();
        let stored = StoredActivity {
            category: "waste".to_string(),
            kind: "waste".to_string(),
            quantity: 1.0,
            unit: "kg".to_string(),
            emission_kg: 0.5,
            factor_key: "waste.mixed.kg".to_string(),
            meta: "{not json".to_string(),
            created_at: 0,
        };
        store
            .activities
            .activities
            .insert(OwnedKey::new("u1", RecordKey::new()), to_bytes(&stored).unwrap())
            .unwrap();
        assert!(matches!(
            store.activities.all_for("u1"),
            Err(StoreError::Decode(_))
        ));
    }
}
