use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use greensteps_core::EmissionFactorTable;
use greensteps_core::factors::is_valid_coefficient;

use super::{StoreError, StoreResult};

/// Administrator maintained emission coefficients. Values here win over the
/// built-in defaults.
#[derive(Clone)]
pub(crate) struct FactorRepo {
    factors: PartitionHandle,
}

impl FactorRepo {
    pub(crate) fn new(keyspace: Keyspace) -> StoreResult<FactorRepo> {
        let factors =
            keyspace.open_partition("emission_factors", PartitionCreateOptions::default())?;
        Ok(FactorRepo { factors })
    }
    pub(crate) fn set(&self, key: &str, value: f64) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::InvalidRequest("empty factor key".to_string()));
        }
        if !is_valid_coefficient(value) {
            return Err(StoreError::InvalidRequest(format!(
                "factor '{key}' must be a positive number"
            )));
        }
        self.factors.insert(key, value.to_le_bytes())?;
        Ok(())
    }
    /// Returns whether an override existed.
    pub(crate) fn remove(&self, key: &str) -> StoreResult<bool> {
        if !self.factors.contains_key(key)? {
            return Ok(false);
        }
        self.factors.remove(key)?;
        Ok(true)
    }
    /// Stored overrides in key order.
    pub(crate) fn all(&self) -> StoreResult<Vec<(String, f64)>> {
        let mut result = vec![];
        for pair in self.factors.iter() {
            let (key, bytes) = pair?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Decode(e.to_string()))?;
            let bytes: [u8; 8] = bytes
                .as_ref()
                .try_into()
                .map_err(|_| StoreError::Decode(format!("factor '{key}' is not an f64")))?;
            result.push((key, f64::from_le_bytes(bytes)));
        }
        Ok(result)
    }
    /// Defaults overlaid with every stored override.
    pub(crate) fn table(&self) -> StoreResult<EmissionFactorTable> {
        Ok(EmissionFactorTable::defaults().with_overrides(self.all()?))
    }
}

#[cfg(test)]
mod tests {
    use crate::store::testing::temp_store;

    #[test]
    fn overrides_replace_defaults() {
        let (_dir, store) = temp_store();
        let repo = &store.factors;
        assert_eq!(repo.table().unwrap().coefficient("transport.bus.km"), Some(0.105));

        repo.set("transport.bus.km", 0.09).unwrap();
        repo.set("transport.ferry.km", 0.12).unwrap();
        let table = repo.table().unwrap();
        assert_eq!(table.coefficient("transport.bus.km"), Some(0.09));
        assert_eq!(table.coefficient("transport.ferry.km"), Some(0.12));
        assert_eq!(
            repo.all().unwrap(),
            vec![("transport.bus.km".to_string(), 0.09), ("transport.ferry.km".to_string(), 0.12)]
        );

        assert!(repo.remove("transport.bus.km").unwrap());
        assert!(!repo.remove("transport.bus.km").unwrap());
        assert_eq!(repo.table().unwrap().coefficient("transport.bus.km"), Some(0.105));
    }

    #[test]
    fn rejects_non_positive_factors() {
        let (_dir, store) = temp_store();
        assert!(store.factors.set("transport.bus.km", 0.0).is_err());
        assert!(store.factors.set("transport.bus.km", -1.0).is_err());
        assert!(store.factors.set("transport.bus.km", f64::NAN).is_err());
        assert!(store.factors.set("", 1.0).is_err());
        assert!(store.factors.all().unwrap().is_empty());
    }
}
