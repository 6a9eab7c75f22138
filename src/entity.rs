use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

use crate::coordinate::Coordinate;

/// Record published after a successful upsert. Dependents read the remote id
/// and name from here when their own parameters are resolved.
#[derive(Debug, Clone)]
pub struct ResolvedEntity {
    pub coordinate: Coordinate,
    pub name: String,
    pub id: String,
    pub properties: HashMap<String, Value>,
}

impl ResolvedEntity {
    pub fn new(coordinate: Coordinate, name: impl Into<String>, id: impl Into<String>) -> Self {
        let name = name.into();
        let id = id.into();
        let mut properties = HashMap::new();
        properties.insert("id".to_string(), Value::String(id.clone()));
        properties.insert("name".to_string(), Value::String(name.clone()));
        Self {
            coordinate,
            name,
            id,
            properties,
        }
    }

    pub fn with_properties(mut self, extra: HashMap<String, Value>) -> Self {
        for (key, value) in extra {
            self.properties.entry(key).or_insert(value);
        }
        self
    }
}

/// Per-environment lookup of resolved entities, keyed by coordinate.
///
/// Concurrent readers and writers are expected; coordinates are unique within
/// a run, so last-write-wins insertion is sufficient.
#[derive(Debug, Default)]
pub struct EntityMap {
    entries: RwLock<HashMap<Coordinate, ResolvedEntity>>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, entity: ResolvedEntity) {
        let mut entries = self.entries.write().expect("entity map lock poisoned");
        entries.insert(entity.coordinate.clone(), entity);
    }

    pub fn get(&self, coordinate: &Coordinate) -> Option<ResolvedEntity> {
        let entries = self.entries.read().expect("entity map lock poisoned");
        entries.get(coordinate).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("entity map lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishes_id_and_name_properties() {
        let entity = ResolvedEntity::new(
            Coordinate::new("infra", "bucket", "raw-logs"),
            "raw_logs",
            "bkt-1",
        );
        assert_eq!(entity.properties.get("id"), Some(&Value::String("bkt-1".into())));
        assert_eq!(
            entity.properties.get("name"),
            Some(&Value::String("raw_logs".into()))
        );
    }

    #[test]
    fn lookup_returns_published_entity() {
        let map = EntityMap::new();
        let coordinate = Coordinate::new("infra", "bucket", "raw-logs");
        assert!(map.get(&coordinate).is_none());
        map.publish(ResolvedEntity::new(coordinate.clone(), "raw_logs", "bkt-1"));
        let entity = map.get(&coordinate).expect("entity published");
        assert_eq!(entity.id, "bkt-1");
        assert_eq!(map.len(), 1);
    }
}
