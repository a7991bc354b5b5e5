//! Entities flowing through the resolver and the records it emits.

use geo_types::Geometry;
use serde_json::{Map, Value};
use std::fmt;

/// The three entity kinds, in stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Point,
    Chain,
    Group,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Point, Tier::Chain, Tier::Group];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Point => "node",
            Tier::Chain => "way",
            Tier::Group => "relation",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of an entity; ids are only unique within a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    pub tier: Tier,
    pub id: i64,
}

impl EntityId {
    pub fn new(tier: Tier, id: i64) -> Self {
        Self { tier, id }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tier, self.id)
    }
}

/// Insertion-ordered tag pairs. Entities carry a handful of tags, so a
/// linear scan beats hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap(Vec<(String, String)>);

impl TagMap {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Insert a pair; an existing key keeps its position and takes the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    /// Tags as a JSON object.
    pub fn to_json(&self) -> Map<String, Value> {
        self.iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }
}

impl FromIterator<(String, String)> for TagMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut tags = TagMap::new();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}

/// A located vertex (x = lon, y = lat).
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: i64,
    pub tags: TagMap,
    pub lon: f64,
    pub lat: f64,
}

/// An ordered sequence of point references (an OSM way).
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub id: i64,
    pub tags: TagMap,
    pub refs: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: i64,
    pub tier: Tier,
    pub role: String,
}

/// An ordered list of members of any tier (an OSM relation).
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub id: i64,
    pub tags: TagMap,
    pub members: Vec<Member>,
}

/// One entity from the feed.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Point(Point),
    Chain(Chain),
    Group(Group),
}

impl Entity {
    pub fn tier(&self) -> Tier {
        match self {
            Entity::Point(_) => Tier::Point,
            Entity::Chain(_) => Tier::Chain,
            Entity::Group(_) => Tier::Group,
        }
    }
}

/// A resolved entity handed to a record sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: EntityId,
    pub tags: TagMap,
    pub geometry: Geometry<f64>,
    pub category: Option<String>,
}

impl Record {
    pub fn name(&self) -> Option<&str> {
        self.tags.get("name")
    }
}

/// A member id that was absent from its tier's index at resolution time.
/// Recovered locally: the owning entity proceeds without it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub tier: Tier,
    pub id: i64,
}

impl fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unresolved reference to {}/{}", self.tier, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_map_keeps_insertion_order() {
        let mut tags = TagMap::new();
        tags.insert("name", "A");
        tags.insert("amenity", "cafe");
        tags.insert("name", "B");
        let pairs: Vec<(&str, &str)> = tags.iter().collect();
        assert_eq!(pairs, vec![("name", "B"), ("amenity", "cafe")]);
    }

    #[test]
    fn tag_map_json_preserves_values() {
        let tags: TagMap = vec![("a".to_string(), "1".to_string())].into_iter().collect();
        let json = tags.to_json();
        assert_eq!(json.get("a"), Some(&Value::String("1".into())));
        assert!(tags.contains_key("a"));
        assert!(!tags.contains_key("b"));
    }

    #[test]
    fn entity_id_display() {
        assert_eq!(EntityId::new(Tier::Point, 7).to_string(), "node/7");
        assert_eq!(EntityId::new(Tier::Chain, 8).to_string(), "way/8");
        assert_eq!(EntityId::new(Tier::Group, -9).to_string(), "relation/-9");
    }
}
