use anyhow::Result;
use ::geojson::{Feature, feature::Id};
use serde_json::{Map, Value};

use crate::model::Record;

pub mod geojson;
pub mod geojsonl;
pub mod geoparquet;

pub use self::geojson::GeoJsonSink;
pub use self::geojsonl::GeoJsonlSink;
pub use self::geoparquet::GeoParquetSink;

/// Receives emitted records synchronously, in scan order.
pub trait RecordSink: Send {
    fn add_record(&mut self, record: Record) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// Properties shared by the JSON sinks: `id`, `tier`, `category` (when
/// classified) and the full `tags` object.
pub fn record_properties(record: &Record) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("id".to_string(), Value::String(record.id.to_string()));
    properties.insert(
        "tier".to_string(),
        Value::String(record.id.tier.as_str().to_string()),
    );
    if let Some(category) = &record.category {
        properties.insert("category".to_string(), Value::String(category.clone()));
    }
    properties.insert("tags".to_string(), Value::Object(record.tags.to_json()));
    properties
}

pub fn record_to_feature(record: &Record) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(::geojson::Geometry::from(&record.geometry)),
        id: Some(Id::String(record.id.to_string())),
        properties: Some(record_properties(record)),
        foreign_members: None,
    }
}

/// Collects records in memory.
#[cfg(test)]
#[derive(Default)]
pub struct MemorySink {
    pub records: Vec<Record>,
    pub finished: bool,
}

#[cfg(test)]
impl MemorySink {
    /// Records serialized as GeoJSON lines, for byte-level comparisons.
    pub fn to_lines(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|record| {
                serde_json::to_string(&::geojson::GeoJson::Feature(record_to_feature(record)))
                    .unwrap()
            })
            .collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.id.to_string()).collect()
    }
}

#[cfg(test)]
impl RecordSink for MemorySink {
    fn add_record(&mut self, record: Record) -> Result<()> {
        self.records.push(record);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityId, TagMap, Tier};
    use geo_types::{Geometry, Point};

    #[test]
    fn feature_carries_id_tier_category_and_tags() {
        let mut tags = TagMap::new();
        tags.insert("name", "Cafe Nero");
        let record = Record {
            id: EntityId::new(Tier::Point, 42),
            tags,
            geometry: Geometry::Point(Point::new(1.0, 2.0)),
            category: Some("CAFE".into()),
        };
        let feature = record_to_feature(&record);
        assert_eq!(feature.id, Some(Id::String("node/42".into())));
        let properties = feature.properties.unwrap();
        assert_eq!(properties["id"], "node/42");
        assert_eq!(properties["tier"], "node");
        assert_eq!(properties["category"], "CAFE");
        assert_eq!(properties["tags"]["name"], "Cafe Nero");
    }

    #[test]
    fn unclassified_record_has_no_category() {
        let record = Record {
            id: EntityId::new(Tier::Chain, 7),
            tags: TagMap::new(),
            geometry: Geometry::Point(Point::new(0.0, 0.0)),
            category: None,
        };
        let properties = record_properties(&record);
        assert!(!properties.contains_key("category"));
        assert_eq!(properties["tier"], "way");
    }
}
