use super::RecordSink;
use crate::model::Record;
use anyhow::{Context, Result};
use arrow_array::{ArrayRef, BinaryArray, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use geozero::{CoordDimensions, ToWkb};
use parquet::arrow::ArrowWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

const BATCH_SIZE: usize = 10_000;

/// GeoParquet 1.0 output with fixed columns: `geometry` (WKB), `id`, `tier`,
/// `category`, `name` and `tags` (JSON object).
pub struct GeoParquetSink {
    writer: Option<ArrowWriter<File>>,
    schema: Arc<Schema>,
    buffer: RowBuffer,
}

#[derive(Default)]
struct RowBuffer {
    geometry: Vec<Vec<u8>>,
    id: Vec<String>,
    tier: Vec<&'static str>,
    category: Vec<Option<String>>,
    name: Vec<Option<String>>,
    tags: Vec<String>,
}

impl RowBuffer {
    fn len(&self) -> usize {
        self.geometry.len()
    }

    fn take_columns(&mut self) -> Vec<ArrayRef> {
        let buffer = std::mem::take(self);
        vec![
            Arc::new(BinaryArray::from_iter_values(buffer.geometry)),
            Arc::new(StringArray::from_iter_values(buffer.id)),
            Arc::new(StringArray::from_iter_values(buffer.tier)),
            Arc::new(StringArray::from(buffer.category)),
            Arc::new(StringArray::from(buffer.name)),
            Arc::new(StringArray::from_iter_values(buffer.tags)),
        ]
    }
}

fn schema() -> Schema {
    Schema::new(vec![
        Field::new("geometry", DataType::Binary, false),
        Field::new("id", DataType::Utf8, false),
        Field::new("tier", DataType::Utf8, false),
        Field::new("category", DataType::Utf8, true),
        Field::new("name", DataType::Utf8, true),
        Field::new("tags", DataType::Utf8, false),
    ])
}

impl GeoParquetSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("Sink: Failed to create geoparquet file {:?}", path.as_ref()))?;

        let schema = Arc::new(schema());

        // Group aggregation can yield any geometry kind
        let geo_metadata = serde_json::json!({
            "version": "1.0.0",
            "primary_column": "geometry",
            "columns": {
                "geometry": {
                    "encoding": "WKB",
                    "geometry_types": [],
                    "crs": "EPSG:4326"
                }
            }
        })
        .to_string();

        let kv_metadata = vec![KeyValue::new("geo".to_string(), Some(geo_metadata))];
        let props = WriterProperties::builder()
            .set_key_value_metadata(Some(kv_metadata))
            .build();

        let writer = ArrowWriter::try_new(file, schema.clone(), Some(props))
            .context("Sink: Failed to start geoparquet writer")?;

        Ok(Self {
            writer: Some(writer),
            schema,
            buffer: RowBuffer::default(),
        })
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.len() == 0 {
            return Ok(());
        }

        let batch = RecordBatch::try_new(self.schema.clone(), self.buffer.take_columns())?;
        if let Some(writer) = self.writer.as_mut() {
            writer.write(&batch)?;
        }
        Ok(())
    }
}

impl RecordSink for GeoParquetSink {
    fn add_record(&mut self, record: Record) -> Result<()> {
        let wkb = record
            .geometry
            .to_wkb(CoordDimensions::xy())
            .with_context(|| format!("Sink: Failed to convert geometry of {} to WKB", record.id))?;
        let tags_json = serde_json::to_string(&record.tags.to_json())?;

        self.buffer.geometry.push(wkb);
        self.buffer.id.push(record.id.to_string());
        self.buffer.tier.push(record.id.tier.as_str());
        self.buffer.name.push(record.name().map(str::to_string));
        self.buffer.category.push(record.category);
        self.buffer.tags.push(tags_json);

        if self.buffer.len() >= BATCH_SIZE {
            self.flush()?;
        }

        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.flush()?;
        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityId, TagMap, Tier};
    use geo_types::{Geometry, GeometryCollection, LineString, Point, Polygon};
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use tempfile::NamedTempFile;

    fn record(tier: Tier, id: i64, geometry: Geometry<f64>) -> Record {
        let mut tags = TagMap::new();
        tags.insert("name", "Somewhere");
        tags.insert("amenity", "cafe");
        Record {
            id: EntityId::new(tier, id),
            tags,
            geometry,
            category: Some("CAFE".into()),
        }
    }

    fn read_back(path: &Path) -> SerializedFileReader<File> {
        SerializedFileReader::new(File::open(path).unwrap()).unwrap()
    }

    // ============================================
    // GeoParquetSink creation and basic operations
    // ============================================

    #[test]
    fn writes_geo_metadata() {
        let temp_file = NamedTempFile::with_suffix(".parquet").unwrap();
        let mut sink = GeoParquetSink::new(temp_file.path()).unwrap();
        sink.add_record(record(Tier::Point, 1, Geometry::Point(Point::new(-0.1, 51.5))))
            .unwrap();
        sink.finish().unwrap();

        let reader = read_back(temp_file.path());
        let file_metadata = reader.metadata().file_metadata();
        assert_eq!(file_metadata.num_rows(), 1);
        let geo = file_metadata
            .key_value_metadata()
            .unwrap()
            .iter()
            .find(|kv| kv.key == "geo")
            .and_then(|kv| kv.value.clone())
            .unwrap();
        let geo: serde_json::Value = serde_json::from_str(&geo).unwrap();
        assert_eq!(geo["primary_column"], "geometry");
        assert_eq!(geo["columns"]["geometry"]["encoding"], "WKB");
    }

    #[test]
    fn writes_every_geometry_kind() {
        let temp_file = NamedTempFile::with_suffix(".parquet").unwrap();
        let mut sink = GeoParquetSink::new(temp_file.path()).unwrap();

        let line = LineString::from(vec![(0.0, 0.0), (1.0, 1.0), (2.0, 0.0)]);
        let polygon = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]),
            vec![],
        );
        let collection = GeometryCollection::new_from(vec![
            Geometry::Point(Point::new(3.0, 3.0)),
            Geometry::LineString(line.clone()),
        ]);

        sink.add_record(record(Tier::Chain, 2, Geometry::LineString(line)))
            .unwrap();
        sink.add_record(record(Tier::Chain, 3, Geometry::Polygon(polygon)))
            .unwrap();
        sink.add_record(record(
            Tier::Group,
            4,
            Geometry::GeometryCollection(collection),
        ))
        .unwrap();
        sink.finish().unwrap();

        let reader = read_back(temp_file.path());
        assert_eq!(reader.metadata().file_metadata().num_rows(), 3);
        let columns: Vec<String> = reader
            .metadata()
            .file_metadata()
            .schema_descr()
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(
            columns,
            vec!["geometry", "id", "tier", "category", "name", "tags"]
        );
    }

    #[test]
    fn flushes_in_batches() {
        let temp_file = NamedTempFile::with_suffix(".parquet").unwrap();
        let mut sink = GeoParquetSink::new(temp_file.path()).unwrap();
        for id in 0..(BATCH_SIZE as i64 + 5) {
            sink.add_record(record(Tier::Point, id, Geometry::Point(Point::new(0.0, 0.0))))
                .unwrap();
        }
        assert_eq!(sink.buffer.len(), 5);
        sink.finish().unwrap();

        let reader = read_back(temp_file.path());
        assert_eq!(
            reader.metadata().file_metadata().num_rows(),
            BATCH_SIZE as i64 + 5
        );
    }

    #[test]
    fn handles_empty_file() {
        let temp_file = NamedTempFile::with_suffix(".parquet").unwrap();
        let mut sink = GeoParquetSink::new(temp_file.path()).unwrap();
        // Don't add any records
        assert!(sink.finish().is_ok());
        assert_eq!(
            read_back(temp_file.path()).metadata().file_metadata().num_rows(),
            0
        );
    }
}
