use super::{RecordSink, record_to_feature};
use crate::model::Record;
use anyhow::{Context, Result};
use geojson::GeoJson;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct GeoJsonSink {
    writer: BufWriter<File>,
    first_feature: bool,
}

impl GeoJsonSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("Sink: Failed to create {:?}", path.as_ref()))?;
        let mut writer = BufWriter::new(file);

        // Write the header of the FeatureCollection
        writeln!(writer, "{{")?;
        writeln!(writer, "  \"type\": \"FeatureCollection\",")?;
        writeln!(writer, "  \"features\": [")?;

        Ok(Self {
            writer,
            first_feature: true,
        })
    }
}

impl RecordSink for GeoJsonSink {
    fn add_record(&mut self, record: Record) -> Result<()> {
        if !self.first_feature {
            writeln!(self.writer, ",")?;
        }
        self.first_feature = false;

        let geojson = GeoJson::Feature(record_to_feature(&record));
        serde_json::to_writer(&mut self.writer, &geojson)?;

        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        // Close the array and object
        writeln!(self.writer)?;
        writeln!(self.writer, "  ]")?;
        writeln!(self.writer, "}}")?;
        self.writer.flush()?;
        Ok(())
    }
}
