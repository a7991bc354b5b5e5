use super::{RecordSink, record_to_feature};
use crate::model::Record;
use anyhow::{Context, Result};
use geojson::GeoJson;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One GeoJSON feature per line.
pub struct GeoJsonlSink {
    writer: BufWriter<Box<dyn Write + Send>>,
}

impl GeoJsonlSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("Sink: Failed to create {:?}", path.as_ref()))?;
        Ok(Self {
            writer: BufWriter::new(Box::new(file)),
        })
    }

    pub fn stdout() -> Result<Self> {
        Ok(Self {
            writer: BufWriter::new(Box::new(std::io::stdout())),
        })
    }
}

impl RecordSink for GeoJsonlSink {
    fn add_record(&mut self, record: Record) -> Result<()> {
        let geojson = GeoJson::Feature(record_to_feature(&record));
        serde_json::to_writer(&mut self.writer, &geojson)?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
