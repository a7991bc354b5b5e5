use anyhow::Result;
use geo_types::Geometry;
use std::collections::HashMap;

use super::GeometryIndex;

#[derive(Default)]
pub struct MemoryIndex {
    entries: HashMap<i64, Option<Geometry<f64>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GeometryIndex for MemoryIndex {
    fn contains_key(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    fn get(&self, id: i64) -> Result<Option<Geometry<f64>>> {
        Ok(self.entries.get(&id).cloned().flatten())
    }

    fn put(&mut self, id: i64, geometry: Option<&Geometry<f64>>) -> Result<()> {
        self.entries.insert(id, geometry.cloned());
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) -> Result<()> {
        self.entries = HashMap::new();
        Ok(())
    }
}
