//! Reference index: a per-tier `id -> Option<Geometry>` map.
//!
//! An entry without a geometry means "wanted": an entity of a higher tier
//! references this id and needs it resolved. Two interchangeable backings
//! exist, a `HashMap` and a pair of memory-mapped temp files; one is picked
//! per run for all three tiers.

use anyhow::Result;
use geo_types::Geometry;
use std::path::{Path, PathBuf};

use crate::config::IndexMode;
use crate::model::Tier;

mod disk;
mod memory;

pub use self::disk::DiskIndex;
pub use self::memory::MemoryIndex;

pub trait GeometryIndex: Send {
    fn contains_key(&self, id: i64) -> bool;

    /// The resolved geometry, or `None` when the id is absent or only wanted.
    fn get(&self, id: i64) -> Result<Option<Geometry<f64>>>;

    /// Insert or overwrite an entry. `None` registers the id as wanted.
    fn put(&mut self, id: i64, geometry: Option<&Geometry<f64>>) -> Result<()>;

    fn len(&self) -> usize;

    fn clear(&mut self) -> Result<()>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register `id` as wanted unless it already has an entry. Returns true
    /// when the id was new.
    fn want(&mut self, id: i64) -> Result<bool> {
        if self.contains_key(id) {
            return Ok(false);
        }
        self.put(id, None)?;
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStrategy {
    Memory,
    Disk,
}

/// Pick the backing for a run. In `Auto` mode the in-memory index is used
/// while the input stays below `fraction` of the memory budget. Returns the
/// strategy and a human-readable reason for logging.
pub fn select_strategy(
    mode: IndexMode,
    input_bytes: Option<u64>,
    budget_bytes: u64,
    fraction: f64,
) -> (IndexStrategy, String) {
    match mode {
        IndexMode::Memory => (IndexStrategy::Memory, "memory (forced)".to_string()),
        IndexMode::Disk => (IndexStrategy::Disk, "disk (forced)".to_string()),
        IndexMode::Auto => {
            let threshold = (budget_bytes as f64 * fraction) as u64;
            match input_bytes {
                Some(size) if size < threshold => (
                    IndexStrategy::Memory,
                    format!("memory (auto: input {size} bytes < threshold {threshold} bytes)"),
                ),
                Some(size) => (
                    IndexStrategy::Disk,
                    format!("disk (auto: input {size} bytes >= threshold {threshold} bytes)"),
                ),
                None => (
                    IndexStrategy::Disk,
                    "disk (auto: input size unknown)".to_string(),
                ),
            }
        }
    }
}

/// The three per-tier indices of a run. Temp files of the disk backing are
/// removed when the set is dropped, on every exit path.
pub struct IndexSet {
    points: Box<dyn GeometryIndex>,
    chains: Box<dyn GeometryIndex>,
    groups: Box<dyn GeometryIndex>,
}

impl IndexSet {
    pub fn open(strategy: IndexStrategy, tmp_dir: Option<&Path>) -> Result<Self> {
        let make = |tier: Tier| -> Result<Box<dyn GeometryIndex>> {
            Ok(match strategy {
                IndexStrategy::Memory => Box::new(MemoryIndex::new()),
                IndexStrategy::Disk => {
                    Box::new(DiskIndex::create(tier, tmp_dir.map(PathBuf::from))?)
                }
            })
        };
        Ok(Self {
            points: make(Tier::Point)?,
            chains: make(Tier::Chain)?,
            groups: make(Tier::Group)?,
        })
    }

    pub fn tier(&self, tier: Tier) -> &dyn GeometryIndex {
        match tier {
            Tier::Point => self.points.as_ref(),
            Tier::Chain => self.chains.as_ref(),
            Tier::Group => self.groups.as_ref(),
        }
    }

    pub fn tier_mut(&mut self, tier: Tier) -> &mut dyn GeometryIndex {
        match tier {
            Tier::Point => self.points.as_mut(),
            Tier::Chain => self.chains.as_mut(),
            Tier::Group => self.groups.as_mut(),
        }
    }

    /// Entry counts as (points, chains, groups).
    pub fn sizes(&self) -> (usize, usize, usize) {
        (self.points.len(), self.chains.len(), self.groups.len())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        for tier in Tier::ALL {
            self.tier_mut(tier).clear()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Geometry, LineString, Point, line_string, polygon};

    fn sample_geometries() -> Vec<(i64, Geometry<f64>)> {
        vec![
            (1, Geometry::Point(Point::new(-0.1277583, 51.5073509))),
            (
                -42,
                Geometry::LineString(line_string![(x: 1.0, y: 2.0), (x: 3.5, y: 4.25)]),
            ),
            (
                13_000_000_000,
                Geometry::Polygon(polygon![
                    (x: 0.0, y: 0.0),
                    (x: 1.0, y: 0.0),
                    (x: 1.0, y: 1.0),
                    (x: 0.0, y: 0.0),
                ]),
            ),
        ]
    }

    fn open(strategy: IndexStrategy) -> IndexSet {
        IndexSet::open(strategy, None).unwrap()
    }

    // ============================================
    // Strategy selection tests
    // ============================================

    #[test]
    fn auto_mode_prefers_memory_for_small_inputs() {
        let (strategy, reason) = select_strategy(IndexMode::Auto, Some(1_000), 1_000_000, 0.05);
        assert_eq!(strategy, IndexStrategy::Memory);
        assert!(reason.contains("auto"));
    }

    #[test]
    fn auto_mode_switches_to_disk_at_threshold() {
        let (strategy, _) = select_strategy(IndexMode::Auto, Some(50_000), 1_000_000, 0.05);
        assert_eq!(strategy, IndexStrategy::Disk);
        let (strategy, _) = select_strategy(IndexMode::Auto, Some(49_999), 1_000_000, 0.05);
        assert_eq!(strategy, IndexStrategy::Memory);
    }

    #[test]
    fn auto_mode_uses_disk_when_size_unknown() {
        let (strategy, _) = select_strategy(IndexMode::Auto, None, 1_000_000, 0.05);
        assert_eq!(strategy, IndexStrategy::Disk);
    }

    #[test]
    fn forced_modes_ignore_sizes() {
        let (strategy, _) = select_strategy(IndexMode::Memory, Some(u64::MAX), 1, 0.05);
        assert_eq!(strategy, IndexStrategy::Memory);
        let (strategy, _) = select_strategy(IndexMode::Disk, Some(0), u64::MAX, 0.05);
        assert_eq!(strategy, IndexStrategy::Disk);
    }

    // ============================================
    // Index contract tests (both backings)
    // ============================================

    fn check_contract(index: &mut dyn GeometryIndex) {
        assert!(index.is_empty());
        assert!(index.want(5).unwrap());
        assert!(!index.want(5).unwrap());
        assert!(index.contains_key(5));
        assert!(index.get(5).unwrap().is_none());
        assert!(!index.contains_key(6));
        assert!(index.get(6).unwrap().is_none());

        let geometry = Geometry::Point(Point::new(10.0, 20.0));
        index.put(5, Some(&geometry)).unwrap();
        assert_eq!(index.get(5).unwrap(), Some(geometry.clone()));
        assert!(!index.want(5).unwrap());
        assert_eq!(index.len(), 1);

        let replacement = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]));
        index.put(5, Some(&replacement)).unwrap();
        assert_eq!(index.get(5).unwrap(), Some(replacement));
        assert_eq!(index.len(), 1);

        index.clear().unwrap();
        assert!(index.is_empty());
        assert!(!index.contains_key(5));
    }

    #[test]
    fn memory_index_contract() {
        let mut index = MemoryIndex::new();
        check_contract(&mut index);
    }

    #[test]
    fn disk_index_contract() {
        let mut index = DiskIndex::create(Tier::Point, None).unwrap();
        check_contract(&mut index);
    }

    // ============================================
    // All backings equivalence tests
    // ============================================

    #[test]
    fn all_backings_produce_same_results() {
        let mut memory = open(IndexStrategy::Memory);
        let mut disk = open(IndexStrategy::Disk);

        for set in [&mut memory, &mut disk] {
            for (id, geometry) in sample_geometries() {
                set.tier_mut(Tier::Chain).put(id, Some(&geometry)).unwrap();
            }
            set.tier_mut(Tier::Group).want(99).unwrap();
        }

        for (id, expected) in sample_geometries() {
            let from_memory = memory.tier(Tier::Chain).get(id).unwrap();
            let from_disk = disk.tier(Tier::Chain).get(id).unwrap();
            assert_eq!(from_memory, Some(expected.clone()), "memory mismatch for {id}");
            assert_eq!(from_disk, Some(expected), "disk mismatch for {id}");
        }
        assert_eq!(memory.sizes(), (0, 3, 1));
        assert_eq!(disk.sizes(), (0, 3, 1));

        memory.clear_all().unwrap();
        disk.clear_all().unwrap();
        assert_eq!(memory.sizes(), (0, 0, 0));
        assert_eq!(disk.sizes(), (0, 0, 0));
    }

    #[test]
    fn tiers_are_independent() {
        let mut set = open(IndexStrategy::Memory);
        set.tier_mut(Tier::Point).want(1).unwrap();
        assert!(set.tier(Tier::Point).contains_key(1));
        assert!(!set.tier(Tier::Chain).contains_key(1));
        assert!(!set.tier(Tier::Group).contains_key(1));
    }
}
