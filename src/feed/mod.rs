//! Replayable entity feeds.
//!
//! A feed delivers every point, then every chain, then every group, and can
//! be replayed from the start once per resolver pass.

use anyhow::Result;
use std::path::PathBuf;
use thiserror::Error;

use crate::model::{Entity, Tier};

#[cfg(test)]
pub mod memory;
pub mod pbf;

pub use self::pbf::PbfFeed;

/// The tiers a pass wants to see. Feeds may skip materialising the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierMask {
    pub points: bool,
    pub chains: bool,
    pub groups: bool,
}

impl TierMask {
    pub const ALL: TierMask = TierMask {
        points: true,
        chains: true,
        groups: true,
    };

    pub fn only(tier: Tier) -> Self {
        TierMask {
            points: tier == Tier::Point,
            chains: tier == Tier::Chain,
            groups: tier == Tier::Group,
        }
    }

    pub fn contains(&self, tier: Tier) -> bool {
        match tier {
            Tier::Point => self.points,
            Tier::Chain => self.chains,
            Tier::Group => self.groups,
        }
    }

    pub fn label(&self) -> String {
        Tier::ALL
            .iter()
            .filter(|tier| self.contains(**tier))
            .map(|tier| format!("{tier}s"))
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// The feed could not be opened or read. Fatal to the whole run.
#[derive(Debug, Error)]
#[error("Feed: cannot read {path}: {reason}")]
pub struct StreamSourceFailure {
    pub path: PathBuf,
    pub reason: String,
}

pub trait EntityFeed {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Size of the underlying input, when known.
    fn size_bytes(&self) -> Option<u64>;

    /// Replay the feed from the start, calling `visit` for every entity of a
    /// tier in `tiers`, in stream order, on the calling thread. Returns the
    /// number of entities visited. An error from `visit` stops the replay and
    /// is returned as-is.
    fn replay(
        &mut self,
        tiers: TierMask,
        visit: &mut dyn FnMut(Entity) -> Result<()>,
    ) -> Result<u64>;
}
