use std::fmt;

use crate::model::Tier;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TierCounts {
    pub points: u64,
    pub chains: u64,
    pub groups: u64,
}

impl TierCounts {
    pub fn bump(&mut self, tier: Tier) {
        *self.get_mut(tier) += 1;
    }

    fn get_mut(&mut self, tier: Tier) -> &mut u64 {
        match tier {
            Tier::Point => &mut self.points,
            Tier::Chain => &mut self.chains,
            Tier::Group => &mut self.groups,
        }
    }

    pub fn total(&self) -> u64 {
        self.points + self.chains + self.groups
    }
}

impl fmt::Display for TierCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nodes, {} ways, {} relations",
            self.points, self.chains, self.groups
        )
    }
}

/// What happened during a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolveStats {
    /// Feed replays, one per pass.
    pub passes: u32,
    /// Group reference scans, the first one included.
    pub group_scans: u32,
    /// Index entries right before the indices were released.
    pub indexed: TierCounts,
    /// Entities seen by the full resolution pass.
    pub scanned: TierCounts,
    pub emitted: TierCounts,
    /// Member references that had no geometry when they were needed.
    pub unresolved: TierCounts,
    pub deferred: u64,
    /// Deferred groups whose members all resolved on retry.
    pub resolved_at_finalize: u64,
    /// Deferred groups accepted on retry with some members missing.
    pub partial_at_finalize: u64,
    pub suppressed_unnamed: u64,
    /// Wanted or matched entities for which no geometry could be built.
    pub without_geometry: u64,
}

impl ResolveStats {
    pub fn log_summary(&self) {
        tracing::info!(
            "Resolver: {} passes ({} group scans), emitted {}",
            self.passes,
            self.group_scans,
            self.emitted
        );
        tracing::info!("Resolver: indexed {}", self.indexed);
        if self.unresolved.total() > 0 {
            tracing::info!("Resolver: unresolved references: {}", self.unresolved);
        }
        if self.deferred > 0 {
            tracing::info!(
                "Resolver: {} deferred groups ({} resolved, {} partial on retry)",
                self.deferred,
                self.resolved_at_finalize,
                self.partial_at_finalize
            );
        }
        if self.suppressed_unnamed > 0 {
            tracing::info!(
                "Resolver: {} unnamed entities suppressed",
                self.suppressed_unnamed
            );
        }
        if self.without_geometry > 0 {
            tracing::info!(
                "Resolver: {} entities without geometry skipped",
                self.without_geometry
            );
        }
    }
}
