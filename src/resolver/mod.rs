//! Multi-pass reference resolution.
//!
//! The feed is replayed once per pass. Group scans register the members of
//! relevant groups as wanted, a chain scan registers the points of relevant
//! chains, and a full pass resolves and emits everything in stream order.
//! Groups that needed a group not yet resolved are retried once at the end.
//!
//! Nested groups are found by rescanning groups while a scan registers new
//! group references, at most `group_rescans` extra times. Members of groups
//! nested deeper than that are never registered, so those groups come out
//! with the members that happened to resolve.

mod deferred;
mod passes;
mod stats;

use deferred::DeferredQueue;
pub use stats::{ResolveStats, TierCounts};

use anyhow::Result;
use std::fmt;

use crate::classify::Classification;
use crate::feed::{EntityFeed, TierMask};
use crate::model::Tier;
use crate::sinks::RecordSink;
use crate::storage::IndexSet;

/// Resolver states, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// `round` 0 is the first scan, later rounds are rescans.
    ScanGroupsForReferences { round: u32 },
    ScanChainsForReferences,
    FullResolution,
    FinalizeDeferredGroups,
}

impl Pass {
    /// Tiers the feed has to deliver for this pass. Finalizing reads only
    /// the deferred queue.
    pub fn tiers(&self) -> Option<TierMask> {
        match self {
            Pass::ScanGroupsForReferences { .. } => Some(TierMask::only(Tier::Group)),
            Pass::ScanChainsForReferences => Some(TierMask::only(Tier::Chain)),
            Pass::FullResolution => Some(TierMask::ALL),
            Pass::FinalizeDeferredGroups => None,
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pass::ScanGroupsForReferences { round: 0 } => {
                write!(f, "scanning relations for references")
            }
            Pass::ScanGroupsForReferences { round } => {
                write!(f, "rescanning relations for references (round {round})")
            }
            Pass::ScanChainsForReferences => write!(f, "scanning ways for references"),
            Pass::FullResolution => write!(f, "resolving and emitting"),
            Pass::FinalizeDeferredGroups => write!(f, "retrying deferred relations"),
        }
    }
}

/// Owns the indices of one run. `run` consumes the resolver, so the indices
/// and their temp files are released on every exit path.
pub struct Resolver<'a> {
    index: IndexSet,
    classification: &'a Classification,
    group_rescans: u32,
    deferred: DeferredQueue,
    stats: ResolveStats,
}

impl<'a> Resolver<'a> {
    pub fn new(index: IndexSet, classification: &'a Classification, group_rescans: u32) -> Self {
        Self {
            index,
            classification,
            group_rescans,
            deferred: DeferredQueue::new(),
            stats: ResolveStats::default(),
        }
    }

    pub fn run(
        mut self,
        feed: &mut dyn EntityFeed,
        sink: &mut dyn RecordSink,
    ) -> Result<ResolveStats> {
        let mut pass = Pass::ScanGroupsForReferences { round: 0 };
        loop {
            match pass.tiers() {
                Some(tiers) => tracing::info!(
                    "Pass {}: {} ({})",
                    self.stats.passes + 1,
                    pass,
                    tiers.label()
                ),
                None => tracing::info!("Finalize: {} ({} queued)", pass, self.deferred.len()),
            }

            pass = match pass {
                Pass::ScanGroupsForReferences { round } => {
                    let new_group_refs = self.register_groups(feed)?;
                    self.log_index_sizes();
                    if new_group_refs > 0 && round < self.group_rescans {
                        Pass::ScanGroupsForReferences { round: round + 1 }
                    } else {
                        if new_group_refs > 0 {
                            tracing::info!(
                                "Group rescan limit of {} reached with {} new relation references",
                                self.group_rescans,
                                new_group_refs
                            );
                        }
                        Pass::ScanChainsForReferences
                    }
                }
                Pass::ScanChainsForReferences => {
                    self.register_chains(feed)?;
                    self.log_index_sizes();
                    Pass::FullResolution
                }
                Pass::FullResolution => {
                    self.resolve_all(feed, sink)?;
                    Pass::FinalizeDeferredGroups
                }
                Pass::FinalizeDeferredGroups => {
                    self.finalize(sink)?;
                    break;
                }
            };
        }

        let (points, chains, groups) = self.index.sizes();
        self.stats.indexed = TierCounts {
            points: points as u64,
            chains: chains as u64,
            groups: groups as u64,
        };
        self.index.clear_all()?;
        Ok(self.stats)
    }

    fn log_index_sizes(&self) {
        let (points, chains, groups) = self.index.sizes();
        tracing::info!(
            "Indexed {} nodes, {} ways, {} relations",
            points,
            chains,
            groups
        );
    }
}
