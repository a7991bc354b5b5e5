use anyhow::{Context, Result};
use geo_types::{Coord, Geometry};

use super::Resolver;
use crate::feed::{EntityFeed, TierMask};
use crate::geometry::{ResolvedMember, chain_geometry, group_geometry};
use crate::model::{
    Chain, Entity, EntityId, Group, Point, Record, TagMap, Tier, UnresolvedReference,
};
use crate::sinks::RecordSink;

/// Outcome of building a group from the current index contents.
enum GroupBuild {
    Built {
        geometry: Option<Geometry<f64>>,
        missing: usize,
    },
    /// A member group has no geometry yet.
    Deferred,
}

impl Resolver<'_> {
    /// Register the members of every relevant or wanted group. Returns the
    /// number of group ids that became wanted during this scan.
    pub(super) fn register_groups(&mut self, feed: &mut dyn EntityFeed) -> Result<u64> {
        self.stats.passes += 1;
        self.stats.group_scans += 1;
        let mut new_group_refs = 0u64;

        feed.replay(TierMask::only(Tier::Group), &mut |entity| {
            let Entity::Group(group) = entity else {
                return Ok(());
            };
            let wanted = self.index.tier(Tier::Group).contains_key(group.id);
            if !wanted && !self.classification.is_relevant(&group.tags) {
                return Ok(());
            }
            for member in &group.members {
                let added = self
                    .index
                    .tier_mut(member.tier)
                    .want(member.id)
                    .with_context(|| {
                        format!("Index: Failed to register {}/{}", member.tier, member.id)
                    })?;
                if added && member.tier == Tier::Group {
                    new_group_refs += 1;
                }
            }
            Ok(())
        })?;

        Ok(new_group_refs)
    }

    /// Register the points of every relevant or wanted chain.
    pub(super) fn register_chains(&mut self, feed: &mut dyn EntityFeed) -> Result<()> {
        self.stats.passes += 1;

        feed.replay(TierMask::only(Tier::Chain), &mut |entity| {
            let Entity::Chain(chain) = entity else {
                return Ok(());
            };
            if !self.index.tier(Tier::Chain).contains_key(chain.id)
                && !self.classification.is_relevant(&chain.tags)
            {
                return Ok(());
            }
            let points = self.index.tier_mut(Tier::Point);
            for &point_id in &chain.refs {
                points
                    .want(point_id)
                    .with_context(|| format!("Index: Failed to register node/{point_id}"))?;
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Resolve every tier in stream order, storing wanted geometries and
    /// emitting matched entities. Groups blocked on a member group are queued.
    pub(super) fn resolve_all(
        &mut self,
        feed: &mut dyn EntityFeed,
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        self.stats.passes += 1;

        feed.replay(TierMask::ALL, &mut |entity| {
            self.stats.scanned.bump(entity.tier());
            match entity {
                Entity::Point(point) => self.resolve_point(point, sink),
                Entity::Chain(chain) => self.resolve_chain(chain, sink),
                Entity::Group(group) => self.resolve_group(group, sink),
            }
        })?;

        let (points, chains, groups) = self.index.sizes();
        tracing::info!(
            "Resolved {} nodes, {} ways, {} relations; {} relations deferred",
            points,
            chains,
            groups,
            self.deferred.len()
        );
        Ok(())
    }

    /// Retry every deferred group once, accepting missing members.
    pub(super) fn finalize(&mut self, sink: &mut dyn RecordSink) -> Result<()> {
        let mut queue = std::mem::take(&mut self.deferred);
        self.stats.deferred = queue.total();

        for deferred in queue.drain() {
            let group = deferred.group;
            let GroupBuild::Built { geometry, missing } = self.build_group(&group, true)? else {
                continue;
            };
            match (&geometry, missing) {
                (None, _) => {}
                (Some(_), 0) => self.stats.resolved_at_finalize += 1,
                (Some(_), _) => self.stats.partial_at_finalize += 1,
            }
            self.store_and_emit(
                EntityId::new(Tier::Group, group.id),
                group.tags,
                geometry,
                deferred.matched,
                sink,
            )?;
        }
        Ok(())
    }

    fn resolve_point(&mut self, point: Point, sink: &mut dyn RecordSink) -> Result<()> {
        let geometry = Geometry::Point(geo_types::Point::new(point.lon, point.lat));
        let matched = self.classification.matches(&point.tags);
        self.store_and_emit(
            EntityId::new(Tier::Point, point.id),
            point.tags,
            Some(geometry),
            matched,
            sink,
        )
    }

    fn resolve_chain(&mut self, chain: Chain, sink: &mut dyn RecordSink) -> Result<()> {
        let matched = self.classification.matches(&chain.tags);
        if !matched && !self.index.tier(Tier::Chain).contains_key(chain.id) {
            return Ok(());
        }

        let mut coords: Vec<Coord<f64>> = Vec::with_capacity(chain.refs.len());
        for &point_id in &chain.refs {
            let geometry = self.index.tier(Tier::Point).get(point_id)?;
            match geometry {
                Some(Geometry::Point(point)) => coords.push(point.0),
                _ => self.unresolved(Tier::Point, point_id, EntityId::new(Tier::Chain, chain.id)),
            }
        }

        self.store_and_emit(
            EntityId::new(Tier::Chain, chain.id),
            chain.tags,
            chain_geometry(&coords),
            matched,
            sink,
        )
    }

    fn resolve_group(&mut self, group: Group, sink: &mut dyn RecordSink) -> Result<()> {
        let matched = self.classification.matches(&group.tags);
        if !matched && !self.index.tier(Tier::Group).contains_key(group.id) {
            return Ok(());
        }

        match self.build_group(&group, false)? {
            GroupBuild::Deferred => {
                tracing::debug!("relation/{} deferred until finalize", group.id);
                self.deferred.push(group, matched);
                Ok(())
            }
            GroupBuild::Built { geometry, .. } => self.store_and_emit(
                EntityId::new(Tier::Group, group.id),
                group.tags,
                geometry,
                matched,
                sink,
            ),
        }
    }

    /// Collect the member geometries currently in the index. Without
    /// `allow_partial`, an unresolved member group defers the whole group;
    /// other missing members are always dropped.
    fn build_group(&mut self, group: &Group, allow_partial: bool) -> Result<GroupBuild> {
        if !allow_partial {
            for member in group.members.iter().filter(|m| m.tier == Tier::Group) {
                if self.index.tier(Tier::Group).get(member.id)?.is_none() {
                    return Ok(GroupBuild::Deferred);
                }
            }
        }

        let owner = EntityId::new(Tier::Group, group.id);
        let mut resolved = Vec::with_capacity(group.members.len());
        let mut missing = 0;
        for member in &group.members {
            let geometry = self.index.tier(member.tier).get(member.id)?;
            match geometry {
                Some(geometry) => resolved.push(ResolvedMember {
                    role: member.role.clone(),
                    geometry,
                }),
                None => {
                    missing += 1;
                    self.unresolved(member.tier, member.id, owner);
                }
            }
        }

        Ok(GroupBuild::Built {
            geometry: group_geometry(group.tags.get("type"), &resolved),
            missing,
        })
    }

    fn unresolved(&mut self, tier: Tier, id: i64, owner: EntityId) {
        let reference = UnresolvedReference { tier, id };
        tracing::debug!("{} references missing {}", owner, reference);
        self.stats.unresolved.bump(tier);
    }

    /// Store the geometry if a higher tier wants it, and emit a record if
    /// the entity matched.
    fn store_and_emit(
        &mut self,
        id: EntityId,
        tags: TagMap,
        geometry: Option<Geometry<f64>>,
        matched: bool,
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        let Some(geometry) = geometry else {
            self.stats.without_geometry += 1;
            tracing::debug!("{} has no resolvable geometry", id);
            return Ok(());
        };

        let index = self.index.tier_mut(id.tier);
        if index.contains_key(id.id) {
            index
                .put(id.id, Some(&geometry))
                .with_context(|| format!("Index: Failed to store {}", id))?;
        }

        if !matched {
            return Ok(());
        }
        if !self.classification.admits_name(&tags) {
            self.stats.suppressed_unnamed += 1;
            return Ok(());
        }

        let category = self.classification.categorize(&tags).map(str::to_string);
        sink.add_record(Record {
            id,
            tags,
            geometry,
            category,
        })
        .with_context(|| format!("Sink: Failed to write {}", id))?;
        self.stats.emitted.bump(id.tier);
        Ok(())
    }
}
