use anyhow::Result;

use super::{EntityFeed, TierMask};
use crate::model::{Chain, Entity, Group, Member, Point, TagMap, Tier};

/// In-memory feed for driving the resolver in tests. Counts replays so
/// tests can assert how many passes ran.
pub struct VecFeed {
    entities: Vec<Entity>,
    pub replays: usize,
}

impl VecFeed {
    pub fn new(mut entities: Vec<Entity>) -> Self {
        // Stream order: all points, then chains, then groups
        entities.sort_by_key(|e| e.tier());
        Self {
            entities,
            replays: 0,
        }
    }
}

impl EntityFeed for VecFeed {
    fn describe(&self) -> String {
        format!("{} in-memory entities", self.entities.len())
    }

    fn size_bytes(&self) -> Option<u64> {
        Some(self.entities.len() as u64 * 64)
    }

    fn replay(
        &mut self,
        tiers: TierMask,
        visit: &mut dyn FnMut(Entity) -> Result<()>,
    ) -> Result<u64> {
        self.replays += 1;
        let mut count = 0;
        for entity in self.entities.iter().filter(|e| tiers.contains(e.tier())) {
            visit(entity.clone())?;
            count += 1;
        }
        Ok(count)
    }
}

pub fn tags(pairs: &[(&str, &str)]) -> TagMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn point(id: i64, lon: f64, lat: f64, tag_pairs: &[(&str, &str)]) -> Entity {
    Entity::Point(Point {
        id,
        tags: tags(tag_pairs),
        lon,
        lat,
    })
}

pub fn chain(id: i64, refs: &[i64], tag_pairs: &[(&str, &str)]) -> Entity {
    Entity::Chain(Chain {
        id,
        tags: tags(tag_pairs),
        refs: refs.to_vec(),
    })
}

pub fn group(id: i64, members: &[(Tier, i64, &str)], tag_pairs: &[(&str, &str)]) -> Entity {
    Entity::Group(Group {
        id,
        tags: tags(tag_pairs),
        members: members
            .iter()
            .map(|(tier, id, role)| Member {
                id: *id,
                tier: *tier,
                role: role.to_string(),
            })
            .collect(),
    })
}
