use std::collections::{HashMap, VecDeque};

use crate::model::{Group, Tier};

/// A group held back because a member group had no geometry yet.
#[derive(Debug, Clone)]
pub struct DeferredGroup {
    pub group: Group,
    /// Whether the group passed the filter when it was scanned.
    pub matched: bool,
}

/// Groups waiting for their single retry after the full resolution pass.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    entries: VecDeque<DeferredGroup>,
    total: u64,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, group: Group, matched: bool) {
        self.total += 1;
        self.entries.push_back(DeferredGroup { group, matched });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Groups ever deferred, including those already drained.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Hand out every entry exactly once. A queued group comes after the
    /// queued groups among its members; otherwise deferral order holds.
    /// A reference cycle is cut where it is first re-entered.
    pub fn drain(&mut self) -> impl Iterator<Item = DeferredGroup> + use<> {
        let entries: Vec<DeferredGroup> = self.entries.drain(..).collect();
        let order = dependency_order(&entries);
        let mut slots: Vec<Option<DeferredGroup>> = entries.into_iter().map(Some).collect();
        order.into_iter().filter_map(move |at| slots[at].take())
    }
}

/// Post-order walk over queued member groups, rooted in deferral order.
fn dependency_order(entries: &[DeferredGroup]) -> Vec<usize> {
    let position: HashMap<i64, usize> = entries
        .iter()
        .enumerate()
        .map(|(at, deferred)| (deferred.group.id, at))
        .collect();
    let mut visited = vec![false; entries.len()];
    let mut order = Vec::with_capacity(entries.len());

    for root in 0..entries.len() {
        if visited[root] {
            continue;
        }
        visited[root] = true;
        let mut stack = vec![(root, 0usize)];
        while let Some((current, next)) = stack.pop() {
            let Some(member) = entries[current].group.members.get(next) else {
                order.push(current);
                continue;
            };
            stack.push((current, next + 1));
            if member.tier == Tier::Group
                && let Some(&dependency) = position.get(&member.id)
                && !visited[dependency]
            {
                visited[dependency] = true;
                stack.push((dependency, 0));
            }
        }
    }
    order
}
