//! Two-tier block storage with capacity eviction and budget filtering.
//!
//! The store owns the short-term and long-term collections of one
//! session. It never looks at the clock or the audit log; the session
//! creates blocks and decides where they go.
//!
//! Collections are kept in write order, which after eviction is not
//! chronological. Every read sorts by `(timestamp, id)`.

use std::collections::HashSet;

use careclaw_core::block::{Actor, MemoryBlock};
use careclaw_core::role::RolePolicy;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    short_term: Vec<MemoryBlock>,
    long_term: Vec<MemoryBlock>,
}

/// Blocks selected by [`MemoryStore::filter_relevant`] and their total cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub blocks: Vec<MemoryBlock>,
    pub total_cost: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from exported collections, preserving their order.
    pub fn from_parts(short_term: Vec<MemoryBlock>, long_term: Vec<MemoryBlock>) -> Self {
        Self {
            short_term,
            long_term,
        }
    }

    /// Add a block to short-term memory, and to long-term memory too when
    /// `to_long_term` is set, then evict both down to their capacities.
    pub fn insert(&mut self, block: MemoryBlock, to_long_term: bool, policy: &RolePolicy) {
        if to_long_term {
            self.long_term.push(block.clone());
        }
        self.short_term.push(block);

        evict(&mut self.short_term, policy.short_term_capacity);
        if policy.use_long_term_memory {
            evict(&mut self.long_term, policy.long_term_capacity);
        }
    }

    /// Short-term blocks in chronological order.
    pub fn short_term(&self) -> Vec<MemoryBlock> {
        chronological(&self.short_term)
    }

    /// Long-term blocks in chronological order.
    pub fn long_term(&self) -> Vec<MemoryBlock> {
        chronological(&self.long_term)
    }

    /// Collections exactly as stored, for export.
    pub fn raw_parts(&self) -> (&[MemoryBlock], &[MemoryBlock]) {
        (&self.short_term, &self.long_term)
    }

    pub fn long_term_len(&self) -> usize {
        self.long_term.len()
    }

    /// Pick the blocks worth passing downstream under `max_budget`.
    ///
    /// Short-term blocks are walked newest first; a block is taken when
    /// its priority reaches the role threshold and it fits the remaining
    /// budget. High-priority blocks are always taken, even over budget.
    /// If budget remains and the role uses long-term memory, long-term
    /// blocks not already selected are walked the same way, restricted
    /// to professional or high-priority blocks. The result is returned
    /// oldest first.
    pub fn filter_relevant(&self, policy: &RolePolicy, max_budget: u32) -> Selection {
        let threshold = policy.priority_threshold.rank();
        let budget = u64::from(max_budget);
        let mut total: u64 = 0;
        let mut selected: Vec<MemoryBlock> = Vec::new();

        let take = |block: &MemoryBlock, total: &mut u64, selected: &mut Vec<MemoryBlock>| {
            if block.priority.rank() < threshold {
                return;
            }
            let cost = u64::from(block.estimated_cost);
            if *total + cost <= budget || block.is_high() {
                *total += cost;
                selected.push(block.clone());
            }
        };

        for block in newest_first(&self.short_term) {
            take(block, &mut total, &mut selected);
        }

        if policy.use_long_term_memory && total < budget {
            let seen: HashSet<u64> = selected.iter().map(|b| b.id).collect();
            for block in newest_first(&self.long_term) {
                if seen.contains(&block.id) {
                    continue;
                }
                if block.actor != Actor::Professional && !block.is_high() {
                    continue;
                }
                take(block, &mut total, &mut selected);
            }
        }

        selected.sort_by_key(MemoryBlock::recency_key);
        Selection {
            blocks: selected,
            total_cost: total,
        }
    }
}

/// Shrink `blocks` to at most `capacity` entries.
///
/// All high-priority blocks survive, followed by the most recent of the
/// rest. When high-priority blocks alone exceed the capacity only the
/// most recent `capacity` of them survive.
pub fn evict(blocks: &mut Vec<MemoryBlock>, capacity: usize) {
    if blocks.len() <= capacity {
        return;
    }

    let (mut high, mut rest): (Vec<MemoryBlock>, Vec<MemoryBlock>) =
        std::mem::take(blocks).into_iter().partition(MemoryBlock::is_high);

    if high.len() >= capacity {
        high.sort_by_key(|b| std::cmp::Reverse(b.recency_key()));
        high.truncate(capacity);
        *blocks = high;
        return;
    }

    rest.sort_by_key(|b| std::cmp::Reverse(b.recency_key()));
    rest.truncate(capacity - high.len());
    high.extend(rest);
    *blocks = high;
}

fn newest_first(blocks: &[MemoryBlock]) -> Vec<&MemoryBlock> {
    let mut refs: Vec<&MemoryBlock> = blocks.iter().collect();
    refs.sort_by_key(|b| std::cmp::Reverse(b.recency_key()));
    refs
}

fn chronological(blocks: &[MemoryBlock]) -> Vec<MemoryBlock> {
    let mut sorted = blocks.to_vec();
    sorted.sort_by_key(MemoryBlock::recency_key);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use careclaw_core::Priority;
    use careclaw_core::role::Role;
    use chrono::{Duration, TimeZone, Utc};

    fn block(id: u64, actor: Actor, priority: Priority, cost: u32) -> MemoryBlock {
        MemoryBlock {
            id,
            timestamp: Utc.with_ymd_and_hms(2025, 5, 8, 9, 0, 0).unwrap()
                + Duration::seconds(id as i64),
            actor,
            priority,
            text: format!("bloque {id}"),
            estimated_cost: cost,
            visit_id: "V1".into(),
        }
    }

    fn ids(blocks: &[MemoryBlock]) -> Vec<u64> {
        blocks.iter().map(|b| b.id).collect()
    }

    #[test]
    fn evict_is_noop_under_capacity() {
        let mut blocks = vec![block(1, Actor::Patient, Priority::Low, 1)];
        evict(&mut blocks, 3);
        assert_eq!(ids(&blocks), vec![1]);
    }

    #[test]
    fn evict_keeps_high_and_most_recent_rest() {
        let mut blocks = vec![
            block(1, Actor::Patient, Priority::High, 1),
            block(2, Actor::Patient, Priority::Low, 1),
            block(3, Actor::Patient, Priority::Medium, 1),
            block(4, Actor::Patient, Priority::Low, 1),
        ];
        evict(&mut blocks, 3);
        // high first, then rest newest-first
        assert_eq!(ids(&blocks), vec![1, 4, 3]);
    }

    #[test]
    fn evict_with_too_many_high_keeps_most_recent_high() {
        let mut blocks = vec![
            block(1, Actor::Patient, Priority::High, 1),
            block(2, Actor::Patient, Priority::High, 1),
            block(3, Actor::Patient, Priority::Low, 1),
            block(4, Actor::Patient, Priority::High, 1),
        ];
        evict(&mut blocks, 2);
        assert_eq!(ids(&blocks), vec![4, 2]);
    }

    #[test]
    fn evict_with_high_equal_to_capacity_drops_rest() {
        let mut blocks = vec![
            block(1, Actor::Patient, Priority::High, 1),
            block(2, Actor::Patient, Priority::Low, 1),
            block(3, Actor::Patient, Priority::High, 1),
        ];
        evict(&mut blocks, 2);
        let mut kept = ids(&blocks);
        kept.sort();
        assert_eq!(kept, vec![1, 3]);
    }

    #[test]
    fn reads_are_chronological_after_eviction() {
        let policy = Role::Patient.policy();
        let mut store = MemoryStore::new();
        for id in 1..=12 {
            let priority = if id % 5 == 0 { Priority::High } else { Priority::Low };
            store.insert(block(id, Actor::Patient, priority, 1), false, &policy);
        }
        let short = store.short_term();
        assert_eq!(short.len(), policy.short_term_capacity);
        assert!(short.windows(2).all(|w| w[0].recency_key() < w[1].recency_key()));
        assert!(short.iter().any(|b| b.id == 5));
        assert!(short.iter().any(|b| b.id == 10));
    }

    #[test]
    fn long_term_evicted_to_role_capacity() {
        for role in [Role::HealthProfessional, Role::AdminStaff] {
            let policy = role.policy();
            let capacity = policy.long_term_capacity;
            let mut store = MemoryStore::new();
            for id in 1..=(capacity as u64 + 20) {
                store.insert(block(id, Actor::Professional, Priority::Low, 1), true, &policy);
                assert!(store.long_term_len() <= capacity);
            }
            assert_eq!(store.long_term_len(), capacity);
            assert_eq!(store.long_term().first().map(|b| b.id), Some(21));
        }
    }

    #[test]
    fn filter_respects_threshold_and_budget() {
        let policy = Role::Patient.policy();
        let mut store = MemoryStore::new();
        store.insert(block(1, Actor::Patient, Priority::Medium, 10), false, &policy);
        store.insert(block(2, Actor::Patient, Priority::Low, 1), false, &policy);
        store.insert(block(3, Actor::Patient, Priority::Medium, 10), false, &policy);

        let selection = store.filter_relevant(&policy, 15);
        // newest medium fits, older medium does not, low is under threshold
        assert_eq!(ids(&selection.blocks), vec![3]);
        assert_eq!(selection.total_cost, 10);
    }

    #[test]
    fn filter_force_includes_high_over_budget() {
        let policy = Role::HealthProfessional.policy();
        let mut store = MemoryStore::new();
        store.insert(block(1, Actor::Patient, Priority::High, 50), false, &policy);
        store.insert(block(2, Actor::Patient, Priority::Low, 5), false, &policy);

        let selection = store.filter_relevant(&policy, 10);
        assert_eq!(ids(&selection.blocks), vec![1, 2]);
        assert_eq!(selection.total_cost, 55);
    }

    #[test]
    fn filter_adds_long_term_professional_blocks() {
        let policy = Role::HealthProfessional.policy();
        let mut store = MemoryStore::new();
        for id in 1..=25 {
            let actor = if id == 1 { Actor::Professional } else { Actor::Patient };
            store.insert(block(id, actor, Priority::Low, 1), true, &policy);
        }
        // block 1 was evicted from short-term but survives in long-term
        assert!(store.short_term().iter().all(|b| b.id != 1));
        assert_eq!(store.long_term_len(), 25);

        let selection = store.filter_relevant(&policy, 100);
        assert!(selection.blocks.iter().any(|b| b.id == 1));
        // patient-authored low blocks from long-term are not added
        assert_eq!(selection.blocks.len(), 21);
        assert_eq!(selection.blocks[0].id, 1);
    }

    #[test]
    fn long_term_skipped_when_budget_exhausted() {
        let policy = Role::HealthProfessional.policy();
        let mut store = MemoryStore::new();
        store.insert(block(1, Actor::Professional, Priority::Low, 10), true, &policy);
        for id in 2..=21 {
            store.insert(block(id, Actor::Patient, Priority::Low, 1), false, &policy);
        }
        let selection = store.filter_relevant(&policy, 20);
        assert!(selection.blocks.iter().all(|b| b.id != 1));
        assert_eq!(selection.total_cost, 20);
    }
}
