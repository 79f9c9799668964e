//! Member selection strategies.

use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::StrategyKind;
use crate::load_balancer::backend::Backend;

/// Orders the members of a group for one dispatch. Members left out of the
/// returned sequence are not tried.
pub trait SelectionStrategy: Send + Sync + Debug {
    fn select_order(&self, members: &[Arc<Backend>]) -> Vec<Arc<Backend>>;
}

/// Configuration order.
#[derive(Debug, Default)]
pub struct PriorityOrder;

impl SelectionStrategy for PriorityOrder {
    fn select_order(&self, members: &[Arc<Backend>]) -> Vec<Arc<Backend>> {
        members.to_vec()
    }
}

/// Rotates the first member per dispatch; the rest follow in ring order.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl SelectionStrategy for RoundRobin {
    fn select_order(&self, members: &[Arc<Backend>]) -> Vec<Arc<Backend>> {
        if members.is_empty() {
            return Vec::new();
        }
        let start = self.counter.fetch_add(1, Ordering::Relaxed) % members.len();
        members[start..].iter().chain(&members[..start]).cloned().collect()
    }
}

/// Healthy members in configuration order. Falls back to every member when
/// none is healthy.
#[derive(Debug, Default)]
pub struct HealthAware;

impl SelectionStrategy for HealthAware {
    fn select_order(&self, members: &[Arc<Backend>]) -> Vec<Arc<Backend>> {
        let healthy: Vec<_> = members.iter().filter(|b| b.is_healthy()).cloned().collect();
        if healthy.is_empty() {
            members.to_vec()
        } else {
            healthy
        }
    }
}

pub fn strategy_for(kind: StrategyKind) -> Box<dyn SelectionStrategy> {
    match kind {
        StrategyKind::Priority => Box::new(PriorityOrder),
        StrategyKind::RoundRobin => Box::new(RoundRobin::default()),
        StrategyKind::HealthAware => Box::new(HealthAware),
    }
}
