//! Resource transition barriers.
//!
//! A barrier marks a resource's transition between usage states inside a
//! command stream. Barriers are collected into a [`Barriers`] set before
//! they take effect, so redundant transitions can be skipped and the
//! remaining ones forwarded to the backend in one call.

use std::sync::Arc;

use super::ResourceState;

/// Kind of resource barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierKind {
    /// Transition of a resource between two usage states.
    Transition,
}

/// A single resource barrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBarrier {
    /// Barrier kind.
    pub kind: BarrierKind,
    /// Unique id of the affected resource.
    pub resource_id: u64,
    /// Name of the affected resource (for diagnostics).
    pub resource_name: Arc<str>,
    /// State the resource is transitioning from.
    pub state_before: ResourceState,
    /// State the resource is transitioning to.
    pub state_after: ResourceState,
}

impl ResourceBarrier {
    /// Create a transition barrier.
    pub fn transition(
        resource_id: u64,
        resource_name: Arc<str>,
        state_before: ResourceState,
        state_after: ResourceState,
    ) -> Self {
        Self {
            kind: BarrierKind::Transition,
            resource_id,
            resource_name,
            state_before,
            state_after,
        }
    }
}

/// An ordered set of resource barriers collected for one backend call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Barriers {
    barriers: Vec<ResourceBarrier>,
}

impl Barriers {
    /// Create an empty barrier set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty barrier set with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            barriers: Vec::with_capacity(capacity),
        }
    }

    /// Append a barrier.
    pub fn push(&mut self, barrier: ResourceBarrier) {
        self.barriers.push(barrier);
    }

    /// Number of collected barriers.
    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    /// Check if no barriers have been collected.
    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    /// Iterate over the collected barriers.
    pub fn iter(&self) -> std::slice::Iter<'_, ResourceBarrier> {
        self.barriers.iter()
    }

    /// Clear all barriers, preserving allocated capacity.
    pub fn clear(&mut self) {
        self.barriers.clear();
    }

    /// Append all barriers from another set.
    pub fn extend_from(&mut self, other: &Barriers) {
        self.barriers.extend(other.barriers.iter().cloned());
    }
}

impl<'a> IntoIterator for &'a Barriers {
    type Item = &'a ResourceBarrier;
    type IntoIter = std::slice::Iter<'a, ResourceBarrier>;

    fn into_iter(self) -> Self::IntoIter {
        self.barriers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barriers_collect() {
        let mut barriers = Barriers::new();
        assert!(barriers.is_empty());

        barriers.push(ResourceBarrier::transition(
            1,
            Arc::from("color"),
            ResourceState::Common,
            ResourceState::RenderTarget,
        ));
        assert_eq!(barriers.len(), 1);

        let barrier = barriers.iter().next().unwrap();
        assert_eq!(barrier.kind, BarrierKind::Transition);
        assert_eq!(barrier.state_before, ResourceState::Common);
        assert_eq!(barrier.state_after, ResourceState::RenderTarget);
    }

    #[test]
    fn test_barriers_clear_preserves_capacity() {
        let mut barriers = Barriers::with_capacity(4);
        barriers.push(ResourceBarrier::transition(
            1,
            Arc::from("depth"),
            ResourceState::Common,
            ResourceState::DepthWrite,
        ));
        barriers.clear();
        assert!(barriers.is_empty());
    }
}
