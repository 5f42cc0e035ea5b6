//! GPU resources and per-resource state tracking.
//!
//! Every GPU-visible object (buffer, texture) carries a [`ResourceState`].
//! State is mutated only through [`Resource::set_state`], which appends a
//! transition barrier to the provided set iff the state actually changes.
//! This keeps command lists free of redundant barriers, which affects
//! measurable command-list size and not just correctness.

pub mod barrier;
pub mod release_pool;
pub mod texture;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

pub use barrier::{BarrierKind, Barriers, ResourceBarrier};
pub use release_pool::ReleasePool;
pub use texture::{Texture, TextureKind};

/// Usage state of a GPU resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Initial state, usable by copy queues.
    #[default]
    Common,
    /// Bound as vertex or constant buffer.
    VertexAndConstantBuffer,
    /// Bound as index buffer.
    IndexBuffer,
    /// Bound as color render target.
    RenderTarget,
    /// Bound as writable depth-stencil target.
    DepthWrite,
    /// Bound as read-only depth-stencil.
    DepthRead,
    /// Read in a shader stage.
    ShaderResource,
    /// Destination of a copy operation.
    CopyDest,
    /// Source of a copy operation.
    CopySource,
    /// Ready for swap-chain presentation.
    Present,
}

impl ResourceState {
    /// Human-readable state name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Common => "Common",
            Self::VertexAndConstantBuffer => "VertexAndConstantBuffer",
            Self::IndexBuffer => "IndexBuffer",
            Self::RenderTarget => "RenderTarget",
            Self::DepthWrite => "DepthWrite",
            Self::DepthRead => "DepthRead",
            Self::ShaderResource => "ShaderResource",
            Self::CopyDest => "CopyDest",
            Self::CopySource => "CopySource",
            Self::Present => "Present",
        }
    }
}

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// An owned GPU-visible object with a tracked usage state.
///
/// Resources are shared via `Arc` between their owning object (buffer or
/// texture) and non-owning users such as render pass attachments.
#[derive(Debug)]
pub struct Resource {
    id: u64,
    name: Arc<str>,
    state: Mutex<ResourceState>,
}

impl Resource {
    /// Create a new resource in the given initial state.
    pub fn new(name: &str, initial_state: ResourceState) -> Self {
        Self {
            id: NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name),
            state: Mutex::new(initial_state),
        }
    }

    /// Unique id of this resource.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Resource name (for diagnostics).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current usage state.
    pub fn state(&self) -> ResourceState {
        *self.state.lock()
    }

    /// Transition the resource to a new state.
    ///
    /// If the state actually changes, a transition barrier is appended to
    /// `barriers` and `true` is returned. A transition to the current state
    /// is a no-op returning `false` with no barrier appended.
    pub fn set_state(&self, new_state: ResourceState, barriers: &mut Barriers) -> bool {
        let mut state = self.state.lock();
        if *state == new_state {
            return false;
        }

        log::trace!(
            "Resource '{}' state transition {} -> {}",
            self.name,
            state.name(),
            new_state.name()
        );

        barriers.push(ResourceBarrier::transition(
            self.id,
            Arc::clone(&self.name),
            *state,
            new_state,
        ));
        *state = new_state;
        true
    }

    /// Set the state without collecting a barrier.
    ///
    /// Used for state promotions that happen outside a command stream,
    /// e.g. marking freshly created frame buffers as presentable.
    pub(crate) fn set_state_untracked(&self, new_state: ResourceState) {
        *self.state.lock() = new_state;
    }
}

static_assertions::assert_impl_all!(Resource: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_ids_unique() {
        let a = Resource::new("a", ResourceState::Common);
        let b = Resource::new("b", ResourceState::Common);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_set_state_appends_barrier_on_change() {
        let resource = Resource::new("target", ResourceState::Common);
        let mut barriers = Barriers::new();

        assert!(resource.set_state(ResourceState::RenderTarget, &mut barriers));
        assert_eq!(resource.state(), ResourceState::RenderTarget);
        assert_eq!(barriers.len(), 1);

        let barrier = barriers.iter().next().unwrap();
        assert_eq!(barrier.state_before, ResourceState::Common);
        assert_eq!(barrier.state_after, ResourceState::RenderTarget);
    }

    #[test]
    fn test_set_state_noop_when_unchanged() {
        let resource = Resource::new("target", ResourceState::RenderTarget);
        let mut barriers = Barriers::new();

        assert!(!resource.set_state(ResourceState::RenderTarget, &mut barriers));
        assert!(barriers.is_empty());
    }

    #[test]
    fn test_set_state_untracked() {
        let resource = Resource::new("frame buffer", ResourceState::Common);
        resource.set_state_untracked(ResourceState::Present);
        assert_eq!(resource.state(), ResourceState::Present);
    }
}
