//! Texture objects with tracked resource state.

use std::sync::Arc;

use crate::types::FrameSize;

use super::{Barriers, Resource, ResourceState};

/// Kind of texture, determining its role in the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// Swap-chain frame buffer image, presented to the display.
    FrameBuffer,
    /// Off-screen color render target.
    RenderTarget,
    /// Depth-stencil target.
    DepthStencil,
}

/// An owned texture wrapping a state-tracked [`Resource`].
///
/// Textures are shared via `Arc`: render pass attachments hold non-owning
/// references to the same texture the creating frame or caller owns.
#[derive(Debug)]
pub struct Texture {
    resource: Resource,
    kind: TextureKind,
    size: FrameSize,
}

impl Texture {
    /// Create a swap-chain frame buffer texture for the given buffer slot.
    pub fn frame_buffer(frame_buffer_index: u32, size: FrameSize) -> Arc<Self> {
        Arc::new(Self {
            resource: Resource::new(
                &format!("Frame Buffer {frame_buffer_index}"),
                ResourceState::Common,
            ),
            kind: TextureKind::FrameBuffer,
            size,
        })
    }

    /// Create an off-screen color render target texture.
    pub fn render_target(name: &str, size: FrameSize) -> Arc<Self> {
        Arc::new(Self {
            resource: Resource::new(name, ResourceState::Common),
            kind: TextureKind::RenderTarget,
            size,
        })
    }

    /// Create a depth-stencil texture.
    pub fn depth_stencil(size: FrameSize) -> Arc<Self> {
        Arc::new(Self {
            resource: Resource::new("Depth Texture", ResourceState::Common),
            kind: TextureKind::DepthStencil,
            size,
        })
    }

    /// The texture kind.
    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    /// Texture dimensions.
    pub fn size(&self) -> FrameSize {
        self.size
    }

    /// The underlying state-tracked resource.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Current usage state of the underlying resource.
    pub fn state(&self) -> ResourceState {
        self.resource.state()
    }

    /// Transition the underlying resource, collecting a barrier on change.
    ///
    /// See [`Resource::set_state`].
    pub fn set_state(&self, new_state: ResourceState, barriers: &mut Barriers) -> bool {
        self.resource.set_state(new_state, barriers)
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_kinds() {
        let size = FrameSize::new(640, 480);
        assert_eq!(Texture::frame_buffer(0, size).kind(), TextureKind::FrameBuffer);
        assert_eq!(
            Texture::render_target("offscreen", size).kind(),
            TextureKind::RenderTarget
        );
        assert_eq!(Texture::depth_stencil(size).kind(), TextureKind::DepthStencil);
    }

    #[test]
    fn test_texture_initial_state_is_common() {
        let texture = Texture::frame_buffer(1, FrameSize::new(8, 8));
        assert_eq!(texture.state(), ResourceState::Common);
        assert_eq!(texture.resource().name(), "Frame Buffer 1");
    }

    #[test]
    fn test_texture_state_transition() {
        let texture = Texture::depth_stencil(FrameSize::new(8, 8));
        let mut barriers = Barriers::new();
        assert!(texture.set_state(ResourceState::DepthWrite, &mut barriers));
        assert_eq!(barriers.len(), 1);
        assert_eq!(texture.state(), ResourceState::DepthWrite);
    }
}
