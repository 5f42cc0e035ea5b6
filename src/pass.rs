//! Render passes over texture attachments.
//!
//! A [`RenderPass`] binds color, depth and stencil attachments with their
//! load/store actions. Begin and end transition attachment textures into
//! and out of their target states through the command list, emitting only
//! the barriers for textures whose tracked state actually differs.

use std::sync::Arc;

use crate::command::{CommandList, CommandListState};
use crate::error::RhiError;
use crate::resource::{Barriers, ReleasePool, ResourceState, Texture, TextureKind};
use crate::types::{ClearColor, LoadAction, StoreAction};

/// One attachment slot of a render pass.
#[derive(Debug, Clone)]
pub struct AttachmentDesc {
    /// The attached texture.
    pub texture: Arc<Texture>,
    /// Mip level to attach.
    pub level: u32,
    /// Array slice to attach.
    pub slice: u32,
    /// Depth plane for 3D textures.
    pub depth_plane: u32,
    /// What happens to attachment contents at pass begin.
    pub load_action: LoadAction,
    /// What happens to attachment contents at pass end.
    pub store_action: StoreAction,
}

impl AttachmentDesc {
    /// Attach a texture with default sub-resource selection.
    pub fn new(texture: Arc<Texture>, load_action: LoadAction, store_action: StoreAction) -> Self {
        Self {
            texture,
            level: 0,
            slice: 0,
            depth_plane: 0,
            load_action,
            store_action,
        }
    }
}

impl PartialEq for AttachmentDesc {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.texture, &other.texture)
            && self.level == other.level
            && self.slice == other.slice
            && self.depth_plane == other.depth_plane
            && self.load_action == other.load_action
            && self.store_action == other.store_action
    }
}

impl Eq for AttachmentDesc {}

/// Color attachment with its clear color.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorAttachment {
    pub desc: AttachmentDesc,
    pub clear_color: ClearColor,
}

/// Depth attachment with its clear value.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthAttachment {
    pub desc: AttachmentDesc,
    pub clear_value: f32,
}

/// Stencil attachment with its clear value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StencilAttachment {
    pub desc: AttachmentDesc,
    pub clear_value: u32,
}

bitflags::bitflags! {
    /// Shader access mask of a render pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderAccess: u32 {
        const SHADER_RESOURCES = 1 << 0;
        const SAMPLERS = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const DEPTH_STENCIL = 1 << 3;
    }
}

/// Complete render pass configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderPassSettings {
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_attachment: Option<DepthAttachment>,
    pub stencil_attachment: Option<StencilAttachment>,
    pub shader_access: ShaderAccess,
    /// Whether this is the last pass of the frame; final passes leave
    /// their color attachments in the presentable state.
    pub is_final_pass: bool,
}

impl Default for ShaderAccess {
    fn default() -> Self {
        Self::empty()
    }
}

/// A render pass over a fixed set of attachments.
#[derive(Debug)]
pub struct RenderPass {
    settings: RenderPassSettings,
    is_begun: bool,
    /// Memoized attachment texture lists, rebuilt on settings update.
    attachment_textures: Vec<Arc<Texture>>,
    color_attachment_textures: Vec<Arc<Texture>>,
    non_frame_buffer_attachment_textures: Vec<Arc<Texture>>,
    /// Reused barrier scratch set for begin/end transitions.
    transition_barriers: Barriers,
}

impl RenderPass {
    /// Create a render pass and initialize attachment states.
    pub fn new(settings: RenderPassSettings) -> Self {
        let mut pass = Self {
            settings,
            is_begun: false,
            attachment_textures: Vec::new(),
            color_attachment_textures: Vec::new(),
            non_frame_buffer_attachment_textures: Vec::new(),
            transition_barriers: Barriers::new(),
        };
        pass.rebuild_attachment_textures();
        pass.init_attachment_states();
        pass
    }

    /// Pass configuration.
    pub fn settings(&self) -> &RenderPassSettings {
        &self.settings
    }

    /// Whether the pass is currently begun.
    pub fn is_begun(&self) -> bool {
        self.is_begun
    }

    /// All attachment textures of the pass, colors first.
    pub fn attachment_textures(&self) -> &[Arc<Texture>] {
        &self.attachment_textures
    }

    /// Color attachment textures only, in attachment order.
    pub fn color_attachment_textures(&self) -> &[Arc<Texture>] {
        &self.color_attachment_textures
    }

    /// Attachment textures not owned by the swap chain (off-screen colors,
    /// depth and stencil).
    pub fn non_frame_buffer_attachment_textures(&self) -> &[Arc<Texture>] {
        &self.non_frame_buffer_attachment_textures
    }

    /// Replace the pass configuration.
    ///
    /// Returns `false` without side effects when `settings` equals the
    /// current configuration, so per-frame updates with unchanged
    /// attachments are free. On change, memoized texture lists are rebuilt
    /// and attachment states re-initialized.
    pub fn update(&mut self, settings: RenderPassSettings) -> bool {
        if self.settings == settings {
            return false;
        }
        log::trace!("Render pass settings updated");
        self.settings = settings;
        self.rebuild_attachment_textures();
        self.init_attachment_states();
        true
    }

    /// Begin the pass: transition color attachments to the render target
    /// state and the depth attachment to the depth-write state.
    pub fn begin(&mut self, command_list: &mut CommandList) -> Result<(), RhiError> {
        if self.is_begun {
            return Err(RhiError::InvalidState(
                "render pass can not begin: it was already begun".to_string(),
            ));
        }
        // Reject before touching any tracked attachment state.
        command_list.expect_state(CommandListState::Pending, "begin a render pass")?;

        let mut barriers = std::mem::take(&mut self.transition_barriers);
        barriers.clear();
        for color in &self.settings.color_attachments {
            color.desc.texture.set_state(ResourceState::RenderTarget, &mut barriers);
        }
        if let Some(depth) = &self.settings.depth_attachment {
            depth.desc.texture.set_state(ResourceState::DepthWrite, &mut barriers);
        }
        command_list.set_resource_barriers(&barriers)?;
        self.transition_barriers = barriers;

        self.is_begun = true;
        Ok(())
    }

    /// End the pass.
    ///
    /// Final passes transition their color attachments to the presentable
    /// state so the frame buffer can be handed to the swap chain.
    pub fn end(&mut self, command_list: &mut CommandList) -> Result<(), RhiError> {
        if !self.is_begun {
            return Err(RhiError::InvalidState(
                "render pass can not end: it was not begun".to_string(),
            ));
        }
        command_list.expect_state(CommandListState::Pending, "end a render pass")?;

        if self.settings.is_final_pass {
            let mut barriers = std::mem::take(&mut self.transition_barriers);
            barriers.clear();
            for color in &self.settings.color_attachments {
                color.desc.texture.set_state(ResourceState::Present, &mut barriers);
            }
            command_list.set_resource_barriers(&barriers)?;
            self.transition_barriers = barriers;
        }

        self.is_begun = false;
        Ok(())
    }

    /// Move all attachment textures to the release pool and drop the
    /// pass's references to them.
    ///
    /// Used on resize, where the old swap-chain textures must outlive any
    /// in-flight frames still rendering to them.
    pub fn release_attachment_textures(&mut self, release_pool: &mut ReleasePool) {
        for texture in self.attachment_textures.drain(..) {
            release_pool.add_texture(texture);
        }
        self.color_attachment_textures.clear();
        self.non_frame_buffer_attachment_textures.clear();
        self.settings.color_attachments.clear();
        self.settings.depth_attachment = None;
        self.settings.stencil_attachment = None;
    }

    fn rebuild_attachment_textures(&mut self) {
        self.attachment_textures.clear();
        self.color_attachment_textures.clear();
        for color in &self.settings.color_attachments {
            self.attachment_textures.push(Arc::clone(&color.desc.texture));
            self.color_attachment_textures.push(Arc::clone(&color.desc.texture));
        }
        if let Some(depth) = &self.settings.depth_attachment {
            self.attachment_textures.push(Arc::clone(&depth.desc.texture));
        }
        if let Some(stencil) = &self.settings.stencil_attachment {
            self.attachment_textures.push(Arc::clone(&stencil.desc.texture));
        }
        self.non_frame_buffer_attachment_textures = self
            .attachment_textures
            .iter()
            .filter(|texture| texture.kind() != TextureKind::FrameBuffer)
            .cloned()
            .collect();
    }

    /// Promote swap-chain color attachments from their initial common
    /// state to presentable, matching the state the swap chain hands
    /// buffers over in. Off-screen render targets keep their state.
    fn init_attachment_states(&self) {
        for color in &self.settings.color_attachments {
            let texture = &color.desc.texture;
            if texture.kind() == TextureKind::FrameBuffer
                && texture.state() == ResourceState::Common
            {
                texture.resource().set_state_untracked(ResourceState::Present);
            }
        }
    }
}
