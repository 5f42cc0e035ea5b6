//! Render context and the buffered frame loop.
//!
//! The [`RenderContext`] owns the swap chain abstraction: N buffered
//! [`Frame`]s, each with its own frame buffer texture, final render pass,
//! command list and frame fence. Rendering cycles through the frames in
//! swap-chain order while a monotonic frame index counts presented frames
//! for diagnostics and animation timing.

use std::sync::Arc;

use crate::backend::RenderBackend;
use crate::command::{CommandList, CommandQueue};
use crate::error::RhiError;
use crate::fence::Fence;
use crate::manager::{ResourceManager, ResourceManagerSettings};
use crate::pass::{
    AttachmentDesc, ColorAttachment, DepthAttachment, RenderPass, RenderPassSettings,
    ShaderAccess,
};
use crate::resource::Texture;
use crate::types::{ClearColor, FrameSize, LoadAction, StoreAction};

/// What to wait for in [`RenderContext::wait_for_gpu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitFor {
    /// All submitted GPU work has finished. Used at teardown and before
    /// swap-chain reconfiguration.
    RenderComplete,
    /// The current frame's previous use has been presented and its
    /// command list is free for re-recording.
    FramePresented,
}

/// Render context configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderContextSettings {
    /// Frame buffer dimensions.
    pub frame_size: FrameSize,
    /// Number of buffered frames in flight.
    pub frame_buffers_count: u32,
    /// Whether presentation is synchronized to the display refresh.
    pub vsync_enabled: bool,
    /// Whether the context presents full screen.
    pub is_full_screen: bool,
    /// Clear color of the final render pass.
    pub clear_color: ClearColor,
    /// Clear depth of the final render pass.
    pub clear_depth: f32,
}

impl Default for RenderContextSettings {
    fn default() -> Self {
        Self {
            frame_size: FrameSize::new(1280, 720),
            frame_buffers_count: 3,
            vsync_enabled: true,
            is_full_screen: false,
            clear_color: ClearColor::new(0.0, 0.0, 0.0, 1.0),
            clear_depth: 1.0,
        }
    }
}

/// One buffered frame: frame buffer texture, final pass, command list and
/// the fence tracking its GPU completion.
#[derive(Debug)]
pub struct Frame {
    /// Fixed swap-chain slot of this frame.
    pub frame_buffer_index: u32,
    /// Swap-chain color texture of this slot.
    pub color_texture: Arc<Texture>,
    /// Final render pass targeting the frame buffer.
    pub render_pass: RenderPass,
    /// Command list recording this frame's work.
    pub command_list: CommandList,
    /// Signaled when the GPU finishes this frame's command list.
    pub fence: Fence,
}

impl Frame {
    fn new(
        frame_buffer_index: u32,
        settings: &RenderContextSettings,
        depth_texture: &Arc<Texture>,
        command_queue: &CommandQueue,
        backend: &Arc<dyn RenderBackend>,
    ) -> Self {
        let color_texture = Texture::frame_buffer(frame_buffer_index, settings.frame_size);
        let render_pass = RenderPass::new(Self::pass_settings(
            &color_texture,
            depth_texture,
            settings,
        ));
        Self {
            frame_buffer_index,
            color_texture,
            render_pass,
            command_list: command_queue
                .make_command_list(&format!("Frame {frame_buffer_index} Rendering")),
            // Created signaled so the first wait on a fresh frame returns
            // immediately.
            fence: backend.create_fence(&format!("Frame {frame_buffer_index} Fence"), true),
        }
    }

    fn pass_settings(
        color_texture: &Arc<Texture>,
        depth_texture: &Arc<Texture>,
        settings: &RenderContextSettings,
    ) -> RenderPassSettings {
        RenderPassSettings {
            color_attachments: vec![ColorAttachment {
                desc: AttachmentDesc::new(
                    Arc::clone(color_texture),
                    LoadAction::Clear,
                    StoreAction::Store,
                ),
                clear_color: settings.clear_color,
            }],
            depth_attachment: Some(DepthAttachment {
                desc: AttachmentDesc::new(
                    Arc::clone(depth_texture),
                    LoadAction::Clear,
                    StoreAction::DontCare,
                ),
                clear_value: settings.clear_depth,
            }),
            stencil_attachment: None,
            shader_access: ShaderAccess::SHADER_RESOURCES,
            is_final_pass: true,
        }
    }
}

/// The top-level rendering object: swap chain, frames and resources.
pub struct RenderContext {
    backend: Arc<dyn RenderBackend>,
    settings: RenderContextSettings,
    resource_manager: ResourceManager,
    command_queue: CommandQueue,
    frames: Vec<Frame>,
    depth_texture: Arc<Texture>,
    /// Monotonic count of presented frames.
    frame_index: u32,
    /// Cyclic index of the swap-chain buffer backing the current frame.
    frame_buffer_index: u32,
    /// Whether the current frame buffer is acquired for rendering.
    frame_buffer_in_use: bool,
    /// Queue flush fence for full render-complete waits.
    render_fence: Fence,
}

impl RenderContext {
    /// Create a render context over a backend.
    pub fn new(
        backend: Arc<dyn RenderBackend>,
        settings: RenderContextSettings,
    ) -> Result<Self, RhiError> {
        Self::with_resource_manager_settings(backend, settings, ResourceManagerSettings::default())
    }

    /// Create a render context with explicit resource manager settings.
    pub fn with_resource_manager_settings(
        backend: Arc<dyn RenderBackend>,
        settings: RenderContextSettings,
        manager_settings: ResourceManagerSettings,
    ) -> Result<Self, RhiError> {
        if settings.frame_buffers_count == 0 {
            return Err(RhiError::InvalidArgument(
                "frame buffers count must be at least 1".to_string(),
            ));
        }
        log::info!(
            "Creating render context on '{}' backend: {} frame buffers of {}",
            backend.name(),
            settings.frame_buffers_count,
            settings.frame_size
        );

        backend.set_frame_buffers_count(settings.frame_buffers_count)?;
        backend.set_vsync_enabled(settings.vsync_enabled)?;
        backend.set_full_screen(settings.is_full_screen)?;

        let mut resource_manager = ResourceManager::new(Arc::clone(&backend));
        resource_manager.initialize(manager_settings)?;

        let command_queue = CommandQueue::new("Render Queue", Arc::clone(&backend));
        let depth_texture = Texture::depth_stencil(settings.frame_size);
        let frames = (0..settings.frame_buffers_count)
            .map(|index| Frame::new(index, &settings, &depth_texture, &command_queue, &backend))
            .collect();

        let frame_buffer_index = backend.next_frame_buffer_index();
        command_queue.set_frame_buffer_index(frame_buffer_index);
        let render_fence = backend.create_fence("Render Fence", false);

        Ok(Self {
            backend,
            settings,
            resource_manager,
            command_queue,
            frames,
            depth_texture,
            frame_index: 0,
            frame_buffer_index,
            frame_buffer_in_use: true,
            render_fence,
        })
    }

    /// Finish deferred resource initialization.
    ///
    /// Call after all startup resources and program bindings are created;
    /// see [`ResourceManager::complete_initialization`].
    pub fn complete_initialization(&self) -> Result<(), RhiError> {
        self.resource_manager.complete_initialization()
    }

    /// Context configuration.
    pub fn settings(&self) -> &RenderContextSettings {
        &self.settings
    }

    /// The resource manager.
    pub fn resource_manager(&self) -> &ResourceManager {
        &self.resource_manager
    }

    /// Mutable resource manager access, for creating additional heaps.
    pub fn resource_manager_mut(&mut self) -> &mut ResourceManager {
        &mut self.resource_manager
    }

    /// The render command queue.
    pub fn command_queue(&self) -> &CommandQueue {
        &self.command_queue
    }

    /// Depth texture shared by all frame render passes.
    pub fn depth_texture(&self) -> &Arc<Texture> {
        &self.depth_texture
    }

    /// Monotonic count of presented frames.
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    /// Swap-chain slot backing the current frame.
    pub fn frame_buffer_index(&self) -> u32 {
        self.frame_buffer_index
    }

    /// Whether the current frame buffer is acquired for rendering.
    ///
    /// Set on a frame-presented wait and cleared by [`present`](Self::present).
    pub fn is_frame_buffer_in_use(&self) -> bool {
        self.frame_buffer_in_use
    }

    /// The current frame.
    pub fn frame(&self) -> &Frame {
        &self.frames[self.frame_buffer_index as usize]
    }

    /// Mutable access to the current frame for recording.
    pub fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.frame_buffer_index as usize]
    }

    /// All buffered frames.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Submit the current frame's committed command list for execution.
    ///
    /// The list must have been committed for the current frame buffer.
    pub fn execute_committed(&mut self) -> Result<(), RhiError> {
        let frame_buffer_index = self.frame_buffer_index;
        let frame = &mut self.frames[frame_buffer_index as usize];
        if !frame.command_list.is_committed(frame_buffer_index) {
            return Err(RhiError::InvalidState(format!(
                "command list '{}' is not committed for frame buffer {}",
                frame.command_list.name(),
                frame_buffer_index
            )));
        }
        frame.fence.reset();
        self.command_queue
            .execute(&mut frame.command_list, frame_buffer_index, &frame.fence)
    }

    /// Present the current frame and advance to the next one.
    ///
    /// The monotonic frame index always increments; the frame buffer index
    /// moves to whatever swap-chain slot the backend reports next.
    pub fn present(&mut self) -> Result<(), RhiError> {
        log::trace!(
            "Presenting frame {} from frame buffer {}",
            self.frame_index,
            self.frame_buffer_index
        );
        self.backend.present(self.frame_buffer_index)?;
        self.frame_buffer_in_use = false;

        self.frame_index = self.frame_index.wrapping_add(1);
        self.frame_buffer_index = self.backend.next_frame_buffer_index();
        self.command_queue.set_frame_buffer_index(self.frame_buffer_index);
        Ok(())
    }

    /// Block until the requested level of GPU completion.
    pub fn wait_for_gpu(&mut self, wait_for: WaitFor) -> Result<(), RhiError> {
        match wait_for {
            WaitFor::FramePresented => {
                let frame = &mut self.frames[self.frame_buffer_index as usize];
                frame.fence.wait();
                if frame.command_list.is_executing_on_any_frame() {
                    let frame_index = frame.command_list.committed_frame_index();
                    frame.command_list.complete(frame_index)?;
                }
                self.frame_buffer_in_use = true;
            }
            WaitFor::RenderComplete => {
                log::debug!("Waiting for all rendering to complete");
                self.render_fence.reset();
                self.backend.flush(&self.render_fence)?;
                self.render_fence.wait();
                for frame in &mut self.frames {
                    if frame.command_list.is_executing_on_any_frame() {
                        frame.fence.wait();
                        let frame_index = frame.command_list.committed_frame_index();
                        frame.command_list.complete(frame_index)?;
                    }
                }
                // GPU is idle, pooled resources are safe to destroy.
                self.resource_manager.release_pool().lock().release_resources();
            }
        }
        Ok(())
    }

    /// Resize the frame buffers and depth texture.
    ///
    /// A no-op when the size is unchanged. Old attachment textures are
    /// moved to the release pool rather than dropped, since the swap chain
    /// may still scan them out. The monotonic frame index is preserved.
    pub fn resize(&mut self, frame_size: FrameSize) -> Result<(), RhiError> {
        if frame_size == self.settings.frame_size {
            return Ok(());
        }
        log::info!(
            "Resizing render context from {} to {}",
            self.settings.frame_size,
            frame_size
        );
        self.wait_for_gpu(WaitFor::RenderComplete)?;

        {
            let mut release_pool = self.resource_manager.release_pool().lock();
            for frame in &mut self.frames {
                frame.render_pass.release_attachment_textures(&mut release_pool);
            }
        }

        self.settings.frame_size = frame_size;
        self.depth_texture = Texture::depth_stencil(frame_size);
        for frame in &mut self.frames {
            frame.color_texture = Texture::frame_buffer(frame.frame_buffer_index, frame_size);
            frame.render_pass.update(Frame::pass_settings(
                &frame.color_texture,
                &self.depth_texture,
                &self.settings,
            ));
        }
        Ok(())
    }

    /// Change the number of buffered frames.
    ///
    /// Returns `false` when the count is unchanged. Frames are rebuilt
    /// from scratch against the reconfigured swap chain.
    pub fn set_frame_buffers_count(&mut self, count: u32) -> Result<bool, RhiError> {
        if count == 0 {
            return Err(RhiError::InvalidArgument(
                "frame buffers count must be at least 1".to_string(),
            ));
        }
        if count == self.settings.frame_buffers_count {
            return Ok(false);
        }
        log::info!(
            "Changing frame buffers count from {} to {count}",
            self.settings.frame_buffers_count
        );
        self.wait_for_gpu(WaitFor::RenderComplete)?;

        {
            let mut release_pool = self.resource_manager.release_pool().lock();
            for frame in &mut self.frames {
                frame.render_pass.release_attachment_textures(&mut release_pool);
            }
        }

        self.backend.set_frame_buffers_count(count)?;
        self.settings.frame_buffers_count = count;
        self.frames = (0..count)
            .map(|index| {
                Frame::new(
                    index,
                    &self.settings,
                    &self.depth_texture,
                    &self.command_queue,
                    &self.backend,
                )
            })
            .collect();
        self.frame_buffer_index = self.backend.next_frame_buffer_index();
        self.command_queue.set_frame_buffer_index(self.frame_buffer_index);
        Ok(true)
    }

    /// Enable or disable vertical synchronization.
    ///
    /// Returns `false` when the setting is unchanged.
    pub fn set_vsync_enabled(&mut self, enabled: bool) -> Result<bool, RhiError> {
        if enabled == self.settings.vsync_enabled {
            return Ok(false);
        }
        self.backend.set_vsync_enabled(enabled)?;
        self.settings.vsync_enabled = enabled;
        Ok(true)
    }

    /// Switch between windowed and full-screen presentation.
    ///
    /// Returns `false` when the setting is unchanged.
    pub fn set_full_screen(&mut self, full_screen: bool) -> Result<bool, RhiError> {
        if full_screen == self.settings.is_full_screen {
            return Ok(false);
        }
        self.backend.set_full_screen(full_screen)?;
        self.settings.is_full_screen = full_screen;
        Ok(true)
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("backend", &self.backend.name())
            .field("settings", &self.settings)
            .field("frame_index", &self.frame_index)
            .field("frame_buffer_index", &self.frame_buffer_index)
            .field("frame_buffer_in_use", &self.frame_buffer_in_use)
            .finish_non_exhaustive()
    }
}
