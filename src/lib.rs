//! Backend-agnostic GPU rendering core.
//!
//! The crate models the platform-independent half of a rendering hardware
//! interface: a [`RenderContext`](context::RenderContext) driving N
//! buffered frames over a swap chain, validated
//! [`CommandList`](command::CommandList) lifecycles, per-resource state
//! tracking that emits transition [`Barriers`](resource::Barriers) only on
//! actual change, typed descriptor heaps with deferred allocation and
//! render passes over texture attachments. Platform GPU APIs plug in
//! through the [`RenderBackend`](backend::RenderBackend) trait; the
//! bundled [`NullBackend`](backend::NullBackend) runs the whole frontend
//! headless.
//!
//! A minimal frame loop:
//!
//! ```
//! use lumen_rhi::backend::create_backend;
//! use lumen_rhi::context::{RenderContext, RenderContextSettings, WaitFor};
//!
//! # fn main() -> Result<(), lumen_rhi::error::RhiError> {
//! let mut context = RenderContext::new(create_backend(), RenderContextSettings::default())?;
//! context.complete_initialization()?;
//!
//! for _ in 0..3 {
//!     context.wait_for_gpu(WaitFor::FramePresented)?;
//!     let frame = context.frame_mut();
//!     frame.command_list.reset(Some("Frame Rendering"))?;
//!     frame.render_pass.begin(&mut frame.command_list)?;
//!     // draw commands
//!     frame.render_pass.end(&mut frame.command_list)?;
//!     frame.command_list.commit()?;
//!     context.execute_committed()?;
//!     context.present()?;
//! }
//!
//! context.wait_for_gpu(WaitFor::RenderComplete)?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod fence;
pub mod manager;
pub mod pass;
pub mod program;
pub mod resource;
pub mod types;

pub use backend::{create_backend, NullBackend, RenderBackend};
pub use command::{CommandList, CommandListState, CommandQueue};
pub use context::{Frame, RenderContext, RenderContextSettings, WaitFor};
pub use descriptor::{
    DescriptorHeap, DescriptorHeapSettings, DescriptorHeapType, DescriptorRange,
};
pub use error::RhiError;
pub use fence::{Fence, FenceStatus};
pub use manager::{ResourceManager, ResourceManagerSettings};
pub use pass::{
    AttachmentDesc, ColorAttachment, DepthAttachment, RenderPass, RenderPassSettings,
    ShaderAccess, StencilAttachment,
};
pub use program::{
    ApplyBehavior, BindingsHandle, ProgramArgument, ProgramBindings, ResourceLocation,
    ShaderStage, VertexFormat, VertexLayout,
};
pub use resource::{
    Barriers, ReleasePool, Resource, ResourceBarrier, ResourceState, Texture, TextureKind,
};
pub use types::{ClearColor, FrameSize, LoadAction, StoreAction};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
