//! Render backend abstraction.
//!
//! All platform-specific GPU work goes through the [`RenderBackend`]
//! trait. The frontend (context, command lists, passes, resource manager)
//! is backend-agnostic and talks to a `dyn RenderBackend` behind an `Arc`.
//! [`NullBackend`] is the no-op implementation used headless and in tests.

pub mod null;

use std::sync::Arc;

use crate::descriptor::DescriptorHeapType;
use crate::error::RhiError;
use crate::fence::Fence;
use crate::resource::Barriers;

pub use null::NullBackend;

/// Platform GPU interface implemented per graphics API.
pub trait RenderBackend: Send + Sync + 'static {
    /// Backend name (for diagnostics).
    fn name(&self) -> &str;

    /// Create a fence in the given initial state.
    fn create_fence(&self, name: &str, signaled: bool) -> Fence;

    /// Submit a recorded command list for execution, signaling `fence`
    /// when the GPU finishes it.
    fn submit(&self, command_list_name: &str, signal_fence: &Fence) -> Result<(), RhiError>;

    /// Encode resource transition barriers into the command stream.
    fn emit_barriers(&self, barriers: &Barriers) -> Result<(), RhiError>;

    /// Present the given frame buffer to the display.
    fn present(&self, frame_buffer_index: u32) -> Result<(), RhiError>;

    /// Index of the swap-chain buffer that will back the next frame.
    fn next_frame_buffer_index(&self) -> u32;

    /// Reconfigure the swap chain to the given buffer count.
    fn set_frame_buffers_count(&self, count: u32) -> Result<(), RhiError>;

    /// Enable or disable vertical synchronization.
    fn set_vsync_enabled(&self, enabled: bool) -> Result<(), RhiError>;

    /// Switch between windowed and full-screen presentation.
    fn set_full_screen(&self, full_screen: bool) -> Result<(), RhiError>;

    /// Resize a physical descriptor heap of the given type.
    fn allocate_descriptors(&self, heap_type: DescriptorHeapType, size: u32)
        -> Result<(), RhiError>;

    /// Enqueue a signal of `fence` after all previously submitted work.
    ///
    /// Waiting on the fence afterwards is a full queue flush.
    fn flush(&self, signal_fence: &Fence) -> Result<(), RhiError>;
}

/// Create the default backend for the current platform.
///
/// Without a platform GPU layer this is the [`NullBackend`]; real backends
/// are constructed by the platform integration and passed to
/// [`RenderContext::new`](crate::context::RenderContext::new) directly.
pub fn create_backend() -> Arc<dyn RenderBackend> {
    Arc::new(NullBackend::new())
}
