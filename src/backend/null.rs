//! No-op render backend for headless use and tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::descriptor::DescriptorHeapType;
use crate::error::RhiError;
use crate::fence::Fence;
use crate::resource::Barriers;

use super::RenderBackend;

/// Backend that performs no GPU work.
///
/// Submissions signal their fence immediately and present rotates the
/// frame buffer index through the configured buffer count. Counters for
/// submitted lists and emitted barriers are kept so tests can observe
/// what the frontend forwarded.
#[derive(Debug)]
pub struct NullBackend {
    frame_buffers_count: AtomicU32,
    next_frame_buffer_index: AtomicU32,
    submitted_lists: AtomicUsize,
    emitted_barriers: AtomicUsize,
}

impl NullBackend {
    pub const DEFAULT_FRAME_BUFFERS_COUNT: u32 = 3;

    /// Create a null backend with the default swap-chain size.
    pub fn new() -> Self {
        Self::with_frame_buffers_count(Self::DEFAULT_FRAME_BUFFERS_COUNT)
    }

    /// Create a null backend with the given swap-chain size.
    pub fn with_frame_buffers_count(count: u32) -> Self {
        Self {
            frame_buffers_count: AtomicU32::new(count.max(1)),
            next_frame_buffer_index: AtomicU32::new(0),
            submitted_lists: AtomicUsize::new(0),
            emitted_barriers: AtomicUsize::new(0),
        }
    }

    /// Total command lists submitted so far.
    pub fn submitted_list_count(&self) -> usize {
        self.submitted_lists.load(Ordering::Relaxed)
    }

    /// Total resource barriers emitted so far.
    pub fn emitted_barrier_count(&self) -> usize {
        self.emitted_barriers.load(Ordering::Relaxed)
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for NullBackend {
    fn name(&self) -> &str {
        "Null"
    }

    fn create_fence(&self, name: &str, signaled: bool) -> Fence {
        Fence::new(name, signaled)
    }

    fn submit(&self, command_list_name: &str, signal_fence: &Fence) -> Result<(), RhiError> {
        log::trace!("Null backend executing command list '{command_list_name}'");
        self.submitted_lists.fetch_add(1, Ordering::Relaxed);
        // There is no real GPU, so submitted work completes instantly.
        signal_fence.signal();
        Ok(())
    }

    fn emit_barriers(&self, barriers: &Barriers) -> Result<(), RhiError> {
        self.emitted_barriers
            .fetch_add(barriers.len(), Ordering::Relaxed);
        Ok(())
    }

    fn present(&self, frame_buffer_index: u32) -> Result<(), RhiError> {
        log::trace!("Null backend presenting frame buffer {frame_buffer_index}");
        let count = self.frame_buffers_count.load(Ordering::Relaxed);
        self.next_frame_buffer_index
            .store((frame_buffer_index + 1) % count, Ordering::Relaxed);
        Ok(())
    }

    fn next_frame_buffer_index(&self) -> u32 {
        self.next_frame_buffer_index.load(Ordering::Relaxed)
    }

    fn set_frame_buffers_count(&self, count: u32) -> Result<(), RhiError> {
        if count == 0 {
            return Err(RhiError::InvalidArgument(
                "frame buffers count must be at least 1".to_string(),
            ));
        }
        self.frame_buffers_count.store(count, Ordering::Relaxed);
        self.next_frame_buffer_index.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn set_vsync_enabled(&self, _enabled: bool) -> Result<(), RhiError> {
        Ok(())
    }

    fn set_full_screen(&self, _full_screen: bool) -> Result<(), RhiError> {
        Ok(())
    }

    fn allocate_descriptors(
        &self,
        heap_type: DescriptorHeapType,
        size: u32,
    ) -> Result<(), RhiError> {
        log::trace!(
            "Null backend allocating {size} descriptors in {} heap",
            heap_type.name()
        );
        Ok(())
    }

    fn flush(&self, signal_fence: &Fence) -> Result<(), RhiError> {
        // All submitted work completed instantly, signal right away.
        signal_fence.signal();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, ResourceState};

    #[test]
    fn test_submit_signals_fence() {
        let backend = NullBackend::new();
        let fence = backend.create_fence("submit fence", false);

        backend.submit("test list", &fence).unwrap();
        assert!(fence.is_signaled());
        assert_eq!(backend.submitted_list_count(), 1);
    }

    #[test]
    fn test_present_rotates_frame_buffer_index() {
        let backend = NullBackend::with_frame_buffers_count(3);
        assert_eq!(backend.next_frame_buffer_index(), 0);

        backend.present(0).unwrap();
        assert_eq!(backend.next_frame_buffer_index(), 1);
        backend.present(1).unwrap();
        assert_eq!(backend.next_frame_buffer_index(), 2);
        backend.present(2).unwrap();
        assert_eq!(backend.next_frame_buffer_index(), 0);
    }

    #[test]
    fn test_emitted_barriers_counted() {
        let backend = NullBackend::new();
        let resource = Resource::new("buffer", ResourceState::Common);
        let mut barriers = Barriers::new();
        resource.set_state(ResourceState::CopyDest, &mut barriers);
        resource.set_state(ResourceState::ShaderResource, &mut barriers);

        backend.emit_barriers(&barriers).unwrap();
        assert_eq!(backend.emitted_barrier_count(), 2);
    }

    #[test]
    fn test_flush_signals_fence() {
        let backend = NullBackend::new();
        let fence = backend.create_fence("flush fence", false);
        backend.flush(&fence).unwrap();
        assert!(fence.is_signaled());
    }

    #[test]
    fn test_zero_frame_buffers_rejected() {
        let backend = NullBackend::new();
        assert!(backend.set_frame_buffers_count(0).is_err());
    }
}
