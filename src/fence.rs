//! CPU-GPU synchronization fences.
//!
//! A [`Fence`] allows the CPU to wait for submitted GPU work to reach a
//! point. The render context uses one fence per frame buffer to detect
//! "frame presented" completion and a separate render fence for full
//! "render complete" waits at teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The fence has not yet been signaled.
    Unsignaled,
    /// The fence has been signaled (GPU work complete).
    Signaled,
}

/// CPU-GPU synchronization primitive.
///
/// Fences allow the CPU to wait for GPU work to complete. Clones share the
/// same underlying signal state, so a backend can hold a clone and signal
/// it when submitted work finishes.
#[derive(Debug)]
pub struct Fence {
    name: Arc<str>,
    signaled: Arc<AtomicBool>,
}

impl Fence {
    /// Create a new fence with the given name and initial state.
    pub fn new(name: &str, signaled: bool) -> Self {
        Self {
            name: Arc::from(name),
            signaled: Arc::new(AtomicBool::new(signaled)),
        }
    }

    /// Get the fence name (for diagnostics).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check the current status of the fence.
    pub fn status(&self) -> FenceStatus {
        if self.signaled.load(Ordering::Acquire) {
            FenceStatus::Signaled
        } else {
            FenceStatus::Unsignaled
        }
    }

    /// Check if the fence is signaled (non-blocking).
    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Wait for the fence to be signaled (blocking).
    ///
    /// Returns immediately if already signaled. This is an unconditional
    /// wait: a fence that never signals indicates a lost device, which is
    /// handled by the platform layer rather than retried here.
    pub fn wait(&self) {
        while !self.signaled.load(Ordering::Acquire) {
            std::hint::spin_loop();
        }
    }

    /// Wait for the fence with a timeout.
    ///
    /// Returns `true` if the fence was signaled, `false` if timeout elapsed.
    pub fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        let start = std::time::Instant::now();
        while !self.signaled.load(Ordering::Acquire) {
            if start.elapsed() >= timeout {
                return false;
            }
            std::hint::spin_loop();
        }
        true
    }

    /// Reset the fence to unsignaled state.
    ///
    /// Must only be called when no GPU work is pending on this fence.
    pub fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    /// Signal the fence.
    ///
    /// Called by backend implementations when submitted work completes.
    pub fn signal(&self) {
        log::trace!("Fence '{}' signaled", self.name);
        self.signaled.store(true, Ordering::Release);
    }
}

impl Clone for Fence {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            signaled: Arc::clone(&self.signaled),
        }
    }
}

static_assertions::assert_impl_all!(Fence: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_initial_state() {
        let fence = Fence::new("test", false);
        assert_eq!(fence.status(), FenceStatus::Unsignaled);
        assert!(!fence.is_signaled());

        let fence = Fence::new("test", true);
        assert!(fence.is_signaled());
    }

    #[test]
    fn test_fence_signal_and_wait() {
        let fence = Fence::new("test", false);

        let fence_clone = fence.clone();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            fence_clone.signal();
        });

        fence.wait();
        assert!(fence.is_signaled());
    }

    #[test]
    fn test_fence_wait_timeout() {
        let fence = Fence::new("test", false);
        assert!(!fence.wait_timeout(std::time::Duration::from_millis(10)));
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_fence_reset() {
        let fence = Fence::new("test", true);
        fence.reset();
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_fence_clone_shares_state() {
        let fence1 = Fence::new("test", false);
        let fence2 = fence1.clone();

        fence1.signal();
        assert!(fence2.is_signaled());
    }
}
