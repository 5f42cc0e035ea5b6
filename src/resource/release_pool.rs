//! Deferred resource destruction.
//!
//! GPU resources can not be destroyed while in-flight command lists still
//! reference them. Instead of dropping immediately, owners move resources
//! into the [`ReleasePool`], which keeps them alive until the pool is
//! flushed at a point where the GPU is known to be idle (context teardown
//! or after a full render-complete wait).

use std::sync::Arc;

use super::texture::Texture;

/// Pool of resources pending delayed destruction.
#[derive(Debug, Default)]
pub struct ReleasePool {
    pending_textures: Vec<Arc<Texture>>,
}

impl ReleasePool {
    /// Create an empty release pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a texture to be destroyed at the next flush.
    pub fn add_texture(&mut self, texture: Arc<Texture>) {
        log::trace!(
            "Release pool holding texture '{}'",
            texture.resource().name()
        );
        self.pending_textures.push(texture);
    }

    /// Number of resources waiting in the pool.
    pub fn pending_count(&self) -> usize {
        self.pending_textures.len()
    }

    /// Destroy all pending resources.
    ///
    /// Must only be called when no GPU work referencing them is in flight.
    /// Returns the number of resources released.
    pub fn release_resources(&mut self) -> usize {
        let count = self.pending_textures.len();
        if count > 0 {
            log::debug!("Releasing {count} pooled resources");
        }
        self.pending_textures.clear();
        count
    }
}
