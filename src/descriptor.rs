//! Typed descriptor heaps with optional deferred allocation.
//!
//! A descriptor heap is a pool of GPU-resource view descriptors of one
//! kind, optionally visible to shader stages. With deferred allocation
//! enabled, [`DescriptorHeap::reserve`] only records pending ranges; the
//! physical allocation happens in one batch when [`DescriptorHeap::allocate`]
//! is called at a well-defined completion point.

use crate::error::RhiError;

/// Kind of descriptors stored in a heap.
///
/// `Undefined` is a sentinel used only for error reporting; requesting a
/// heap of this type is an invalid-argument error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapType {
    /// Constant buffer, texture and buffer view descriptors.
    ShaderResources,
    /// Sampler descriptors.
    Samplers,
    /// Render target view descriptors.
    RenderTargets,
    /// Depth-stencil view descriptors.
    DepthStencil,
    /// Sentinel, never a valid heap type.
    Undefined,
}

impl DescriptorHeapType {
    /// Number of valid (non-sentinel) heap types.
    pub const COUNT: usize = 4;

    /// All valid heap types in bucket order.
    pub const ALL: [DescriptorHeapType; Self::COUNT] = [
        Self::ShaderResources,
        Self::Samplers,
        Self::RenderTargets,
        Self::DepthStencil,
    ];

    /// Human-readable type name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ShaderResources => "ShaderResources",
            Self::Samplers => "Samplers",
            Self::RenderTargets => "RenderTargets",
            Self::DepthStencil => "DepthStencil",
            Self::Undefined => "Undefined",
        }
    }

    /// Index of this type in per-type collections.
    pub(crate) fn bucket_index(&self) -> Option<usize> {
        match self {
            Self::ShaderResources => Some(0),
            Self::Samplers => Some(1),
            Self::RenderTargets => Some(2),
            Self::DepthStencil => Some(3),
            Self::Undefined => None,
        }
    }

    /// Whether heaps of this type can be made visible to shader stages.
    ///
    /// Only shader resource and sampler heaps can be bound to shaders;
    /// render target and depth-stencil heaps are always CPU-only.
    pub fn is_shader_visible_capable(&self) -> bool {
        matches!(self, Self::ShaderResources | Self::Samplers)
    }

    /// Reject the sentinel type with an invalid-argument error.
    pub(crate) fn expect_valid(&self, operation: &str) -> Result<(), RhiError> {
        if *self == Self::Undefined {
            return Err(RhiError::InvalidArgument(format!(
                "can not {operation} of \"Undefined\" descriptor heap type"
            )));
        }
        Ok(())
    }
}

/// Configuration of a single descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeapSettings {
    /// Kind of descriptors in the heap.
    pub heap_type: DescriptorHeapType,
    /// Initial heap size in descriptors.
    pub size: u32,
    /// Whether reservations are batched until `allocate()`.
    pub deferred_allocation: bool,
    /// Whether the heap is visible to shader stages.
    pub shader_visible: bool,
}

/// A contiguous range of descriptors reserved from a heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRange {
    /// Offset of the first descriptor in the heap.
    pub offset: u32,
    /// Number of descriptors in the range.
    pub length: u32,
}

/// A typed, growable pool of resource-view descriptors.
#[derive(Debug)]
pub struct DescriptorHeap {
    settings: DescriptorHeapSettings,
    /// Total descriptors requested through `reserve`.
    deferred_size: u32,
    /// Descriptors physically allocated so far.
    allocated_size: u32,
}

impl DescriptorHeap {
    /// Create a new descriptor heap.
    ///
    /// Non-deferred heaps are considered physically allocated at their
    /// initial size right away; deferred heaps allocate nothing until
    /// [`allocate`](Self::allocate) is called.
    pub fn new(settings: DescriptorHeapSettings) -> Self {
        log::debug!(
            "Creating {} descriptor heap: {} descriptors, shader_visible={}, deferred={}",
            settings.heap_type.name(),
            settings.size,
            settings.shader_visible,
            settings.deferred_allocation
        );
        let allocated_size = if settings.deferred_allocation {
            0
        } else {
            settings.size
        };
        Self {
            settings,
            deferred_size: 0,
            allocated_size,
        }
    }

    /// Heap configuration.
    pub fn settings(&self) -> &DescriptorHeapSettings {
        &self.settings
    }

    /// Kind of descriptors in the heap.
    pub fn heap_type(&self) -> DescriptorHeapType {
        self.settings.heap_type
    }

    /// Whether the heap is visible to shader stages.
    pub fn is_shader_visible(&self) -> bool {
        self.settings.shader_visible
    }

    /// Descriptors physically allocated so far.
    pub fn allocated_size(&self) -> u32 {
        self.allocated_size
    }

    /// Total descriptors requested through `reserve`, including pending ones.
    pub fn deferred_size(&self) -> u32 {
        self.deferred_size
    }

    /// Toggle deferred allocation for future reservations.
    pub fn set_deferred_allocation(&mut self, deferred: bool) {
        self.settings.deferred_allocation = deferred;
    }

    /// Reserve a contiguous range of descriptors.
    ///
    /// With deferred allocation, the range is only recorded; it becomes
    /// physically backed on the next [`allocate`](Self::allocate) call.
    /// Otherwise the heap grows immediately if needed.
    pub fn reserve(&mut self, length: u32) -> DescriptorRange {
        let offset = self.deferred_size;
        self.deferred_size += length;
        if !self.settings.deferred_allocation && self.deferred_size > self.allocated_size {
            log::debug!(
                "{} descriptor heap grows to {} descriptors",
                self.settings.heap_type.name(),
                self.deferred_size
            );
            self.allocated_size = self.deferred_size;
        }
        DescriptorRange { offset, length }
    }

    /// Physically allocate all pending reservations.
    ///
    /// Returns `true` if the allocated size actually grew, so the caller
    /// can forward the new size to the backend.
    pub fn allocate(&mut self) -> bool {
        if self.deferred_size <= self.allocated_size {
            return false;
        }
        log::debug!(
            "Allocating {} deferred descriptors in {} heap",
            self.deferred_size - self.allocated_size,
            self.settings.heap_type.name()
        );
        self.allocated_size = self.deferred_size;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap_settings(deferred: bool) -> DescriptorHeapSettings {
        DescriptorHeapSettings {
            heap_type: DescriptorHeapType::ShaderResources,
            size: 16,
            deferred_allocation: deferred,
            shader_visible: true,
        }
    }

    #[test]
    fn test_sentinel_type_rejected() {
        let err = DescriptorHeapType::Undefined
            .expect_valid("create heap")
            .unwrap_err();
        assert!(matches!(err, RhiError::InvalidArgument(_)));

        for heap_type in DescriptorHeapType::ALL {
            assert!(heap_type.expect_valid("create heap").is_ok());
        }
    }

    #[test]
    fn test_shader_visible_capability() {
        assert!(DescriptorHeapType::ShaderResources.is_shader_visible_capable());
        assert!(DescriptorHeapType::Samplers.is_shader_visible_capable());
        assert!(!DescriptorHeapType::RenderTargets.is_shader_visible_capable());
        assert!(!DescriptorHeapType::DepthStencil.is_shader_visible_capable());
    }

    #[test]
    fn test_immediate_reserve_allocates() {
        let mut heap = DescriptorHeap::new(heap_settings(false));
        assert_eq!(heap.allocated_size(), 16);

        let range = heap.reserve(4);
        assert_eq!(range, DescriptorRange { offset: 0, length: 4 });
        assert_eq!(heap.deferred_size(), 4);
        // Still within the initial size, no growth needed.
        assert_eq!(heap.allocated_size(), 16);

        heap.reserve(20);
        assert_eq!(heap.allocated_size(), 24);
    }

    #[test]
    fn test_deferred_reserve_then_allocate() {
        let mut heap = DescriptorHeap::new(heap_settings(true));
        assert_eq!(heap.allocated_size(), 0);

        let first = heap.reserve(4);
        let second = heap.reserve(8);
        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, 4);
        assert_eq!(heap.allocated_size(), 0);
        assert_eq!(heap.deferred_size(), 12);

        assert!(heap.allocate());
        assert_eq!(heap.allocated_size(), 12);

        // Second allocate with nothing pending is a no-op.
        assert!(!heap.allocate());
    }
}
