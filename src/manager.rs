//! Central resource manager: descriptor heaps, program bindings registry
//! and the deferred release pool.
//!
//! The manager owns all descriptor heaps, bucketed by heap type, and the
//! registry of program bindings. With deferred heap allocation enabled,
//! bindings only reserve descriptor ranges at creation; the heaps are
//! physically allocated and all pending bindings finalized in one batch by
//! [`ResourceManager::complete_initialization`].

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::RenderBackend;
use crate::descriptor::{
    DescriptorHeap, DescriptorHeapSettings, DescriptorHeapType,
};
use crate::error::RhiError;
use crate::program::{BindingsHandle, ProgramBindings, ProgramBindingsArena};
use crate::resource::ReleasePool;

/// Per-type heap sizes, indexed in [`DescriptorHeapType::ALL`] order.
pub type HeapSizes = [u32; DescriptorHeapType::COUNT];

/// Resource manager configuration.
#[derive(Debug, Clone, Copy)]
pub struct ResourceManagerSettings {
    /// Initial sizes of the CPU-only heap of each type.
    pub default_heap_sizes: HeapSizes,
    /// Initial sizes of the shader-visible heap of each capable type.
    pub shader_visible_heap_sizes: HeapSizes,
    /// Whether descriptor allocation is deferred until
    /// [`ResourceManager::complete_initialization`].
    pub deferred_heap_allocation: bool,
}

impl Default for ResourceManagerSettings {
    fn default() -> Self {
        Self {
            default_heap_sizes: [256, 64, 32, 32],
            shader_visible_heap_sizes: [256, 64, 0, 0],
            deferred_heap_allocation: true,
        }
    }
}

#[derive(Debug, Default)]
struct BindingsRegistry {
    arena: ProgramBindingsArena,
    registered: Vec<BindingsHandle>,
}

/// Owner of descriptor heaps, program bindings and pooled releases.
pub struct ResourceManager {
    backend: Arc<dyn RenderBackend>,
    deferred_heap_allocation: bool,
    heaps: [Vec<Arc<Mutex<DescriptorHeap>>>; DescriptorHeapType::COUNT],
    bindings: Mutex<BindingsRegistry>,
    release_pool: Mutex<ReleasePool>,
}

impl ResourceManager {
    /// Create an uninitialized resource manager with no heaps.
    pub fn new(backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            backend,
            deferred_heap_allocation: false,
            heaps: std::array::from_fn(|_| Vec::new()),
            bindings: Mutex::new(BindingsRegistry::default()),
            release_pool: Mutex::new(ReleasePool::new()),
        }
    }

    /// Create the default heaps described by `settings`.
    ///
    /// One CPU-only heap is created for every heap type, plus one
    /// shader-visible heap for each type capable of shader visibility.
    pub fn initialize(&mut self, settings: ResourceManagerSettings) -> Result<(), RhiError> {
        log::debug!(
            "Initializing resource manager (deferred_heap_allocation={})",
            settings.deferred_heap_allocation
        );
        self.deferred_heap_allocation = settings.deferred_heap_allocation;

        for (bucket, heap_type) in DescriptorHeapType::ALL.into_iter().enumerate() {
            self.create_descriptor_heap(DescriptorHeapSettings {
                heap_type,
                size: settings.default_heap_sizes[bucket],
                deferred_allocation: settings.deferred_heap_allocation,
                shader_visible: false,
            })?;

            if heap_type.is_shader_visible_capable() {
                self.create_descriptor_heap(DescriptorHeapSettings {
                    heap_type,
                    size: settings.shader_visible_heap_sizes[bucket],
                    deferred_allocation: settings.deferred_heap_allocation,
                    shader_visible: true,
                })?;
            }
        }
        Ok(())
    }

    /// Finish deferred initialization.
    ///
    /// Allocates every heap that has pending reservations, forwarding the
    /// new sizes to the backend, then finalizes all registered program
    /// bindings in parallel. A no-op when deferred allocation is disabled,
    /// since everything was allocated and completed eagerly.
    pub fn complete_initialization(&self) -> Result<(), RhiError> {
        if !self.deferred_heap_allocation {
            return Ok(());
        }
        log::debug!("Completing deferred resource manager initialization");

        for (bucket, heap_type) in DescriptorHeapType::ALL.into_iter().enumerate() {
            for heap in &self.heaps[bucket] {
                let mut heap = heap.lock();
                if heap.heap_type() != heap_type {
                    return Err(RhiError::Internal(format!(
                        "{} heap found in {} bucket",
                        heap.heap_type().name(),
                        heap_type.name()
                    )));
                }
                if heap.allocate() {
                    self.backend
                        .allocate_descriptors(heap_type, heap.allocated_size())?;
                }
            }
        }

        let mut registry = self.bindings.lock();
        let BindingsRegistry { arena, registered } = &mut *registry;
        registered.retain(|handle| arena.contains(*handle));
        arena.par_for_each_mut(registered, |bindings| bindings.complete());
        Ok(())
    }

    /// Create an additional descriptor heap, returning its index within
    /// the type bucket.
    pub fn create_descriptor_heap(
        &mut self,
        settings: DescriptorHeapSettings,
    ) -> Result<usize, RhiError> {
        settings.heap_type.expect_valid("create descriptor heap")?;
        if settings.shader_visible && !settings.heap_type.is_shader_visible_capable() {
            return Err(RhiError::InvalidArgument(format!(
                "{} descriptor heaps can not be shader visible",
                settings.heap_type.name()
            )));
        }

        // expect_valid guarantees a bucket.
        let bucket = match settings.heap_type.bucket_index() {
            Some(bucket) => bucket,
            None => {
                return Err(RhiError::Internal(
                    "valid heap type without bucket index".to_string(),
                ))
            }
        };
        if !settings.deferred_allocation && settings.size > 0 {
            self.backend
                .allocate_descriptors(settings.heap_type, settings.size)?;
        }
        self.heaps[bucket].push(Arc::new(Mutex::new(DescriptorHeap::new(settings))));
        Ok(self.heaps[bucket].len() - 1)
    }

    /// Get a descriptor heap by type and index within the type bucket.
    pub fn descriptor_heap(
        &self,
        heap_type: DescriptorHeapType,
        index: usize,
    ) -> Result<Arc<Mutex<DescriptorHeap>>, RhiError> {
        heap_type.expect_valid("get descriptor heap")?;
        let bucket = match heap_type.bucket_index() {
            Some(bucket) => bucket,
            None => {
                return Err(RhiError::Internal(
                    "valid heap type without bucket index".to_string(),
                ))
            }
        };
        self.heaps[bucket].get(index).cloned().ok_or_else(|| {
            RhiError::InvalidArgument(format!(
                "{} descriptor heap {} does not exist, {} heaps of this type available",
                heap_type.name(),
                index,
                self.heaps[bucket].len()
            ))
        })
    }

    /// Get the default (first created) heap of a type.
    ///
    /// With the standard initialization order this is the CPU-only heap.
    pub fn default_descriptor_heap(
        &self,
        heap_type: DescriptorHeapType,
    ) -> Result<Arc<Mutex<DescriptorHeap>>, RhiError> {
        self.descriptor_heap(heap_type, 0)
    }

    /// Get the shader-visible heap of a capable type.
    pub fn shader_visible_descriptor_heap(
        &self,
        heap_type: DescriptorHeapType,
    ) -> Result<Arc<Mutex<DescriptorHeap>>, RhiError> {
        heap_type.expect_valid("get shader visible descriptor heap")?;
        if !heap_type.is_shader_visible_capable() {
            return Err(RhiError::InvalidArgument(format!(
                "{} descriptor heaps can not be shader visible",
                heap_type.name()
            )));
        }
        let bucket = match heap_type.bucket_index() {
            Some(bucket) => bucket,
            None => {
                return Err(RhiError::Internal(
                    "valid heap type without bucket index".to_string(),
                ))
            }
        };
        self.heaps[bucket]
            .iter()
            .find(|heap| heap.lock().is_shader_visible())
            .cloned()
            .ok_or_else(|| {
                RhiError::InvalidState(format!(
                    "no shader visible {} descriptor heap created",
                    heap_type.name()
                ))
            })
    }

    /// Physically allocated sizes of all heaps of a type.
    pub fn descriptor_heap_sizes(&self, heap_type: DescriptorHeapType) -> Vec<u32> {
        heap_type
            .bucket_index()
            .map(|bucket| {
                self.heaps[bucket]
                    .iter()
                    .map(|heap| heap.lock().allocated_size())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Register program bindings, reserving their shader-visible
    /// descriptor range.
    ///
    /// With deferred heap allocation the bindings stay incomplete until
    /// [`complete_initialization`](Self::complete_initialization); otherwise
    /// they are finalized right away.
    pub fn add_program_bindings(
        &self,
        mut bindings: ProgramBindings,
    ) -> Result<BindingsHandle, RhiError> {
        let descriptor_count = bindings.len() as u32;
        if descriptor_count > 0 {
            let heap = self.shader_visible_descriptor_heap(DescriptorHeapType::ShaderResources)?;
            let range = heap.lock().reserve(descriptor_count);
            bindings.set_descriptor_range(range);
        }
        if !self.deferred_heap_allocation {
            bindings.complete();
        }

        let mut registry = self.bindings.lock();
        // The arena owns bindings by value and mints a fresh handle per
        // insert, so double registration of one object is unrepresentable.
        let handle = registry.arena.insert(bindings);
        registry.registered.push(handle);
        Ok(handle)
    }

    /// Run `f` with the bindings behind a handle, if still live.
    pub fn with_program_bindings<R>(
        &self,
        handle: BindingsHandle,
        f: impl FnOnce(&ProgramBindings) -> R,
    ) -> Option<R> {
        let registry = self.bindings.lock();
        registry.arena.get(handle).map(f)
    }

    /// Remove program bindings, invalidating their handle.
    pub fn remove_program_bindings(&self, handle: BindingsHandle) -> Option<ProgramBindings> {
        let mut registry = self.bindings.lock();
        registry.registered.retain(|registered| *registered != handle);
        registry.arena.remove(handle)
    }

    /// Number of live registered bindings.
    pub fn program_bindings_count(&self) -> usize {
        self.bindings.lock().arena.len()
    }

    /// The deferred release pool.
    pub fn release_pool(&self) -> &Mutex<ReleasePool> {
        &self.release_pool
    }

    /// Whether descriptor allocation is deferred.
    pub fn is_deferred_heap_allocation(&self) -> bool {
        self.deferred_heap_allocation
    }

    /// Toggle deferred allocation, propagating to all existing heaps.
    ///
    /// Propagation only happens when the flag actually changes.
    pub fn set_deferred_heap_allocation(&mut self, deferred: bool) {
        if self.deferred_heap_allocation == deferred {
            return;
        }
        self.deferred_heap_allocation = deferred;
        for bucket in &self.heaps {
            for heap in bucket {
                heap.lock().set_deferred_allocation(deferred);
            }
        }
    }

    /// Drop all heaps, registered bindings and pooled resources.
    ///
    /// Called at context teardown after a full render-complete wait.
    pub fn release(&mut self) {
        log::debug!("Releasing resource manager");
        let mut registry = self.bindings.lock();
        registry.registered.clear();
        registry.arena = ProgramBindingsArena::new();
        drop(registry);

        for bucket in &mut self.heaps {
            bucket.clear();
        }
        self.release_pool.lock().release_resources();
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("backend", &self.backend.name())
            .field("deferred_heap_allocation", &self.deferred_heap_allocation)
            .finish_non_exhaustive()
    }
}
