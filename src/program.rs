//! Program arguments, bindings and vertex layout descriptors.
//!
//! [`ProgramBindings`] maps shader-visible arguments to concrete resource
//! locations for one draw configuration. Bindings objects live in a
//! [`ProgramBindingsArena`] and are addressed by [`BindingsHandle`], a
//! stable index with a generation counter; a lookup through a stale handle
//! fails gracefully instead of dangling.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rayon::prelude::*;

use crate::descriptor::{DescriptorHeapType, DescriptorRange};
use crate::resource::Resource;

/// Shader stage an argument belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Argument shared by all stages.
    All,
    /// Vertex shader stage.
    Vertex,
    /// Pixel (fragment) shader stage.
    Pixel,
}

/// A program argument key: shader stage plus argument name.
///
/// The hash is computed once at construction since arguments are used as
/// map keys on every binding application.
#[derive(Debug, Clone)]
pub struct ProgramArgument {
    stage: ShaderStage,
    name: Arc<str>,
    hash: u64,
}

impl ProgramArgument {
    /// Create a new program argument key.
    pub fn new(stage: ShaderStage, name: &str) -> Self {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        stage.hash(&mut hasher);
        name.hash(&mut hasher);
        Self {
            stage,
            name: Arc::from(name),
            hash: hasher.finish(),
        }
    }

    /// The shader stage of this argument.
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// The argument name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for ProgramArgument {
    fn eq(&self, other: &Self) -> bool {
        self.stage == other.stage && self.name == other.name
    }
}

impl Eq for ProgramArgument {}

impl Hash for ProgramArgument {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// Concrete resource location bound to a program argument.
#[derive(Debug, Clone)]
pub struct ResourceLocation {
    /// The bound resource.
    pub resource: Arc<Resource>,
    /// Descriptor heap kind the resource view lives in.
    pub heap_type: DescriptorHeapType,
}

bitflags::bitflags! {
    /// How program bindings are applied to a command list.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ApplyBehavior: u32 {
        /// Constant (root) arguments are set only once per command list.
        const CONSTANT_ONCE = 1 << 0;
        /// Only arguments changed since the previous bindings are applied.
        const CHANGES_ONLY = 1 << 1;
        /// Resource state barriers are emitted for bound resources.
        const STATE_BARRIERS = 1 << 2;
        /// Default incremental application.
        const ALL_INCREMENTAL = Self::CONSTANT_ONCE.bits()
            | Self::CHANGES_ONLY.bits()
            | Self::STATE_BARRIERS.bits();
    }
}

/// Mapping from program arguments to resource locations for one draw
/// configuration.
///
/// Lifecycle: created per configuration, optionally cloned with partial
/// argument replacement via [`clone_with`](Self::clone_with), then
/// completed (finalized against the shader-visible descriptor heap) either
/// immediately or deferred until heap allocation settles.
#[derive(Debug, Clone)]
pub struct ProgramBindings {
    name: Arc<str>,
    arguments: HashMap<ProgramArgument, ResourceLocation>,
    descriptor_range: Option<DescriptorRange>,
    completed: bool,
}

impl ProgramBindings {
    /// Create new bindings from argument/location pairs.
    pub fn new(
        name: &str,
        arguments: impl IntoIterator<Item = (ProgramArgument, ResourceLocation)>,
    ) -> Self {
        Self {
            name: Arc::from(name),
            arguments: arguments.into_iter().collect(),
            descriptor_range: None,
            completed: false,
        }
    }

    /// Clone these bindings, replacing the given arguments.
    ///
    /// The clone starts a fresh lifecycle: it has no descriptor range and
    /// is not completed.
    pub fn clone_with(
        &self,
        replacements: impl IntoIterator<Item = (ProgramArgument, ResourceLocation)>,
    ) -> Self {
        let mut arguments = self.arguments.clone();
        for (argument, location) in replacements {
            arguments.insert(argument, location);
        }
        Self {
            name: Arc::clone(&self.name),
            arguments,
            descriptor_range: None,
            completed: false,
        }
    }

    /// Bindings name (for diagnostics).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of bound arguments.
    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    /// Check if no arguments are bound.
    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    /// Look up the location bound to an argument.
    pub fn get(&self, argument: &ProgramArgument) -> Option<&ResourceLocation> {
        self.arguments.get(argument)
    }

    /// The descriptor range reserved for these bindings, once assigned.
    pub fn descriptor_range(&self) -> Option<DescriptorRange> {
        self.descriptor_range
    }

    /// Whether the bindings have been finalized against the descriptor heap.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub(crate) fn set_descriptor_range(&mut self, range: DescriptorRange) {
        self.descriptor_range = Some(range);
    }

    /// Finalize the bindings: write resource view descriptors into the
    /// reserved heap range. Idempotent.
    ///
    /// Non-empty bindings must have a descriptor range reserved through
    /// registration first.
    pub(crate) fn complete(&mut self) {
        if self.completed {
            return;
        }
        debug_assert!(
            self.arguments.is_empty() || self.descriptor_range.is_some(),
            "program bindings '{}' completed without a reserved descriptor range",
            self.name
        );
        log::trace!(
            "Completing program bindings '{}': {} arguments at {:?}",
            self.name,
            self.arguments.len(),
            self.descriptor_range
        );
        self.completed = true;
    }
}

static_assertions::assert_impl_all!(ProgramBindings: Send, Sync);

/// Handle to a bindings object stored in a [`ProgramBindingsArena`].
///
/// Handles carry a generation counter: after the slot is reused the stale
/// handle no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingsHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct ArenaSlot {
    generation: u32,
    value: Option<ProgramBindings>,
}

/// Arena of program bindings addressed by generational handles.
#[derive(Debug, Default)]
pub struct ProgramBindingsArena {
    slots: Vec<ArenaSlot>,
    free_list: Vec<u32>,
}

impl ProgramBindingsArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert bindings, returning a handle to them.
    pub fn insert(&mut self, bindings: ProgramBindings) -> BindingsHandle {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(bindings);
            BindingsHandle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(ArenaSlot {
                generation: 0,
                value: Some(bindings),
            });
            BindingsHandle {
                index,
                generation: 0,
            }
        }
    }

    /// Check if a handle still refers to live bindings.
    pub fn contains(&self, handle: BindingsHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .is_some_and(|slot| slot.generation == handle.generation && slot.value.is_some())
    }

    /// Look up bindings by handle; fails gracefully for stale handles.
    pub fn get(&self, handle: BindingsHandle) -> Option<&ProgramBindings> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Mutable lookup by handle.
    pub fn get_mut(&mut self, handle: BindingsHandle) -> Option<&mut ProgramBindings> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Remove bindings, invalidating the handle and any copies of it.
    pub fn remove(&mut self, handle: BindingsHandle) -> Option<ProgramBindings> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        Some(value)
    }

    /// Number of live bindings in the arena.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    /// Check if the arena holds no live bindings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` over the bindings selected by `handles` across parallel
    /// workers.
    ///
    /// Bindings are independent of each other, so this is a plain fork-join
    /// with no ordering between workers; the call returns after all workers
    /// have finished. Stale handles are skipped.
    pub(crate) fn par_for_each_mut(
        &mut self,
        handles: &[BindingsHandle],
        f: impl Fn(&mut ProgramBindings) + Send + Sync,
    ) {
        let selected: HashSet<(u32, u32)> = handles
            .iter()
            .map(|handle| (handle.index, handle.generation))
            .collect();

        self.slots
            .par_iter_mut()
            .enumerate()
            .filter(|(index, slot)| selected.contains(&(*index as u32, slot.generation)))
            .for_each(|(_, slot)| {
                if let Some(bindings) = slot.value.as_mut() {
                    f(bindings);
                }
            });
    }
}

// ============================================================================
// Vertex layout
// ============================================================================

/// Format of a single vertex field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
}

impl VertexFormat {
    /// Size of the field in bytes.
    pub fn size(&self) -> u32 {
        match self {
            Self::Float32 | Self::Uint32 => 4,
            Self::Float32x2 => 8,
            Self::Float32x3 => 12,
            Self::Float32x4 => 16,
        }
    }
}

/// One semantic field of a vertex layout, with its byte offset computed
/// when the layout is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexField {
    /// Semantic name (e.g. "POSITION", "NORMAL", "TEXCOORD").
    pub semantic: String,
    /// Field format.
    pub format: VertexFormat,
    /// Byte offset within the vertex.
    pub offset: u32,
}

/// Data-driven vertex layout: an ordered list of semantic fields with
/// byte offsets and the total stride computed once.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexLayout {
    fields: Vec<VertexField>,
    stride: u32,
}

impl VertexLayout {
    /// Build a layout from ordered (semantic, format) pairs.
    pub fn new<'a>(fields: impl IntoIterator<Item = (&'a str, VertexFormat)>) -> Self {
        let mut layout_fields = Vec::new();
        let mut offset = 0;
        for (semantic, format) in fields {
            layout_fields.push(VertexField {
                semantic: semantic.to_string(),
                format,
                offset,
            });
            offset += format.size();
        }
        Self {
            fields: layout_fields,
            stride: offset,
        }
    }

    /// The ordered fields of the layout.
    pub fn fields(&self) -> &[VertexField] {
        &self.fields
    }

    /// Vertex stride in bytes.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Find a field by semantic name.
    pub fn field(&self, semantic: &str) -> Option<&VertexField> {
        self.fields.iter().find(|field| field.semantic == semantic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceState;

    fn location() -> ResourceLocation {
        ResourceLocation {
            resource: Arc::new(Resource::new("uniforms", ResourceState::Common)),
            heap_type: DescriptorHeapType::ShaderResources,
        }
    }

    #[test]
    fn test_argument_equality_and_hash() {
        let a = ProgramArgument::new(ShaderStage::Pixel, "g_texture");
        let b = ProgramArgument::new(ShaderStage::Pixel, "g_texture");
        let c = ProgramArgument::new(ShaderStage::Vertex, "g_texture");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn test_bindings_lookup() {
        let arg = ProgramArgument::new(ShaderStage::All, "g_uniforms");
        let bindings = ProgramBindings::new("cube", [(arg.clone(), location())]);

        assert_eq!(bindings.len(), 1);
        assert!(bindings.get(&arg).is_some());
        assert!(bindings
            .get(&ProgramArgument::new(ShaderStage::All, "g_other"))
            .is_none());
        assert!(!bindings.is_completed());
    }

    #[test]
    fn test_clone_with_replaces_arguments() {
        let arg = ProgramArgument::new(ShaderStage::Pixel, "g_texture");
        let original = ProgramBindings::new("quad", [(arg.clone(), location())]);

        let replacement = ResourceLocation {
            resource: Arc::new(Resource::new("other texture", ResourceState::Common)),
            heap_type: DescriptorHeapType::ShaderResources,
        };
        let replacement_name: String = replacement.resource.name().to_string();
        let cloned = original.clone_with([(arg.clone(), replacement)]);

        assert_eq!(cloned.len(), 1);
        assert_eq!(
            cloned.get(&arg).unwrap().resource.name(),
            replacement_name
        );
        assert_eq!(original.get(&arg).unwrap().resource.name(), "uniforms");
        assert!(!cloned.is_completed());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "without a reserved descriptor range")]
    fn test_complete_requires_descriptor_range() {
        let arg = ProgramArgument::new(ShaderStage::All, "g_uniforms");
        let mut bindings = ProgramBindings::new("unregistered", [(arg, location())]);
        bindings.complete();
    }

    #[test]
    fn test_complete_with_reserved_range() {
        let arg = ProgramArgument::new(ShaderStage::All, "g_uniforms");
        let mut bindings = ProgramBindings::new("registered", [(arg, location())]);
        bindings.set_descriptor_range(DescriptorRange { offset: 0, length: 1 });

        bindings.complete();
        assert!(bindings.is_completed());
    }

    #[test]
    fn test_arena_handle_liveness() {
        let mut arena = ProgramBindingsArena::new();
        let handle = arena.insert(ProgramBindings::new("a", []));

        assert!(arena.contains(handle));
        assert!(arena.get(handle).is_some());

        arena.remove(handle);
        assert!(!arena.contains(handle));
        assert!(arena.get(handle).is_none());
    }

    #[test]
    fn test_arena_stale_handle_after_reuse() {
        let mut arena = ProgramBindingsArena::new();
        let first = arena.insert(ProgramBindings::new("first", []));
        arena.remove(first);

        let second = arena.insert(ProgramBindings::new("second", []));
        // The slot was reused, so the old handle must not resolve.
        assert!(!arena.contains(first));
        assert!(arena.get(first).is_none());
        assert_eq!(arena.get(second).unwrap().name(), "second");
    }

    #[test]
    fn test_arena_parallel_completion() {
        let mut arena = ProgramBindingsArena::new();
        let handles: Vec<_> = (0..16)
            .map(|i| arena.insert(ProgramBindings::new(&format!("bindings {i}"), [])))
            .collect();
        let removed = handles[3];
        arena.remove(removed);

        arena.par_for_each_mut(&handles, |bindings| bindings.complete());

        for handle in handles {
            if handle == removed {
                continue;
            }
            assert!(arena.get(handle).unwrap().is_completed());
        }
    }

    #[test]
    fn test_vertex_layout_offsets() {
        let layout = VertexLayout::new([
            ("POSITION", VertexFormat::Float32x3),
            ("NORMAL", VertexFormat::Float32x3),
            ("TEXCOORD", VertexFormat::Float32x2),
        ]);

        assert_eq!(layout.stride(), 32);
        assert_eq!(layout.field("POSITION").unwrap().offset, 0);
        assert_eq!(layout.field("NORMAL").unwrap().offset, 12);
        assert_eq!(layout.field("TEXCOORD").unwrap().offset, 24);
        assert!(layout.field("COLOR").is_none());
    }
}
