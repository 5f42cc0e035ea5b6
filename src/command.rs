//! Command lists and the command queue.
//!
//! A [`CommandList`] cycles through three states: `Pending` while commands
//! are recorded, `Committed` after [`CommandList::commit`] closes it for
//! recording, and `Executing` once the queue submits it to the GPU. GPU
//! completion returns it to `Pending` for reuse. Every transition is
//! validated; an out-of-order call is an invalid-state error, not UB.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::backend::RenderBackend;
use crate::error::RhiError;
use crate::fence::Fence;
use crate::program::{ApplyBehavior, BindingsHandle};
use crate::resource::{Barriers, Resource, ResourceBarrier, ResourceState};

/// Execution state of a command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandListState {
    /// Open for command recording.
    Pending,
    /// Closed for recording, waiting for queue submission.
    Committed,
    /// Submitted to the GPU for the committed frame.
    Executing,
}

impl CommandListState {
    /// Human-readable state name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Committed => "Committed",
            Self::Executing => "Executing",
        }
    }
}

/// Per-list drawing state retained across commands to skip redundant
/// re-binding.
#[derive(Debug, Default)]
struct DrawingState {
    program_bindings: Option<BindingsHandle>,
}

/// A recorded stream of GPU commands with validated lifecycle.
pub struct CommandList {
    name: Arc<str>,
    state: CommandListState,
    /// Frame buffer index captured at commit time, checked on execution.
    committed_frame_index: u32,
    /// Shared with the owning queue; tracks the current frame buffer.
    frame_buffer_index: Arc<AtomicU32>,
    /// Pool of interned debug group names, so repeated groups reuse one
    /// allocation per distinct name over the list's lifetime.
    debug_group_names: HashSet<Arc<str>>,
    open_debug_groups: Vec<Arc<str>>,
    drawing_state: DrawingState,
    recorded_barriers: Barriers,
    backend: Arc<dyn RenderBackend>,
}

impl CommandList {
    fn new(name: &str, frame_buffer_index: Arc<AtomicU32>, backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            name: Arc::from(name),
            state: CommandListState::Pending,
            committed_frame_index: 0,
            frame_buffer_index,
            debug_group_names: HashSet::new(),
            open_debug_groups: Vec::new(),
            drawing_state: DrawingState::default(),
            recorded_barriers: Barriers::new(),
            backend,
        }
    }

    /// Command list name (for diagnostics).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current execution state.
    pub fn state(&self) -> CommandListState {
        self.state
    }

    /// Check if the list is committed for the given frame and waiting for
    /// execution.
    pub fn is_committed(&self, frame_index: u32) -> bool {
        self.state == CommandListState::Committed && self.committed_frame_index == frame_index
    }

    /// Check if the list is executing the given frame.
    pub fn is_executing(&self, frame_index: u32) -> bool {
        self.state == CommandListState::Executing && self.committed_frame_index == frame_index
    }

    /// Check if the list is executing any frame.
    pub fn is_executing_on_any_frame(&self) -> bool {
        self.state == CommandListState::Executing
    }

    /// Frame buffer index captured at the last commit.
    pub fn committed_frame_index(&self) -> u32 {
        self.committed_frame_index
    }

    /// Barriers recorded since the last reset.
    pub fn recorded_barrier_count(&self) -> usize {
        self.recorded_barriers.len()
    }

    pub(crate) fn expect_state(
        &self,
        expected: CommandListState,
        operation: &str,
    ) -> Result<(), RhiError> {
        if self.state != expected {
            return Err(RhiError::InvalidState(format!(
                "command list '{}' can not {} in {} state",
                self.name,
                operation,
                self.state.name()
            )));
        }
        Ok(())
    }

    /// Begin a new recording cycle, optionally opening a debug group.
    ///
    /// If a different debug group is currently open it is closed first; the
    /// same group stays open across the reset.
    pub fn reset(&mut self, debug_group: Option<&str>) -> Result<(), RhiError> {
        self.expect_state(CommandListState::Pending, "be reset")?;
        log::trace!("Resetting command list '{}'", self.name);

        self.recorded_barriers.clear();
        self.drawing_state = DrawingState::default();

        let group_changed = match (self.open_debug_groups.last(), debug_group) {
            (Some(open), Some(new)) => open.as_ref() != new,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if group_changed {
            self.pop_debug_group()?;
        }
        if let Some(name) = debug_group {
            if self.open_debug_groups.last().map(AsRef::as_ref) != Some(name) {
                self.push_debug_group(name)?;
            }
        }
        Ok(())
    }

    /// Open a named debug group in the command stream.
    pub fn push_debug_group(&mut self, name: &str) -> Result<(), RhiError> {
        self.expect_state(CommandListState::Pending, "open a debug group")?;

        let interned = match self.debug_group_names.get(name) {
            Some(existing) => Arc::clone(existing),
            None => {
                let interned: Arc<str> = Arc::from(name);
                self.debug_group_names.insert(Arc::clone(&interned));
                interned
            }
        };
        self.open_debug_groups.push(interned);
        Ok(())
    }

    /// Close the innermost open debug group.
    pub fn pop_debug_group(&mut self) -> Result<(), RhiError> {
        self.expect_state(CommandListState::Pending, "close a debug group")?;
        if self.open_debug_groups.pop().is_none() {
            return Err(RhiError::DebugGroupUnderflow);
        }
        Ok(())
    }

    /// Number of currently open debug groups.
    pub fn open_debug_group_count(&self) -> usize {
        self.open_debug_groups.len()
    }

    /// Currently open debug groups, outermost first.
    pub fn open_debug_groups(&self) -> &[Arc<str>] {
        &self.open_debug_groups
    }

    /// Bind program bindings for subsequent draw commands.
    ///
    /// With [`ApplyBehavior::CHANGES_ONLY`], re-binding the same handle is
    /// skipped.
    pub fn set_program_bindings(
        &mut self,
        handle: BindingsHandle,
        behavior: ApplyBehavior,
    ) -> Result<(), RhiError> {
        self.expect_state(CommandListState::Pending, "bind program bindings")?;
        if behavior.contains(ApplyBehavior::CHANGES_ONLY)
            && self.drawing_state.program_bindings == Some(handle)
        {
            return Ok(());
        }
        self.drawing_state.program_bindings = Some(handle);
        Ok(())
    }

    /// Currently bound program bindings, if any.
    pub fn program_bindings(&self) -> Option<BindingsHandle> {
        self.drawing_state.program_bindings
    }

    /// Encode a set of resource barriers into the command stream.
    ///
    /// Empty sets are skipped without a backend call.
    pub fn set_resource_barriers(&mut self, barriers: &Barriers) -> Result<(), RhiError> {
        self.expect_state(CommandListState::Pending, "encode resource barriers")?;
        if barriers.is_empty() {
            return Ok(());
        }
        log::trace!(
            "Command list '{}' encoding {} resource barriers",
            self.name,
            barriers.len()
        );
        self.backend.emit_barriers(barriers)?;
        self.recorded_barriers.extend_from(barriers);
        Ok(())
    }

    /// Encode transition barriers moving every resource in the reference
    /// set between the two given states.
    ///
    /// The before/after states are the caller's assertion about the command
    /// stream; tracked resource states are not consulted or mutated here.
    pub fn set_resource_transition_barriers(
        &mut self,
        resources: &[&Resource],
        state_before: ResourceState,
        state_after: ResourceState,
    ) -> Result<(), RhiError> {
        self.expect_state(CommandListState::Pending, "encode resource barriers")?;
        let mut barriers = Barriers::with_capacity(resources.len());
        for resource in resources {
            barriers.push(ResourceBarrier::transition(
                resource.id(),
                Arc::from(resource.name()),
                state_before,
                state_after,
            ));
        }
        self.set_resource_barriers(&barriers)
    }

    /// Close the list for recording, capturing the current frame buffer
    /// index for execution-time validation.
    ///
    /// Any debug groups still open are closed.
    pub fn commit(&mut self) -> Result<(), RhiError> {
        self.expect_state(CommandListState::Pending, "be committed")?;

        self.committed_frame_index = self.frame_buffer_index.load(Ordering::Acquire);
        while !self.open_debug_groups.is_empty() {
            self.pop_debug_group()?;
        }
        self.state = CommandListState::Committed;
        log::trace!(
            "Committed command list '{}' for frame buffer {}",
            self.name,
            self.committed_frame_index
        );
        Ok(())
    }

    /// Mark the list as executing the given frame.
    ///
    /// Called by the queue on submission. The frame must match the one
    /// captured at commit.
    pub fn execute(&mut self, frame_index: u32) -> Result<(), RhiError> {
        self.expect_state(CommandListState::Committed, "be executed")?;
        if frame_index != self.committed_frame_index {
            return Err(RhiError::InvalidState(format!(
                "command list '{}' committed for frame buffer {} can not execute frame buffer {}",
                self.name, self.committed_frame_index, frame_index
            )));
        }
        self.state = CommandListState::Executing;
        Ok(())
    }

    /// Mark GPU execution of the given frame as finished, returning the
    /// list to the pending state.
    pub fn complete(&mut self, frame_index: u32) -> Result<(), RhiError> {
        self.expect_state(CommandListState::Executing, "be completed")?;
        if frame_index != self.committed_frame_index {
            return Err(RhiError::InvalidState(format!(
                "command list '{}' executing frame buffer {} can not complete frame buffer {}",
                self.name, self.committed_frame_index, frame_index
            )));
        }
        self.state = CommandListState::Pending;
        log::trace!(
            "Completed command list '{}' for frame buffer {}",
            self.name,
            frame_index
        );
        Ok(())
    }
}

impl std::fmt::Debug for CommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandList")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("committed_frame_index", &self.committed_frame_index)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(CommandList: Send);

/// Queue submitting committed command lists to the backend.
pub struct CommandQueue {
    name: Arc<str>,
    backend: Arc<dyn RenderBackend>,
    /// Current frame buffer index, shared with every list made from this
    /// queue and advanced by the render context on present.
    frame_buffer_index: Arc<AtomicU32>,
}

impl CommandQueue {
    /// Create a command queue.
    pub fn new(name: &str, backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            name: Arc::from(name),
            backend,
            frame_buffer_index: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Queue name (for diagnostics).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a command list bound to this queue's frame tracking.
    pub fn make_command_list(&self, name: &str) -> CommandList {
        CommandList::new(
            name,
            Arc::clone(&self.frame_buffer_index),
            Arc::clone(&self.backend),
        )
    }

    /// Frame buffer index lists will capture at their next commit.
    pub fn frame_buffer_index(&self) -> u32 {
        self.frame_buffer_index.load(Ordering::Acquire)
    }

    pub(crate) fn set_frame_buffer_index(&self, index: u32) {
        self.frame_buffer_index.store(index, Ordering::Release);
    }

    /// Submit a committed list for GPU execution of the given frame.
    ///
    /// The frame index must match the one the list was committed for, so a
    /// list left over from a stale frame buffer is rejected. The backend
    /// signals `signal_fence` when the GPU finishes the list; the caller
    /// observes the fence and then calls [`CommandList::complete`].
    pub fn execute(
        &self,
        command_list: &mut CommandList,
        frame_index: u32,
        signal_fence: &Fence,
    ) -> Result<(), RhiError> {
        command_list.execute(frame_index)?;
        log::trace!(
            "Queue '{}' executing command list '{}'",
            self.name,
            command_list.name()
        );
        self.backend.submit(command_list.name(), signal_fence)
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("name", &self.name)
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use rstest::rstest;

    fn queue() -> CommandQueue {
        CommandQueue::new("test queue", Arc::new(NullBackend::new()))
    }

    #[test]
    fn test_lifecycle_pending_committed_executing_pending() {
        let queue = queue();
        let mut list = queue.make_command_list("render");
        let fence = Fence::new("frame fence", false);

        assert_eq!(list.state(), CommandListState::Pending);
        list.reset(None).unwrap();
        list.commit().unwrap();
        assert!(list.is_committed(0));
        assert!(!list.is_committed(1));

        queue.execute(&mut list, queue.frame_buffer_index(), &fence).unwrap();
        assert!(list.is_executing(list.committed_frame_index()));
        assert!(list.is_executing_on_any_frame());

        fence.wait();
        list.complete(list.committed_frame_index()).unwrap();
        assert_eq!(list.state(), CommandListState::Pending);
    }

    #[rstest]
    #[case::commit_twice(true, false)]
    #[case::complete_without_execute(false, true)]
    fn test_illegal_transitions(#[case] commit_twice: bool, #[case] complete_early: bool) {
        let queue = queue();
        let mut list = queue.make_command_list("render");
        list.commit().unwrap();

        if commit_twice {
            let err = list.commit().unwrap_err();
            assert!(matches!(err, RhiError::InvalidState(_)));
            assert!(err.to_string().contains("Committed"));
        }
        if complete_early {
            assert!(matches!(
                list.complete(0).unwrap_err(),
                RhiError::InvalidState(_)
            ));
        }
    }

    #[test]
    fn test_reset_requires_pending() {
        let queue = queue();
        let mut list = queue.make_command_list("render");
        list.commit().unwrap();
        assert!(list.reset(None).is_err());
    }

    #[test]
    fn test_recording_rejected_after_commit() {
        let queue = queue();
        let mut list = queue.make_command_list("render");
        list.commit().unwrap();

        assert!(list.push_debug_group("group").is_err());
        assert!(list.set_resource_barriers(&Barriers::new()).is_err());
    }

    #[test]
    fn test_commit_captures_current_frame_buffer_index() {
        let queue = queue();
        let mut list = queue.make_command_list("render");

        queue.set_frame_buffer_index(2);
        list.commit().unwrap();
        assert_eq!(list.committed_frame_index(), 2);
    }

    #[test]
    fn test_execute_frame_mismatch_rejected() {
        let queue = queue();
        let mut list = queue.make_command_list("render");
        queue.set_frame_buffer_index(1);
        list.commit().unwrap();

        let err = list.execute(2).unwrap_err();
        assert!(err.to_string().contains("frame buffer"));
    }

    #[test]
    fn test_queue_rejects_stale_committed_list() {
        let queue = queue();
        let mut list = queue.make_command_list("render");
        let fence = Fence::new("frame fence", false);

        // Committed while frame buffer 0 was current, but the queue has
        // since advanced to frame buffer 1.
        list.commit().unwrap();
        queue.set_frame_buffer_index(1);

        let err = queue
            .execute(&mut list, queue.frame_buffer_index(), &fence)
            .unwrap_err();
        assert!(matches!(err, RhiError::InvalidState(_)));
        assert!(list.is_committed(0));
    }

    #[test]
    fn test_complete_frame_mismatch_rejected() {
        let queue = queue();
        let mut list = queue.make_command_list("render");
        queue.set_frame_buffer_index(1);
        list.commit().unwrap();
        list.execute(1).unwrap();

        assert!(list.complete(0).is_err());
        // Still executing, the right frame can complete it.
        list.complete(1).unwrap();
    }

    #[test]
    fn test_debug_group_balance() {
        let queue = queue();
        let mut list = queue.make_command_list("render");

        list.push_debug_group("outer").unwrap();
        list.push_debug_group("inner").unwrap();
        assert_eq!(list.open_debug_group_count(), 2);

        list.pop_debug_group().unwrap();
        list.pop_debug_group().unwrap();
        assert!(matches!(
            list.pop_debug_group().unwrap_err(),
            RhiError::DebugGroupUnderflow
        ));
    }

    #[test]
    fn test_debug_group_names_interned() {
        let queue = queue();
        let mut list = queue.make_command_list("render");

        list.push_debug_group("draw meshes").unwrap();
        let first = Arc::clone(&list.open_debug_groups()[0]);
        list.pop_debug_group().unwrap();

        // Re-pushing the same name reuses the pooled allocation.
        list.push_debug_group("draw meshes").unwrap();
        assert!(Arc::ptr_eq(&first, &list.open_debug_groups()[0]));
    }

    #[test]
    fn test_commit_closes_open_debug_groups() {
        let queue = queue();
        let mut list = queue.make_command_list("render");

        list.push_debug_group("outer").unwrap();
        list.push_debug_group("inner").unwrap();
        list.commit().unwrap();
        assert_eq!(list.open_debug_group_count(), 0);
    }

    #[test]
    fn test_reset_swaps_debug_group() {
        let queue = queue();
        let mut list = queue.make_command_list("render");

        list.reset(Some("frame 0")).unwrap();
        assert_eq!(list.open_debug_group_count(), 1);

        // Same group stays open.
        list.reset(Some("frame 0")).unwrap();
        assert_eq!(list.open_debug_group_count(), 1);

        // Different group replaces it.
        list.reset(Some("frame 1")).unwrap();
        assert_eq!(list.open_debug_group_count(), 1);

        list.reset(None).unwrap();
        assert_eq!(list.open_debug_group_count(), 0);
    }

    #[test]
    fn test_empty_barrier_set_not_recorded() {
        let queue = queue();
        let mut list = queue.make_command_list("render");

        list.set_resource_barriers(&Barriers::new()).unwrap();
        assert_eq!(list.recorded_barrier_count(), 0);
    }

    #[test]
    fn test_transition_barriers_cover_all_resources() {
        let queue = queue();
        let mut list = queue.make_command_list("render");
        let a = Resource::new("a", ResourceState::Common);
        let b = Resource::new("b", ResourceState::Common);

        list.set_resource_transition_barriers(
            &[&a, &b],
            ResourceState::Common,
            ResourceState::Present,
        )
        .unwrap();

        // One barrier per resource in the reference set; tracked states
        // are left alone.
        assert_eq!(list.recorded_barrier_count(), 2);
        assert_eq!(a.state(), ResourceState::Common);
        assert_eq!(b.state(), ResourceState::Common);
    }

    #[test]
    fn test_transition_barriers_rejected_after_commit() {
        let queue = queue();
        let mut list = queue.make_command_list("render");
        let resource = Resource::new("buffer", ResourceState::Common);
        list.commit().unwrap();

        let err = list
            .set_resource_transition_barriers(
                &[&resource],
                ResourceState::Common,
                ResourceState::Present,
            )
            .unwrap_err();
        assert!(matches!(err, RhiError::InvalidState(_)));
        // The rejected call must not leave any state behind.
        assert_eq!(resource.state(), ResourceState::Common);
        assert_eq!(list.recorded_barrier_count(), 0);
    }

    #[test]
    fn test_changes_only_binding_skip() {
        let queue = queue();
        let mut list = queue.make_command_list("render");
        let mut arena = crate::program::ProgramBindingsArena::new();
        let handle = arena.insert(crate::program::ProgramBindings::new("b", []));

        list.set_program_bindings(handle, ApplyBehavior::ALL_INCREMENTAL)
            .unwrap();
        list.set_program_bindings(handle, ApplyBehavior::ALL_INCREMENTAL)
            .unwrap();
        assert_eq!(list.program_bindings(), Some(handle));
    }
}
