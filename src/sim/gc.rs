//! Mark-sweep collector for the reference host
//!
//! Phase one (this module) decides reachability. Unreachable objects that
//! carry finalizers move to `Dead`: weak references read empty from here on,
//! but the object and its native data stay put until its finalizers run.
//! Everything else unreachable is freed immediately.

use bitvec::vec::BitVec;

use super::heap::{ObjId, ObjState};
use super::State;
use crate::logging::{log_gc_cycle, trace};

#[derive(Debug, Default)]
pub(crate) struct CollectOutcome {
    pub marked: usize,
    pub freed: usize,
    /// Objects that became unreachable and now await finalization.
    pub queued: Vec<ObjId>,
}

pub(crate) fn collect(state: &mut State) -> CollectOutcome {
    let mut marks: BitVec = BitVec::repeat(false, state.heap.capacity());
    let mut gray: Vec<ObjId> = Vec::with_capacity(64);

    gray.push(state.global);
    gray.extend(state.handles.roots());
    gray.extend(state.refs.roots());
    if let Some(id) = state.exception.as_ref().and_then(|slot| slot.as_object()) {
        gray.push(id);
    }

    let mut marked = 0;
    while let Some(id) = gray.pop() {
        let Some(object) = state.heap.get(id) else {
            continue;
        };
        // Dead objects stay dead even if something still points at them.
        if object.state == ObjState::Dead || marks[id.index as usize] {
            continue;
        }
        marks.set(id.index as usize, true);
        marked += 1;
        object.for_each_child(|child| gray.push(child));
    }

    let unmarked: Vec<ObjId> = state
        .heap
        .ids()
        .filter(|id| !marks[id.index as usize])
        .collect();

    let mut outcome = CollectOutcome {
        marked,
        ..CollectOutcome::default()
    };

    for id in unmarked {
        let Some(object) = state.heap.get_mut(id) else {
            continue;
        };
        match object.state {
            ObjState::Dead => {}
            ObjState::Live if object.is_finalizable() => {
                object.state = ObjState::Dead;
                outcome.queued.push(id);
            }
            ObjState::Live => {
                state.heap.free(id);
                outcome.freed += 1;
            }
        }
    }

    trace!(
        live = state.heap.live_count(),
        handles = state.handles.len(),
        references = state.refs.len(),
        "collector state after sweep"
    );
    log_gc_cycle(outcome.marked, outcome.freed, outcome.queued.len());

    outcome
}
