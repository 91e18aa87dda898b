//! Stack frames and variable containers materialized while threads are
//! suspended.
//!
//! Frames hold references into the runtime's stack and must never outlive
//! their thread's suspension, so they live in a generation-tagged arena: the
//! id handed to the client encodes `(slot, generation)`, and invalidation
//! bumps the slot's generation. A stale id then simply fails to resolve;
//! there is nothing left to dangle.

use std::collections::HashMap;

use crate::dap_type;
use crate::ids::{IdMap, IdSource};
use crate::runtime::{FrameRef, ScopeKind, ValueRef};
use crate::source::Source;

/// A stack frame of a suspended thread.
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub id: i32,
    /// External id of the owning thread.
    pub thread_id: i32,
    pub handle: FrameRef,
    pub source: Source,
    pub line: u32,
    /// Function name, for display.
    pub name: String,
}

impl StackFrame {
    pub fn describe(&self) -> dap_type::StackFrame {
        dap_type::StackFrame {
            id: self.id,
            name: self.name.clone(),
            source: Some(self.source.clone()),
            line: self.line,
            column: 1,
        }
    }
}

const SLOT_BITS: u32 = 16;
const GENERATION_MASK: i32 = (1 << SLOT_BITS) - 1;
const MAX_SLOTS: usize = (i32::max_value() >> SLOT_BITS) as usize;

fn encode(slot: usize, generation: u16) -> i32 {
    ((slot as i32) << SLOT_BITS) | generation as i32
}

struct Slot {
    generation: u16,
    frame: Option<StackFrame>,
}

/// The frames currently materialized for suspended threads.
pub struct FrameArena {
    slots: Vec<Slot>,
    free: Vec<usize>,
    /// Interning index: repeated stack walks return the same frame.
    interned: HashMap<(i32, FrameRef), i32>,
}

impl FrameArena {
    pub fn new() -> Self {
        FrameArena {
            slots: Vec::new(),
            free: Vec::new(),
            interned: HashMap::new(),
        }
    }

    /// The frame already materialized for this runtime frame, if any.
    pub fn lookup(&self, thread_id: i32, handle: FrameRef) -> Option<i32> {
        self.interned.get(&(thread_id, handle)).copied()
    }

    /// Materialize a frame and return its id.
    pub fn insert(
        &mut self,
        thread_id: i32,
        handle: FrameRef,
        source: Source,
        line: u32,
        name: String,
    ) -> i32 {
        if let Some(id) = self.lookup(thread_id, handle) {
            return id;
        }
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                assert!(self.slots.len() < MAX_SLOTS, "frame arena exhausted");
                self.slots.push(Slot {
                    // Generations start at 1 so no frame id is ever 0.
                    generation: 1,
                    frame: None,
                });
                self.slots.len() - 1
            }
        };
        let id = encode(slot, self.slots[slot].generation);
        self.slots[slot].frame = Some(StackFrame {
            id,
            thread_id,
            handle,
            source,
            line,
            name,
        });
        self.interned.insert((thread_id, handle), id);
        id
    }

    /// Resolve a client-provided frame id. Stale ids (from before the owning
    /// thread resumed) fail here because their generation no longer matches.
    pub fn get(&self, id: i32) -> Option<&StackFrame> {
        let slot = self.slots.get((id >> SLOT_BITS) as usize)?;
        if slot.generation as i32 != id & GENERATION_MASK {
            return None;
        }
        slot.frame.as_ref()
    }

    /// Drop every frame owned by a thread. Bumping the generation makes all
    /// previously issued ids for those slots detectably invalid.
    pub fn invalidate_thread(&mut self, thread_id: i32) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let owned = slot
                .frame
                .as_ref()
                .map_or(false, |frame| frame.thread_id == thread_id);
            if owned {
                slot.frame = None;
                slot.generation = slot.generation.wrapping_add(1).max(1);
                self.free.push(index);
            }
        }
        self.interned.retain(|(owner, _), _| *owner != thread_id);
    }
}

impl Default for FrameArena {
    fn default() -> Self {
        Self::new()
    }
}

/// What a `variablesReference` points at: one level of a variable tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKey {
    /// The contents of a frame scope.
    Scope { frame_id: i32, kind: ScopeKind },
    /// The children of a compound value.
    Children { value: ValueRef },
}

/// Variable containers, with ids from the shared [`IdMap`]. Containers are
/// owned by the thread whose frames they derive from and die with them.
pub struct ContainerRegistry {
    map: IdMap<ContainerKey>,
    owners: HashMap<i32, i32>,
}

impl ContainerRegistry {
    pub fn new(ids: IdSource) -> Self {
        ContainerRegistry {
            map: IdMap::new(ids),
            owners: HashMap::new(),
        }
    }

    pub fn intern(&mut self, thread_id: i32, key: ContainerKey) -> i32 {
        let id = self.map.intern(key);
        self.owners.insert(id, thread_id);
        id
    }

    pub fn get(&self, id: i32) -> Option<(i32, ContainerKey)> {
        let key = self.map.to_internal(id)?;
        let thread_id = self.owners.get(&id)?;
        Some((*thread_id, *key))
    }

    pub fn invalidate_thread(&mut self, thread_id: i32) {
        let owners = &self.owners;
        let dropped = self
            .map
            .retain(|id, _| owners.get(&id).copied() != Some(thread_id));
        for id in dropped {
            self.owners.remove(&id);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn source() -> Source {
        Source::from_resolved("/work/app.nt")
    }

    #[test]
    fn interning_returns_the_same_frame() {
        let mut arena = FrameArena::new();
        let a = arena.insert(1, FrameRef(10), source(), 3, "f".to_string());
        let b = arena.insert(1, FrameRef(10), source(), 3, "f".to_string());
        assert_eq!(a, b);

        // Same runtime frame on a different thread is a different frame.
        let c = arena.insert(2, FrameRef(10), source(), 3, "f".to_string());
        assert_ne!(a, c);
    }

    #[test]
    fn ids_resolve_until_invalidated() {
        let mut arena = FrameArena::new();
        let id = arena.insert(1, FrameRef(10), source(), 3, "f".to_string());
        assert_eq!(arena.get(id).unwrap().line, 3);

        arena.invalidate_thread(1);
        assert!(arena.get(id).is_none());
    }

    #[test]
    fn reused_slots_produce_fresh_ids() {
        let mut arena = FrameArena::new();
        let stale = arena.insert(1, FrameRef(10), source(), 3, "f".to_string());
        arena.invalidate_thread(1);

        let fresh = arena.insert(1, FrameRef(10), source(), 4, "f".to_string());
        assert_ne!(stale, fresh);
        assert!(arena.get(stale).is_none());
        assert_eq!(arena.get(fresh).unwrap().line, 4);
    }

    #[test]
    fn invalidation_is_per_thread() {
        let mut arena = FrameArena::new();
        let one = arena.insert(1, FrameRef(10), source(), 3, "f".to_string());
        let two = arena.insert(2, FrameRef(20), source(), 7, "g".to_string());

        arena.invalidate_thread(1);
        assert!(arena.get(one).is_none());
        assert_eq!(arena.get(two).unwrap().line, 7);
    }

    #[test]
    fn no_frame_id_is_zero() {
        let mut arena = FrameArena::new();
        let id = arena.insert(1, FrameRef(10), source(), 3, "f".to_string());
        assert!(id > 0);
    }

    #[test]
    fn containers_die_with_their_thread() {
        let mut containers = ContainerRegistry::new(IdSource::new());
        let scope = containers.intern(
            1,
            ContainerKey::Scope {
                frame_id: 42,
                kind: ScopeKind::Local,
            },
        );
        let children = containers.intern(2, ContainerKey::Children { value: ValueRef(5) });

        containers.invalidate_thread(1);
        assert!(containers.get(scope).is_none());
        assert!(containers.get(children).is_some());
    }

    #[test]
    fn container_interning_is_stable() {
        let mut containers = ContainerRegistry::new(IdSource::new());
        let key = ContainerKey::Scope {
            frame_id: 42,
            kind: ScopeKind::Global,
        };
        assert_eq!(containers.intern(1, key), containers.intern(1, key));
    }
}
