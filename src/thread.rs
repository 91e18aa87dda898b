//! The registry of debuggee threads.

use std::collections::HashMap;
use std::fmt;

use log::info;

use crate::exception::ExceptionInfo;
use crate::ids::IdSource;
use crate::runtime::{FrameRef, RuntimeFacade, ThreadRef};

/// A debuggee thread as the client sees it.
pub struct Thread {
    /// The id surfaced in DAP bodies. Stable for the lifetime of the
    /// underlying runtime thread, never reused.
    pub external_id: i32,
    pub handle: ThreadRef,
    pub name: String,
    /// Threads are normally traced; debugger-internal threads are not, and
    /// are never surfaced to the client.
    pub is_traced: bool,
    /// Whether the client has been told about this thread via a
    /// `thread{reason:started}` event.
    pub is_known_to_client: bool,
    /// The topmost runtime frame while the thread is parked inside the
    /// tracer, `None` while it runs.
    pub suspended_frame: Option<FrameRef>,
    /// The exception this thread is stopped on, if the current stop has
    /// reason `exception`.
    pub current_exception: Option<ExceptionInfo>,
}

impl fmt::Display for Thread {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Thread({})", self.external_id)
    }
}

/// Live threads, keyed by runtime handle with a secondary external-id index.
///
/// Threads appear when first observed in a tracing callback and are removed
/// when the runtime reports them ended. The registry never synthesizes
/// threads.
pub struct ThreadRegistry {
    ids: IdSource,
    by_handle: HashMap<ThreadRef, Thread>,
    by_external: HashMap<i32, ThreadRef>,
}

impl ThreadRegistry {
    pub fn new(ids: IdSource) -> Self {
        ThreadRegistry {
            ids,
            by_handle: HashMap::new(),
            by_external: HashMap::new(),
        }
    }

    /// The thread for a runtime handle, created on first observation.
    ///
    /// Returns the thread and whether it just became known to the client
    /// (in which case the caller owes the client a started event).
    pub fn from_runtime(
        &mut self,
        runtime: &dyn RuntimeFacade,
        handle: ThreadRef,
    ) -> (&mut Thread, bool) {
        let mut newly_known = false;
        if !self.by_handle.contains_key(&handle) {
            let is_traced = !runtime.is_debugger_thread(handle);
            let external_id = self.assign_external_id(handle);
            let thread = Thread {
                external_id,
                handle,
                name: runtime.thread_name(handle),
                is_traced,
                // Traced threads become known the moment they are first
                // observed; untraced ones never do.
                is_known_to_client: is_traced,
                suspended_frame: None,
                current_exception: None,
            };
            info!("{} created for runtime thread {:?}", thread, handle);
            self.by_external.insert(external_id, handle);
            self.by_handle.insert(handle, thread);
            newly_known = is_traced;
        }
        (self.by_handle.get_mut(&handle).unwrap(), newly_known)
    }

    /// Thread ids are serialized as JSON numbers, which most clients handle
    /// as 64-bit floats. Native thread ids can be large 64-bit integers, so
    /// an id is used verbatim only if it fits in a positive signed 32-bit
    /// integer and is still free; otherwise a fresh id is allocated.
    fn assign_external_id(&mut self, handle: ThreadRef) -> i32 {
        let native = handle.0;
        if native > 0 && native <= i32::max_value() as u64 {
            let id = native as i32;
            if !self.by_external.contains_key(&id) {
                return id;
            }
        }
        loop {
            let id = self.ids.next_id();
            if !self.by_external.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn get(&self, external_id: i32) -> Option<&Thread> {
        let handle = self.by_external.get(&external_id)?;
        self.by_handle.get(handle)
    }

    pub fn get_mut(&mut self, external_id: i32) -> Option<&mut Thread> {
        let handle = self.by_external.get(&external_id)?;
        self.by_handle.get_mut(handle)
    }

    pub fn by_handle_mut(&mut self, handle: ThreadRef) -> Option<&mut Thread> {
        self.by_handle.get_mut(&handle)
    }

    /// Retire a thread the runtime reported as ended.
    pub fn remove(&mut self, handle: ThreadRef) -> Option<Thread> {
        let thread = self.by_handle.remove(&handle)?;
        self.by_external.remove(&thread.external_id);
        Some(thread)
    }

    /// The threads surfaced to the client.
    pub fn live(&self) -> impl Iterator<Item = &Thread> {
        self.by_handle
            .values()
            .filter(|thread| thread.is_traced && thread.is_known_to_client)
    }

    /// Any live traced thread, preferring the given handle. Used by `pause`
    /// to pick a nominal owner for a stop no thread caused.
    pub fn pick_traced(&self, preferred: Option<ThreadRef>) -> Option<&Thread> {
        if let Some(handle) = preferred {
            if let Some(thread) = self.by_handle.get(&handle) {
                if thread.is_traced {
                    return Some(thread);
                }
            }
        }
        self.by_handle.values().find(|thread| thread.is_traced)
    }
}
