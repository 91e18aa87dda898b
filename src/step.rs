//! Pending steps and their completion predicates.

use std::collections::HashMap;
use std::fmt;

use log::info;

use crate::runtime::{FrameRef, RuntimeFacade};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    In,
    Over,
    Out,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            StepKind::In => "in",
            StepKind::Over => "over",
            StepKind::Out => "out",
        };
        f.write_str(name)
    }
}

/// One pending step on one thread.
///
/// The origin is unset until the thread wakes from the stop during which the
/// step was requested; it is then filled with the frame and line the thread
/// was parked at, and the step is in effect.
#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub kind: StepKind,
    origin: Option<(FrameRef, u32)>,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Step { kind, origin: None }
    }

    pub fn capture_origin(&mut self, frame: FrameRef, line: u32) {
        self.origin = Some((frame, line));
    }

    /// Whether the origin has been captured and completion can be tested.
    pub fn in_effect(&self) -> bool {
        self.origin.is_some()
    }

    /// Whether the step is complete at the given line event.
    pub fn is_complete(
        &self,
        runtime: &dyn RuntimeFacade,
        current: FrameRef,
        line: u32,
    ) -> bool {
        let (origin, origin_line) = match self.origin {
            Some(origin) => origin,
            None => return false,
        };
        match self.kind {
            // Any line that is not the origin line of the origin frame.
            StepKind::In => current != origin || line != origin_line,
            // Complete once the origin frame is no longer on the stack at
            // its origin line: the call made from that line has returned,
            // or the origin frame itself moved on.
            StepKind::Over => !runtime
                .walk_stack(current)
                .into_iter()
                .any(|frame| frame == origin && runtime.frame_line(frame) == origin_line),
            // Complete once the origin frame has unwound entirely.
            StepKind::Out => !runtime
                .walk_stack(current)
                .into_iter()
                .any(|frame| frame == origin),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Step({})", self.kind)
    }
}

/// Pending steps, keyed by external thread id. At most one per thread.
#[derive(Debug, Default)]
pub struct StepTracker {
    steps: HashMap<i32, Step>,
}

impl StepTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a step on a thread, replacing any step already pending there.
    pub fn begin(&mut self, thread_id: i32, kind: StepKind) {
        self.steps.insert(thread_id, Step::new(kind));
    }

    pub fn get(&self, thread_id: i32) -> Option<&Step> {
        self.steps.get(&thread_id)
    }

    pub fn get_mut(&mut self, thread_id: i32) -> Option<&mut Step> {
        self.steps.get_mut(&thread_id)
    }

    pub fn remove(&mut self, thread_id: i32) -> Option<Step> {
        self.steps.remove(&thread_id)
    }

    pub fn is_pending(&self, thread_id: i32) -> bool {
        self.steps.contains_key(&thread_id)
    }

    /// Abandon pending steps on the given threads, or on all threads.
    pub fn abandon(&mut self, threads: Option<&[i32]>) {
        match threads {
            None => {
                for (thread_id, step) in self.steps.drain() {
                    info!("abandoned {} on Thread({})", step, thread_id);
                }
            }
            Some(threads) => {
                for thread_id in threads {
                    if let Some(step) = self.steps.remove(thread_id) {
                        info!("abandoned {} on Thread({})", step, thread_id);
                    }
                }
            }
        }
    }
}
