// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The vocabulary a routine produces when it suspends.

use crate::handle::FiberHandle;
use crate::phase::Phase;
use crate::routine::Routine;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// The result of advancing a routine by one step.
#[derive(Debug)]
pub enum Step {
    /// The routine suspended and tells the driver what it is waiting for.
    Yield(Wait),
    /// The routine is exhausted.
    Done,
}

impl Step {
    /// Suspends until the next drive of the fiber.
    pub fn next_tick() -> Self {
        Step::Yield(Wait::next_tick())
    }

    /// Suspends for `seconds` of scaled time.
    pub fn wait(seconds: f64) -> Self {
        Step::Yield(Wait::Seconds(seconds))
    }
}

/// Control commands a routine can issue about its own fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Pause the fiber until [`Scheduler::resume`](crate::Scheduler::resume).
    Pause,
    /// Stop the fiber. Its stop callbacks fire.
    Stop,
    /// Step the routine again immediately, inside the same drive.
    Continue,
}

/// What a suspended routine is waiting for.
pub enum Wait {
    /// A duration in seconds of the fiber's scaled time.
    /// Zero or less resumes on the next drive.
    Seconds(f64),
    /// Another fiber. Resolves as soon as that handle stops running, which
    /// includes handles that are already stale.
    Fiber(FiberHandle),
    /// A control command.
    Command(Command),
    /// Resume once, right after the next occurrence of the phase, then go
    /// back to the fiber's own phase.
    Phase(Phase),
    /// Move the fiber to another phase for good.
    SwitchPhase(Phase),
    /// Run a sub-routine to completion before resuming this one.
    Nested(Box<dyn Routine>),
    /// A host-level wait the scheduler polls before every drive.
    External(Box<dyn ExternalWait>),
}

impl Wait {
    /// Resume on the next drive without time accounting.
    pub fn next_tick() -> Self {
        Wait::Seconds(0.0)
    }

    /// Wraps a sub-routine.
    pub fn nested(routine: impl Routine) -> Self {
        Wait::Nested(Box::new(routine))
    }

    /// Wraps an external wait.
    pub fn external(wait: impl ExternalWait) -> Self {
        Wait::External(Box::new(wait))
    }
}

impl fmt::Debug for Wait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Wait::Seconds(seconds) => f.debug_tuple("Seconds").field(seconds).finish(),
            Wait::Fiber(handle) => f.debug_tuple("Fiber").field(handle).finish(),
            Wait::Command(command) => f.debug_tuple("Command").field(command).finish(),
            Wait::Phase(phase) => f.debug_tuple("Phase").field(phase).finish(),
            Wait::SwitchPhase(phase) => f.debug_tuple("SwitchPhase").field(phase).finish(),
            Wait::Nested(_) => f.write_str("Nested(..)"),
            Wait::External(_) => f.write_str("External(..)"),
        }
    }
}

impl From<Command> for Wait {
    fn from(command: Command) -> Self {
        Wait::Command(command)
    }
}

impl From<FiberHandle> for Wait {
    fn from(handle: FiberHandle) -> Self {
        Wait::Fiber(handle)
    }
}

/// A blocking wait owned by the host.
///
/// The scheduler calls [`ExternalWait::is_ready`] before each drive of the
/// waiting fiber and leaves the fiber untouched until it returns `true`.
pub trait ExternalWait: 'static {
    /// Returns `true` once the wait has completed.
    fn is_ready(&mut self) -> bool;
}

impl<F> ExternalWait for F
where
    F: FnMut() -> bool + 'static,
{
    fn is_ready(&mut self) -> bool {
        self()
    }
}

/// Ready once a message is queued or every sender has been dropped, so a worker
/// thread can release a fiber by sending on (or dropping) its end of the channel.
impl<T: 'static> ExternalWait for flume::Receiver<T> {
    fn is_ready(&mut self) -> bool {
        !self.is_empty() || self.is_disconnected()
    }
}

/// A one-shot flag shared between the host and a waiting fiber.
#[derive(Debug, Clone, Default)]
pub struct Signal {
    raised: Rc<Cell<bool>>,
}

impl Signal {
    /// Creates a lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal, releasing every fiber waiting on it.
    pub fn raise(&self) {
        self.raised.set(true);
    }

    /// Returns whether the signal has been raised.
    pub fn is_raised(&self) -> bool {
        self.raised.get()
    }
}

impl ExternalWait for Signal {
    fn is_ready(&mut self) -> bool {
        self.is_raised()
    }
}
