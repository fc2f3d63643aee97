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

//! Error types surfaced by the scheduler.

use crate::handle::FiberHandle;
use crate::phase::Phase;
use thiserror::Error;

/// A failure raised while stepping one fiber.
#[derive(Debug, Error)]
#[error("{} failed: {error:#}", describe(.handle, .name))]
pub struct FiberFault {
    /// The fiber whose step failed. It has been disposed.
    pub handle: FiberHandle,
    /// The fiber's name, if it had one.
    pub name: Option<String>,
    /// The error returned by the routine.
    #[source]
    pub error: anyhow::Error,
}

fn describe(handle: &FiberHandle, name: &Option<String>) -> String {
    match name {
        Some(name) => format!("fiber '{name}' ({handle})"),
        None => handle.to_string(),
    }
}

/// Errors returned by [`Scheduler`](crate::Scheduler) operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The slot arena would grow past the handle index space or the configured
    /// ceiling.
    #[error("fiber capacity exceeded: {requested} slots requested, maximum is {max}")]
    CapacityExceeded {
        /// Number of slots the growth attempt asked for.
        requested: usize,
        /// The configured ceiling.
        max: usize,
    },
    /// A fiber step failed and fault-forwarding was disabled for it.
    #[error(transparent)]
    Fault(#[from] FiberFault),
    /// A phase was ticked while its lists were already being traversed, or the
    /// traversal depth limit was reached.
    #[error("cannot tick phase {phase:?} from inside its own traversal")]
    TraversalRejected {
        /// The phase whose tick was rejected.
        phase: Phase,
    },
}
