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

//! # Khora Fiber
//!
//! A cooperative, single-threaded scheduler for short-lived resumable units of
//! game logic ("fibers").
//!
//! The host hands the [`Scheduler`] one tick per [`Phase`] per frame. Each tick
//! steps every fiber classified under that phase, in descending priority order,
//! until it produces its next [`Wait`] value. Fibers live in a slot arena and are
//! addressed through generation-tagged [`FiberHandle`]s, so a handle kept past
//! the end of its fiber is simply "not running" rather than dangling.
//!
//! ```no_run
//! use khora_fiber::{routine, Anchor, Phase, Scheduler, Step, Wait};
//!
//! let mut scheduler = Scheduler::default();
//! let mut blinks = 0;
//! scheduler.submit(
//!     Anchor::Scheduler,
//!     routine::from_fn(move |_cx| {
//!         blinks += 1;
//!         Ok(if blinks < 3 { Step::Yield(Wait::Seconds(0.5)) } else { Step::Done })
//!     }),
//! );
//! scheduler.tick(Phase::Update, 1.0 / 60.0).unwrap();
//! ```

#![warn(missing_docs)]

pub mod anchor;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fiber;
pub mod handle;
pub mod nested;
pub mod phase;
pub mod routine;
pub mod scheduler;
pub mod wait;

mod table;

pub use anchor::{Anchor, AnchorId, GroupId, HostAnchor};
pub use config::{FiberOptions, SchedulerConfig};
pub use diagnostics::{FiberStats, WaitReason};
pub use error::{FiberFault, SchedulerError};
pub use handle::FiberHandle;
pub use nested::{Interval, Parallel, Race};
pub use phase::{Lane, Phase};
pub use routine::{FiberContext, Routine};
pub use scheduler::{FiberFilter, FiberView, RunState, Scheduler};
pub use wait::{Command, ExternalWait, Signal, Step, Wait};
