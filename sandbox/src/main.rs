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

// Khora Fiber Sandbox
// A minimal host loop ticking the scheduler phase by phase.

mod timer;

use std::time::Duration;

use anyhow::Result;
use khora_fiber::{
    routine, Anchor, FiberOptions, HostAnchor, Interval, Phase, Race, Scheduler, SchedulerConfig,
    Step, Wait,
};
use timer::FrameTimer;

const FRAMES: u32 = 180;
const FRAME_TIME: Duration = Duration::from_millis(16);

/// Spawns the demo fibers.
fn populate(scheduler: &mut Scheduler, lamp: &HostAnchor) {
    // A door that opens, waits and closes again.
    let mut state = 0;
    scheduler.submit_with(
        Anchor::Scheduler,
        routine::from_fn(move |cx| {
            state += 1;
            match state {
                1 => {
                    log::info!("Door opening (frame {}).", cx.frame());
                    Ok(Step::wait(0.5))
                }
                2 => {
                    log::info!("Door open, closing in one second.");
                    Ok(Step::wait(1.0))
                }
                _ => {
                    log::info!("Door closed (frame {}).", cx.frame());
                    Ok(Step::Done)
                }
            }
        }),
        FiberOptions::named("door"),
    );

    // A lamp that flickers at 4 Hz for as long as its host object lives.
    let mut lit = false;
    scheduler.submit_with(
        lamp,
        Interval::new(
            0.25,
            routine::from_fn(move |_| {
                lit = !lit;
                log::debug!("Lamp {}.", if lit { "on" } else { "off" });
                Ok(Step::next_tick())
            }),
        ),
        FiberOptions::named("lamp"),
    );

    // Whichever comes first: a timeout or a result computed on a worker thread.
    let (tx, rx) = flume::bounded::<u64>(1);
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        let _ = tx.send((1..=20).product());
    });
    let mut rx = Some(rx);
    let mut pending = None;
    let worker = routine::from_fn(move |_| {
        if let Some(rx) = rx.take() {
            pending = Some(rx.clone());
            return Ok(Step::Yield(Wait::external(rx)));
        }
        match pending.as_ref().map(|rx| rx.try_recv()) {
            Some(Ok(value)) => log::info!("Worker finished with {value}."),
            _ => log::warn!("Worker hung up without a result."),
        }
        Ok(Step::Done)
    });
    let race = Race::default()
        .with(worker)
        .with(routine::wait_seconds(2.0));
    let racer = scheduler.submit_with(Anchor::Scheduler, race, FiberOptions::named("race"));
    scheduler.on_complete(racer, |_, handle| log::info!("{handle} settled."));

    // Late-update bookkeeping with a higher priority than anything else.
    scheduler.submit_with(
        Anchor::Scheduler,
        routine::wait_while(|cx| cx.fiber_count() > 1),
        FiberOptions::named("watchdog")
            .with_phase(Phase::LateUpdate)
            .with_priority(10),
    );
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = SchedulerConfig::default().with_fixed_timestep(1.0 / 50.0);
    let mut timer = FrameTimer::new(config.fixed_timestep);
    let mut scheduler = Scheduler::new(config);
    let lamp = HostAnchor::new();
    populate(&mut scheduler, &lamp);

    for frame in 0..FRAMES {
        let (delta, fixed_steps) = timer.begin_frame();
        for _ in 0..fixed_steps {
            scheduler.tick(Phase::FixedUpdate, delta)?;
        }
        scheduler.tick(Phase::Update, delta)?;
        scheduler.tick(Phase::LateUpdate, delta)?;

        if frame == FRAMES / 2 {
            let snapshot = serde_json::to_string_pretty(&scheduler.diagnostics())?;
            log::info!("Fibers at frame {frame}:\n{snapshot}");
            lamp.destroy();
        }
        if scheduler.fiber_count() == 0 {
            log::info!("All fibers finished after {frame} frames.");
            break;
        }
        std::thread::sleep(FRAME_TIME);
    }
    Ok(())
}
