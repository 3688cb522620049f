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

// Strata Sandbox
// Loads two simulated scenes under a 60 Hz host loop.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossbeam_channel::Receiver;
use strata_core::PhaseSet;
use strata_scheduler::{
    LoaderEvent, Outcome, Scheduler, SchedulerConfig, Stage, StageContext, StageDef,
    StagePriority, ThreadHooks, ThreadOptions,
};

const FRAME: Duration = Duration::from_millis(16);
const MAX_FRAMES: u32 = 2_000;

/// Stands in for real loading work.
fn simulate_work(micros: u64) {
    std::thread::sleep(Duration::from_micros(micros));
}

/// Builds meshes in batches, then uploads them once all batches are done.
struct MeshBuilder {
    batches: u32,
    built: u32,
}

impl Stage for MeshBuilder {
    fn phases(&self) -> PhaseSet {
        PhaseSet::ALL
    }

    fn before(&mut self, ctx: &StageContext<'_>) -> Outcome {
        log::debug!("{}: allocating {} mesh batches", ctx.thread.id, self.batches);
        Outcome::Done
    }

    fn loop_tick(&mut self, _ctx: &StageContext<'_>) -> Outcome {
        simulate_work(1_500);
        self.built += 1;
        if self.built >= self.batches {
            Outcome::Done
        } else {
            Outcome::PartialProgress(self.built as f32 / self.batches as f32)
        }
    }

    fn after(&mut self, ctx: &StageContext<'_>) -> Outcome {
        log::debug!("{}: uploaded {} batches", ctx.thread.id, self.built);
        Outcome::Done
    }
}

/// A stage waiting on simulated I/O: it polls a frame counter.
fn pending_io(frames: u32) -> impl FnMut(&StageContext<'_>) -> Outcome {
    let mut polled = 0;
    move |_: &StageContext<'_>| {
        polled += 1;
        if polled >= frames {
            Outcome::Done
        } else {
            Outcome::PartialProgress(polled as f32 / frames as f32)
        }
    }
}

fn scene_stages(scene: &str, texture_frames: u32) -> Vec<StageDef> {
    vec![
        StageDef::new("parse")
            .with_relative_size(5.0)
            .with_param(format!("{scene}.json"))
            .before(|ctx: &StageContext<'_>| {
                if let Some(path) = ctx.param::<String>() {
                    log::debug!("{}: parsing {}", ctx.thread.id, path);
                }
                simulate_work(2_000);
                Outcome::Done
            }),
        StageDef::new("textures")
            .with_inputs(["parse"])
            .with_priority(StagePriority::Async)
            .with_relative_size(40.0)
            .loop_tick(pending_io(texture_frames)),
        StageDef::from_stage(
            "meshes",
            MeshBuilder {
                batches: 12,
                built: 0,
            },
        )
        .with_inputs(["parse"])
        .with_relative_size(30.0),
        StageDef::new("navmesh")
            .with_inputs(["meshes"])
            .primary_only()
            .with_relative_size(10.0)
            .before(|_: &StageContext<'_>| {
                simulate_work(3_000);
                Outcome::Complete
            }),
        StageDef::new("audio")
            .with_inputs(["parse"])
            .resource()
            .background()
            .with_relative_size(15.0)
            .loop_tick(pending_io(30)),
        StageDef::new("spawn")
            .with_inputs(["textures", "meshes"])
            .after(|ctx: &StageContext<'_>| {
                log::info!("{}: scene entities spawned", ctx.thread.id);
                Outcome::Done
            }),
    ]
}

fn load_config() -> Result<SchedulerConfig> {
    match std::env::args().nth(1) {
        Some(path) => SchedulerConfig::load(&path)
            .with_context(|| format!("failed to load scheduler config from {path}")),
        None => Ok(SchedulerConfig::default()),
    }
}

fn drain_events(events: &Receiver<LoaderEvent>) {
    for event in events.try_iter() {
        match event {
            LoaderEvent::Progress {
                thread,
                percent,
                elapsed_ms,
            } => log::debug!("[event] {thread}: {percent}% after {elapsed_ms:.1}ms"),
            other => log::info!("[event] {other:?}"),
        }
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    log::info!("Scheduler configuration: {config:?}");

    let (sender, events) = crossbeam_channel::unbounded();
    let mut scheduler = Scheduler::new(config).with_event_sender(sender);

    let main_loaded = Rc::new(Cell::new(false));
    let flag = Rc::clone(&main_loaded);
    let level = scheduler.create_thread(
        scene_stages("level_1", 20),
        ThreadOptions::primary().with_label("level_1"),
        ThreadHooks::new()
            .on_progress(|percent, elapsed_ms| {
                log::info!("level_1: {percent}% ({elapsed_ms:.0}ms)");
            })
            .on_loaded(move |_| flag.set(true)),
    )?;
    let lobby = scheduler.create_thread(
        scene_stages("lobby", 8),
        ThreadOptions {
            skip_resources: true,
            load_hidden: true,
            ..ThreadOptions::default().with_label("lobby")
        },
        ThreadHooks::new().on_complete(|thread, success| {
            log::info!("{thread}: completed (success: {success})");
        }),
    )?;

    let mut frames = 0;
    while !scheduler.is_finished() {
        scheduler.update();
        drain_events(&events);

        frames += 1;
        if frames > MAX_FRAMES {
            bail!("loading did not finish within {MAX_FRAMES} frames");
        }
        std::thread::sleep(FRAME);
    }
    drain_events(&events);

    log::info!(
        "All scenes loaded in {frames} frames (level_1 loaded: {}, lobby: {:?})",
        main_loaded.get(),
        scheduler.thread_status(lobby)
    );
    log::info!("level_1 final status: {:?}", scheduler.thread_status(level));
    Ok(())
}
