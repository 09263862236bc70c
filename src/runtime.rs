//! Frame loop hosting: runs the engine on one calloop event loop.
//!
//! A timer fires once per frame interval and runs exactly one tick.
//! Tracker samples, geometry passes and control messages arrive on a
//! calloop channel whose `Sender` can live on any thread; the engine and
//! all per-key state stay on the loop's thread. Samples are stamped with
//! the loop clock on arrival and land in the engine's single-slot cell.

use std::time::{Duration, Instant};

use anyhow::anyhow;
use calloop::channel::{self, Sender};
use calloop::timer::{TimeoutAction, Timer};
use calloop::EventLoop;
use tracing::{debug, info};

use super::engine::{EngineState, GazeEngine};
use super::event::EngineEvent;
use super::geometry::Rect;
use super::layout::KeyId;
use super::source::GazeSample;

/// Messages accepted by the frame loop.
#[derive(Debug, Clone)]
pub enum LoopMessage {
    /// Tracker sample; its timestamp is replaced with the arrival time.
    Sample(GazeSample),
    CalibrationComplete,
    /// Renderer geometry pass.
    Geometry(Vec<(KeyId, Rect)>),
    /// User-level reset (interest and tracking).
    Clear,
    Stop,
}

/// State owned by the event loop.
pub struct LoopState {
    pub engine: GazeEngine,
    clock: Instant,
    pending: Vec<EngineEvent>,
    pub running: bool,
}

impl LoopState {
    fn now_s(&self) -> f64 {
        self.clock.elapsed().as_secs_f64()
    }

    fn tick(&mut self) {
        let now = self.now_s();
        let events = self.engine.tick(now);
        self.pending.extend(events);
    }

    fn handle_message(&mut self, msg: LoopMessage) {
        match msg {
            LoopMessage::Sample(mut sample) => {
                sample.timestamp_s = self.now_s();
                self.engine.push_sample(sample);
            }
            LoopMessage::CalibrationComplete => self.engine.calibration_complete(),
            LoopMessage::Geometry(rects) => {
                let unknown = self
                    .engine
                    .update_geometry(rects.iter().map(|(id, r)| (id, *r)));
                debug!("Geometry pass: {} rects, {} unknown", rects.len(), unknown);
            }
            LoopMessage::Clear => self.engine.clear(),
            LoopMessage::Stop => {
                info!("Stop requested");
                self.running = false;
            }
        }
    }
}

/// Engine plus the calloop event loop that drives it.
pub struct FrameLoop {
    event_loop: EventLoop<'static, LoopState>,
    state: LoopState,
    sender: Sender<LoopMessage>,
    frame_interval: Duration,
}

impl FrameLoop {
    /// Start the engine and register the frame timer and message channel.
    pub fn new(mut engine: GazeEngine) -> anyhow::Result<Self> {
        let event_loop = EventLoop::<LoopState>::try_new()?;
        let frame_interval = Duration::from_secs_f64(engine.config().frame_interval);

        event_loop
            .handle()
            .insert_source(Timer::from_duration(frame_interval), move |_, _, state| {
                if state.running {
                    state.tick();
                }
                TimeoutAction::ToDuration(frame_interval)
            })
            .map_err(|e| anyhow!("failed to insert frame timer: {}", e.error))?;

        let (sender, receiver) = channel::channel::<LoopMessage>();
        event_loop
            .handle()
            .insert_source(receiver, |event, _, state| match event {
                channel::Event::Msg(msg) => state.handle_message(msg),
                channel::Event::Closed => debug!("Loop message channel closed"),
            })
            .map_err(|e| anyhow!("failed to insert message channel: {}", e.error))?;

        engine.start();
        info!(
            "Frame loop initialized ({:.1} Hz)",
            1.0 / frame_interval.as_secs_f64()
        );

        Ok(Self {
            event_loop,
            state: LoopState {
                engine,
                clock: Instant::now(),
                pending: Vec::new(),
                running: true,
            },
            sender,
            frame_interval,
        })
    }

    /// Sender for tracker and control messages; clone freely across threads.
    pub fn sender(&self) -> Sender<LoopMessage> {
        self.sender.clone()
    }

    pub fn engine(&self) -> &GazeEngine {
        &self.state.engine
    }

    pub fn engine_mut(&mut self) -> &mut GazeEngine {
        &mut self.state.engine
    }

    /// Dispatch until a `Stop` message or `exit_after` elapses, handing
    /// every engine event to `on_event`. The engine is stopped on return.
    pub fn run<F>(&mut self, exit_after: Option<Duration>, mut on_event: F) -> anyhow::Result<()>
    where
        F: FnMut(&EngineEvent),
    {
        let start = Instant::now();
        let mut last_status_log = Instant::now();
        let status_interval = Duration::from_secs(60);

        while self.state.running {
            if let Some(dur) = exit_after {
                if start.elapsed() >= dur {
                    info!("Exit timer fired after {:.1}s", dur.as_secs_f64());
                    break;
                }
            }

            if last_status_log.elapsed() >= status_interval {
                info!("Engine status: {}", self.state.engine.status_sexp());
                last_status_log = Instant::now();
            }

            self.event_loop
                .dispatch(Some(self.frame_interval), &mut self.state)?;
            for event in self.state.pending.drain(..) {
                on_event(&event);
            }
        }

        self.state.running = false;
        self.state.engine.stop();
        Ok(())
    }
}

/// Run recorded samples through the engine offline, one tick per sample at
/// the sample's timestamp.
pub fn replay(engine: &mut GazeEngine, samples: &[GazeSample]) -> Vec<EngineEvent> {
    if engine.lifecycle() == EngineState::Stopped {
        engine.start();
    }
    engine.calibration_complete();

    let mut events = Vec::new();
    for sample in samples {
        engine.push_sample(*sample);
        events.extend(engine.tick(sample.timestamp_s));
    }
    debug!(
        "Replayed {} samples: {} events",
        samples.len(),
        events.len()
    );
    events
}

// ── Tests ───────────────────────────────────────────────────
