//! InputPipeline: bounded event queue drained by one dedicated I/O thread.
//!
//! # Threads and locks
//!
//! The UI thread calls [`InputPipeline::submit`], which never touches the
//! serial line: it takes the queue lock, queues (or coalesces, or drops) the
//! event and signals the worker.  The worker thread (`kvsm-input`) owns the
//! [`HidEngine`] outright, so keyboard/mouse state and the transport are
//! only ever touched from that one thread.
//!
//! Two independent lock domains exist:
//!
//! 1. the queue lock + condition variable (events, shutdown flag);
//! 2. the status channel, a `tokio::sync::watch` holding the last
//!    [`StatusSnapshot`], written by the worker and read by the UI.
//!
//! The queue lock is never held across a device round trip.
//!
//! # Worker loop
//!
//! ```text
//!            ┌──────────── shutdown flag ───────────► Terminating
//!            │
//! Idle-Waiting ── poll deadline reached ──► Polling ──┐
//!      ▲     │                                        │
//!      │     └── events queued ──► Draining ──────────┤
//!      └──────────────────────────────────────────────┘
//! ```
//!
//! The wait is keyed on an explicit poll deadline rather than on the wait's
//! own timeout, so a steady stream of input neither delays nor multiplies
//! status polls.  While draining, if the newest queued event is motion the
//! worker first waits one short debounce window so a burst can collapse into
//! that slot, then dispatches events one at a time, re-taking the lock for
//! each pop.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use kvsm_core::domain::mouse::clamp_i8;
use kvsm_core::{InputEvent, ReferenceRect, StatusSnapshot};
use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::application::engine::{EngineError, HidEngine};
use crate::application::queue::{Admission, CoalescePolicy, EventQueue, DEFAULT_CAPACITY};
use crate::infrastructure::serial::SerialLink;
use crate::infrastructure::storage::config::PipelineConfig;

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "kvsm-input";

/// Most frames one relative move is split into (±4064 counts per axis).
/// Anything beyond is dropped, which bounds how long a single event can
/// keep the worker from seeing shutdown.
pub const MAX_RELATIVE_FRAMES: usize = 32;

/// Errors from starting the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline already started")]
    AlreadyStarted,

    /// The synchronous status poll done before spawning the worker failed.
    #[error("initial status poll failed: {0}")]
    InitialPoll(#[from] EngineError),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// What happened to a submitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Took a new queue slot.
    Queued,
    /// Merged into the queued motion event.
    Coalesced,
    /// Queue full (or pipeline shut down); the event was discarded.
    Dropped,
}

/// Pipeline tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub capacity: usize,
    /// Status poll period.  Zero disables periodic polling.
    pub status_interval: Duration,
    /// Motion settle window before draining.  Zero disables it.
    pub debounce: Duration,
    pub coalesce: CoalescePolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            status_interval: Duration::from_millis(100),
            debounce: Duration::from_millis(5),
            coalesce: CoalescePolicy::Motion,
        }
    }
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            capacity: cfg.queue_capacity,
            status_interval: cfg.status_interval(),
            debounce: cfg.debounce(),
            coalesce: CoalescePolicy::Motion,
        }
    }
}

// ── Shared state ──────────────────────────────────────────────────────────────

struct QueueState {
    events: EventQueue,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<QueueState>,
    wake: Condvar,
    status: watch::Sender<StatusSnapshot>,
    rect: Mutex<ReferenceRect>,
}

/// Producer-side handle.  Owns the engine until [`start`](Self::start),
/// then owns the worker thread that owns the engine.
pub struct InputPipeline<L: SerialLink + 'static> {
    shared: Arc<Shared>,
    options: PipelineOptions,
    engine: Option<HidEngine<L>>,
    worker: Option<JoinHandle<HidEngine<L>>>,
}

impl<L: SerialLink + 'static> InputPipeline<L> {
    pub fn new(engine: HidEngine<L>, options: PipelineOptions) -> Self {
        let (status, _) = watch::channel(StatusSnapshot::default());
        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                events: EventQueue::new(options.capacity, options.coalesce),
                shutdown: false,
            }),
            wake: Condvar::new(),
            status,
            rect: Mutex::new(ReferenceRect::default()),
        });
        Self {
            shared,
            options,
            engine: Some(engine),
            worker: None,
        }
    }

    /// Polls status once, then spawns the worker thread.
    ///
    /// Events submitted before this call are dispatched as soon as the
    /// worker runs.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InitialPoll`] leaves the pipeline unstarted so the
    /// caller may retry; [`PipelineError::AlreadyStarted`] if called twice.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        let Some(mut engine) = self.engine.take() else {
            return Err(PipelineError::AlreadyStarted);
        };

        match engine.get_status() {
            Ok(status) => {
                self.shared.status.send_replace(status);
            }
            Err(e) => {
                self.engine = Some(engine);
                return Err(PipelineError::InitialPoll(e));
            }
        }

        let worker = Worker {
            engine,
            shared: Arc::clone(&self.shared),
            interval: self.options.status_interval,
            debounce: self.options.debounce,
        };
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run())
            .map_err(PipelineError::Spawn)?;
        self.worker = Some(handle);

        info!(
            capacity = self.options.capacity,
            interval_ms = self.options.status_interval.as_millis() as u64,
            "input pipeline started"
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Queues `event` for the worker without blocking on device I/O.
    pub fn submit(&self, event: InputEvent) -> Submission {
        let mut state = self.shared.queue.lock();
        if state.shutdown {
            return Submission::Dropped;
        }
        match state.events.try_push(event) {
            Ok(admission) => {
                drop(state);
                self.shared.wake.notify_one();
                match admission {
                    Admission::Appended => Submission::Queued,
                    Admission::Coalesced => Submission::Coalesced,
                }
            }
            Err(full) => {
                warn!(event = ?full.0, "input queue full, event dropped");
                Submission::Dropped
            }
        }
    }

    /// Sets the on-screen region used to scale absolute pointer positions.
    pub fn set_reference_rect(&self, rect: ReferenceRect) {
        *self.shared.rect.lock() = rect;
    }

    /// The last successfully polled status.
    pub fn status(&self) -> StatusSnapshot {
        *self.shared.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status().connected
    }

    pub fn is_num_lock(&self) -> bool {
        self.status().num_lock
    }

    pub fn is_caps_lock(&self) -> bool {
        self.status().caps_lock
    }

    pub fn is_scroll_lock(&self) -> bool {
        self.status().scroll_lock
    }

    /// A receiver that is notified whenever a poll returns a different status.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.shared.status.subscribe()
    }

    /// Stops the worker and hands back the engine.
    ///
    /// Idempotent: later calls return `None`.  Also runs on drop.
    pub fn shutdown(&mut self) -> Option<HidEngine<L>> {
        let Some(handle) = self.worker.take() else {
            return self.engine.take();
        };

        self.shared.queue.lock().shutdown = true;
        self.shared.wake.notify_all();

        match handle.join() {
            Ok(engine) => {
                info!("input pipeline stopped");
                Some(engine)
            }
            Err(_) => {
                error!("input worker panicked");
                None
            }
        }
    }
}

impl<L: SerialLink + 'static> Drop for InputPipeline<L> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

enum Wake {
    Shutdown,
    Poll,
    Events,
}

struct Worker<L> {
    engine: HidEngine<L>,
    shared: Arc<Shared>,
    interval: Duration,
    debounce: Duration,
}

impl<L: SerialLink> Worker<L> {
    fn run(mut self) -> HidEngine<L> {
        debug!("input worker running");
        let mut next_poll = self.schedule_after(Instant::now());

        loop {
            match self.next_wake(next_poll) {
                Wake::Shutdown => break,
                Wake::Poll => {
                    self.poll();
                    next_poll = self.schedule_after(Instant::now());
                }
                Wake::Events => self.drain(next_poll),
            }
        }

        debug!("input worker exiting");
        self.engine
    }

    fn schedule_after(&self, from: Instant) -> Option<Instant> {
        (!self.interval.is_zero()).then(|| from + self.interval)
    }

    /// Blocks until there is something to do.  Shutdown wins over a due
    /// poll, which wins over queued events.
    fn next_wake(&self, next_poll: Option<Instant>) -> Wake {
        let mut state = self.shared.queue.lock();
        loop {
            if state.shutdown {
                return Wake::Shutdown;
            }
            if next_poll.is_some_and(|due| Instant::now() >= due) {
                return Wake::Poll;
            }
            if !state.events.is_empty() {
                return Wake::Events;
            }
            match next_poll {
                Some(due) => {
                    self.shared.wake.wait_until(&mut state, due);
                }
                None => self.shared.wake.wait(&mut state),
            }
        }
    }

    fn drain(&mut self, next_poll: Option<Instant>) {
        self.settle_motion(next_poll);

        loop {
            let event = {
                let mut state = self.shared.queue.lock();
                if state.shutdown {
                    return;
                }
                state.events.pop()
            };
            let Some(event) = event else {
                return;
            };
            self.dispatch(event);

            if next_poll.is_some_and(|due| Instant::now() >= due) {
                return;
            }
        }
    }

    /// One bounded wait for a trailing motion burst to coalesce.
    fn settle_motion(&self, next_poll: Option<Instant>) {
        if self.debounce.is_zero() {
            return;
        }
        let mut until = Instant::now() + self.debounce;
        if let Some(due) = next_poll {
            until = until.min(due);
        }

        let mut state = self.shared.queue.lock();
        while state.events.last_is_motion() && !state.shutdown && Instant::now() < until {
            self.shared.wake.wait_until(&mut state, until);
        }
    }

    fn dispatch(&mut self, event: InputEvent) {
        let result = match event {
            InputEvent::KeyDown(usage) => self.engine.key_down(usage).map(drop),
            InputEvent::KeyUp(usage) => self.engine.key_up(usage),
            InputEvent::MouseMove { x, y, relative: true } => {
                self.move_relative(x.round() as i32, y.round() as i32)
            }
            InputEvent::MouseMove { x, y, relative: false } => {
                let rect = *self.shared.rect.lock();
                self.engine.mouse_move_absolute(x, y, &rect)
            }
            InputEvent::MouseButton { button, pressed } => self.engine.mouse_button(button, pressed),
            InputEvent::MouseWheel(delta) => self.engine.mouse_wheel(clamp_i8(delta)),
        };

        if let Err(e) = result {
            warn!(?event, kind = %e.kind(), error = %e, "dispatch failed");
        }
    }

    /// Sends a relative move, split into several frames when a coalesced
    /// delta exceeds the 8-bit range.  At most [`MAX_RELATIVE_FRAMES`] are
    /// sent; the remainder is dropped.
    fn move_relative(&mut self, mut dx: i32, mut dy: i32) -> Result<(), EngineError> {
        for _ in 0..MAX_RELATIVE_FRAMES {
            let (step_x, step_y) = (clamp_i8(dx), clamp_i8(dy));
            self.engine.mouse_move_relative(step_x, step_y)?;
            dx -= i32::from(step_x);
            dy -= i32::from(step_y);
            if dx == 0 && dy == 0 {
                return Ok(());
            }
        }
        debug!(dx, dy, "relative move exceeds split limit, remainder dropped");
        Ok(())
    }

    fn poll(&mut self) {
        match self.engine.get_status() {
            Ok(status) => {
                let changed = self.shared.status.send_if_modified(|current| {
                    if *current == status {
                        return false;
                    }
                    *current = status;
                    true
                });
                if changed {
                    info!(
                        connected = status.connected,
                        num_lock = status.num_lock,
                        caps_lock = status.caps_lock,
                        scroll_lock = status.scroll_lock,
                        "device status changed"
                    );
                }
            }
            Err(e) => warn!(kind = %e.kind(), error = %e, "status poll failed"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
