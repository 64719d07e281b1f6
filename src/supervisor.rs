// THEORY:
// The `WorkerSupervisor` owns the one piece of the pipeline that runs off
// the main thread: the blur + contrast filter pass over the composite
// canvas. Filtering is the most expensive per-frame stage, and a wedged or
// panicked filter must never take the detection loop down with it.
//
// Key architectural principles:
// 1.  **Channels are the only shared state.** The worker receives jobs and
//     returns frames over bounded crossbeam channels; no locks, no shared
//     buffers. Dropping both channel ends is also how the worker is told to
//     exit.
// 2.  **Watchdog by silence.** The supervisor never inspects the worker; it
//     watches how long it has gone without a returned frame. Past the
//     timeout the worker is declared crashed, stopped exactly once, and a
//     replacement is spawned after a holdoff.
// 3.  **Restart hygiene.** A replacement worker starts against fresh
//     channels, and the supervisor flags that the background model must be
//     re-primed: frames lost during the outage mean the learned scene can
//     no longer be trusted.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;
use log::{info, warn};

/// Silence longer than this marks the worker crashed.
const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(6);
/// Minimum wait after a crash before spawning a replacement.
const RESTART_HOLDOFF: Duration = Duration::from_secs(4);
/// A respawned worker must return its first frame within this window or it
/// is declared crashed again.
const LIVENESS_GRACE: Duration = Duration::from_secs(3);
/// In-flight job/result capacity; beyond this the main loop skips submission.
const CHANNEL_CAPACITY: usize = 4;

/// Filter parameters shipped with each job so the worker never reads
/// configuration concurrently with the main loop.
#[derive(Debug, Clone, Copy)]
pub struct FilterSettings {
    /// Gaussian blur radius in pixels; 0 disables the blur.
    pub blur_radius: u32,
    /// Exponent of the contrast curve; 1.0 is identity.
    pub contrast_exp: f32,
    /// Pre-exponent offset of the contrast curve; 0.0 is identity.
    pub contrast_phase: f32,
}

/// One unit of work: a composite canvas plus the settings to filter it with.
struct FilterJob {
    canvas: GrayImage,
    settings: FilterSettings,
}

/// Supervisor-visible lifecycle of the filter worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No worker running and none wanted.
    Idle,
    /// Worker alive and recently heard from.
    Running,
    /// Watchdog fired; waiting out the restart holdoff.
    Crashed,
    /// Replacement spawned, not yet confirmed by a returned frame.
    Restarting,
}

struct WorkerHandle {
    jobs: Sender<FilterJob>,
    frames: Receiver<GrayImage>,
    join: JoinHandle<()>,
}

/// Runs the filter pass on a supervised thread and restarts it when it
/// stops responding. All `now` values are durations since pipeline start.
pub struct WorkerSupervisor {
    state: WorkerState,
    worker: Option<WorkerHandle>,
    last_frame_at: Option<Duration>,
    spawned_at: Option<Duration>,
    crashed_at: Option<Duration>,
    background_reset_pending: bool,
}

impl Default for WorkerSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerSupervisor {
    pub fn new() -> Self {
        Self {
            state: WorkerState::Idle,
            worker: None,
            last_frame_at: None,
            spawned_at: None,
            crashed_at: None,
            background_reset_pending: false,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// True once after a restart completes; the caller must re-prime the
    /// background model before trusting detections again.
    pub fn take_background_reset(&mut self) -> bool {
        std::mem::take(&mut self.background_reset_pending)
    }

    /// Spawns the worker if none is running.
    pub fn start(&mut self, now: Duration) {
        if self.worker.is_some() {
            return;
        }
        self.worker = Some(spawn_worker());
        self.spawned_at = Some(now);
        self.last_frame_at = None;
        if self.state != WorkerState::Restarting {
            self.state = WorkerState::Running;
        }
        info!("filter worker spawned");
    }

    /// Stops the worker by closing its channels and detaching the thread.
    /// Safe to call in any state; stopping twice is a no-op.
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        // Dropping the sender ends the worker's recv loop; drain any frames
        // still in flight so the worker's final send cannot block.
        drop(handle.jobs);
        while handle.frames.try_recv().is_ok() {}
        drop(handle.frames);
        // A wedged thread never joins; detach rather than block the loop.
        drop(handle.join);
        self.state = WorkerState::Idle;
        self.last_frame_at = None;
        self.spawned_at = None;
    }

    /// Submits the canvas for filtering. Returns false when the queue is
    /// full or the worker is not accepting work; the caller skips the frame.
    pub fn submit(&mut self, canvas: &GrayImage, settings: FilterSettings) -> bool {
        let Some(handle) = &self.worker else {
            return false;
        };
        handle
            .jobs
            .try_send(FilterJob {
                canvas: canvas.clone(),
                settings,
            })
            .is_ok()
    }

    /// Pulls at most one filtered frame. A frame arriving while restarting
    /// confirms the replacement worker is alive.
    pub fn poll(&mut self, now: Duration) -> Option<GrayImage> {
        let handle = self.worker.as_ref()?;
        match handle.frames.try_recv() {
            Ok(frame) => {
                self.last_frame_at = Some(now);
                if self.state == WorkerState::Restarting {
                    info!("filter worker restarted and responding");
                    self.state = WorkerState::Running;
                }
                Some(frame)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                // Worker thread exited on its own; treat like a watchdog hit.
                self.declare_crashed(now);
                None
            }
        }
    }

    /// Advances the watchdog and restart state machine.
    pub fn tick(&mut self, now: Duration) {
        match self.state {
            WorkerState::Idle => {}
            WorkerState::Running | WorkerState::Restarting => {
                if self.silent_too_long(now) {
                    self.declare_crashed(now);
                }
            }
            WorkerState::Crashed => {
                let since_crash = self
                    .crashed_at
                    .map_or(Duration::ZERO, |at| now.saturating_sub(at));
                if since_crash >= RESTART_HOLDOFF {
                    self.state = WorkerState::Restarting;
                    self.start(now);
                    self.background_reset_pending = true;
                }
            }
        }
    }

    fn silent_too_long(&self, now: Duration) -> bool {
        if let Some(frame) = self.last_frame_at {
            return now.saturating_sub(frame) > WATCHDOG_TIMEOUT;
        }
        let Some(spawn) = self.spawned_at else {
            return false;
        };
        // Never heard from: a fresh worker gets the full timeout from its
        // spawn, but a replacement must prove itself within the shorter
        // liveness window.
        let allowance = if self.state == WorkerState::Restarting {
            LIVENESS_GRACE
        } else {
            WATCHDOG_TIMEOUT
        };
        now.saturating_sub(spawn) > allowance
    }

    fn declare_crashed(&mut self, now: Duration) {
        if self.state == WorkerState::Crashed {
            return;
        }
        warn!("filter worker unresponsive, stopping it");
        self.stop();
        self.state = WorkerState::Crashed;
        self.crashed_at = Some(now);
    }
}

impl Drop for WorkerSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_worker() -> WorkerHandle {
    let (job_tx, job_rx) = bounded::<FilterJob>(CHANNEL_CAPACITY);
    let (frame_tx, frame_rx) = bounded::<GrayImage>(CHANNEL_CAPACITY);
    let join = thread::spawn(move || worker_loop(job_rx, frame_tx));
    WorkerHandle {
        jobs: job_tx,
        frames: frame_rx,
        join,
    }
}

/// Worker body: filter every job until the job channel closes.
fn worker_loop(jobs: Receiver<FilterJob>, frames: Sender<GrayImage>) {
    while let Ok(job) = jobs.recv() {
        let filtered = apply_filters(&job.canvas, job.settings);
        if frames.send(filtered).is_err() {
            break;
        }
    }
}

/// The filter pass itself: gaussian blur, then a per-pixel contrast curve
/// `out = clamp(255 * (v/255 + phase)^exp)`. Identity settings short-circuit
/// each stage.
pub fn apply_filters(canvas: &GrayImage, settings: FilterSettings) -> GrayImage {
    let blurred = if settings.blur_radius > 0 {
        gaussian_blur_f32(canvas, settings.blur_radius as f32)
    } else {
        canvas.clone()
    };

    if settings.contrast_exp == 1.0 && settings.contrast_phase == 0.0 {
        return blurred;
    }

    let mut out = blurred;
    for pixel in out.pixels_mut() {
        let v = f32::from(pixel.0[0]) / 255.0 + settings.contrast_phase;
        let curved = 255.0 * v.max(0.0).powf(settings.contrast_exp);
        pixel.0[0] = curved.clamp(0.0, 255.0) as u8;
    }
    out
}
