// THEORY:
// `DetectionPipeline` is the orchestrator: it owns every stage and runs them
// in a fixed order once per tick. Cameras push raw frames in at any rate;
// the owner calls `process` at its own cadence with the current
// configuration, an optional exclusion mask and a monotonic timestamp, and
// gets back a full report of what was detected and what was emitted.
//
// Key architectural principles:
// 1.  **Configuration is injected, never stored.** The pipeline re-reads the
//     whole `PipelineConfig` every tick, so a control surface can retune any
//     knob between frames without touching pipeline internals.
// 2.  **Address-slot indirection.** Cameras are identified by a stable
//     device address and bound to layout slots; frames route by address, so
//     replugging cameras in a different order does not scramble the layout.
// 3.  **Bounded burst absorption.** Incoming frames land in a bounded queue
//     drained oldest-first at the start of each tick. A camera bursting
//     faster than the tick rate costs its own oldest frames, never memory.
// 4.  **Deterministic time.** `now` is a duration since pipeline start
//     supplied by the caller. Nothing in here reads a clock, which is what
//     makes the warmup, staleness and watchdog behavior testable.

use std::collections::VecDeque;
use std::time::Duration;

use image::{imageops, GrayImage};
use log::{debug, warn};

use crate::config::PipelineConfig;
use crate::core_modules::background::BackgroundModel;
use crate::core_modules::blob_tracker::{Blob, BlobTracker};
use crate::core_modules::compositor::{FrameCompositor, SlotPlacement};
use crate::core_modules::morphology;
use crate::core_modules::pixel_statistics::PixelStatistics;
use crate::core_modules::zone::{active_zone, DetectionZone};
use crate::emitter::{EventEmitter, EventSink, StatusEvent, ZoneEvent};
use crate::error::PipelineError;
use crate::supervisor::{apply_filters, WorkerState, WorkerSupervisor};

/// Upper bound on queued frames across all cameras.
const BURST_QUEUE_CAPACITY: usize = 32;

/// One frame as delivered by a camera, tagged with its device address.
pub struct RawFrame {
    pub device_id: u64,
    pub gray: GrayImage,
}

/// Per-slot camera state: the bound address, the most recent frame and the
/// feed-health bookkeeping derived from it.
struct Feed {
    address: Option<u64>,
    latest: Option<GrayImage>,
    stats: PixelStatistics,
    last_frame_at: Option<Duration>,
    /// Instantaneous rate from the last inter-frame gap.
    last_rate: f32,
    /// Two-sample smoothed rate, `(this + last) / 2`.
    frame_rate: f32,
}

impl Feed {
    fn new() -> Self {
        Self {
            address: None,
            latest: None,
            stats: PixelStatistics::new(),
            last_frame_at: None,
            last_rate: 0.0,
            frame_rate: 0.0,
        }
    }

    fn push_frame(&mut self, gray: GrayImage, now: Duration, config: &PipelineConfig) {
        if let Some(last_at) = self.last_frame_at {
            let gap = now.saturating_sub(last_at).as_secs_f32();
            if gap > 0.0 {
                let rate = 1.0 / gap;
                self.frame_rate = (rate + self.last_rate) / 2.0;
                self.last_rate = rate;
            }
        }
        self.last_frame_at = Some(now);

        if config.noise_gate_enabled {
            self.stats.analyze(&gray, config.noise_gate_threshold);
            if self.stats.data_is_bad {
                // Substitute black so a noise burst reads as "no activity"
                // downstream instead of a wall of false foreground.
                debug!(
                    "feed {:?}: noisy frame blacked out (std_dev {:.1})",
                    self.address, self.stats.std_dev
                );
                let (w, h) = gray.dimensions();
                self.latest = Some(GrayImage::new(w, h));
                return;
            }
        }
        self.latest = Some(gray);
    }
}

/// Outcome of one `process` tick.
pub struct FrameReport {
    /// False when the worker had no filtered frame ready this tick; the
    /// detection fields then repeat the previous state.
    pub new_frame: bool,
    /// Lowest-indexed zone containing a blob, or -1.
    pub active_zone: i32,
    pub blobs: Vec<Blob>,
    pub canvas_size: (u32, u32),
    /// Placements actually used this tick, post-trim.
    pub placements: Vec<SlotPlacement>,
    pub zone_event: Option<ZoneEvent>,
    pub status_event: Option<StatusEvent>,
}

impl FrameReport {
    fn idle(status_event: Option<StatusEvent>) -> Self {
        Self {
            new_frame: false,
            active_zone: -1,
            blobs: Vec::new(),
            canvas_size: (0, 0),
            placements: Vec::new(),
            zone_event: None,
            status_event,
        }
    }
}

/// The full detection pipeline, one instance per installation.
pub struct DetectionPipeline {
    feeds: Vec<Feed>,
    queue: VecDeque<RawFrame>,
    compositor: FrameCompositor,
    background: BackgroundModel,
    tracker: BlobTracker,
    emitter: EventEmitter,
    supervisor: WorkerSupervisor,
    last_active_zone: i32,
}

impl DetectionPipeline {
    /// Creates a pipeline with `slots` camera slots, initially unbound.
    pub fn new(slots: usize) -> Self {
        Self {
            feeds: (0..slots).map(|_| Feed::new()).collect(),
            queue: VecDeque::new(),
            compositor: FrameCompositor::new(),
            background: BackgroundModel::new(),
            tracker: BlobTracker::new(),
            emitter: EventEmitter::new(),
            supervisor: WorkerSupervisor::new(),
            last_active_zone: -1,
        }
    }

    /// Binds a device address to a layout slot. Frames from that address
    /// route to the slot from then on.
    pub fn bind_slot(&mut self, slot: usize, device_id: u64) -> Result<(), PipelineError> {
        let slots = self.feeds.len();
        let feed = self
            .feeds
            .get_mut(slot)
            .ok_or(PipelineError::SlotOutOfRange { slot, slots })?;
        feed.address = Some(device_id);
        Ok(())
    }

    /// Queues a frame for the next tick. Fails when no slot is bound to the
    /// frame's device; on queue overflow the oldest queued frame is dropped.
    pub fn ingest(&mut self, frame: RawFrame) -> Result<(), PipelineError> {
        if !self
            .feeds
            .iter()
            .any(|feed| feed.address == Some(frame.device_id))
        {
            return Err(PipelineError::UnknownDevice(frame.device_id));
        }
        if self.queue.len() >= BURST_QUEUE_CAPACITY {
            warn!("frame queue full, dropping oldest frame");
            self.queue.pop_front();
        }
        self.queue.push_back(frame);
        Ok(())
    }

    /// Discard the learned background before the next tick.
    pub fn reset_background(&mut self) {
        self.background.request_reset();
    }

    /// Smoothed frame rate of a slot, in frames per second.
    pub fn slot_frame_rate(&self, slot: usize) -> Option<f32> {
        self.feeds.get(slot).map(|feed| feed.frame_rate)
    }

    /// Learned empty-scene estimate from the last running-background tick.
    pub fn background_image(&self) -> &GrayImage {
        self.background.background()
    }

    /// Runs one full tick: drain queued frames, composite, filter,
    /// background-subtract, clean up, track, evaluate zones and emit.
    ///
    /// `mask` marks canvas regions to exclude from detection (non-zero
    /// pixels are cleared before filtering); it is reconciled to the canvas
    /// size if the layout changed since it was painted.
    pub fn process(
        &mut self,
        config: &PipelineConfig,
        now: Duration,
        mask: Option<&GrayImage>,
        sink: &mut dyn EventSink,
    ) -> FrameReport {
        self.drain_queue(now, config);

        let status_event = self.emit_status(now, config, sink);

        // Gather slots that have delivered at least one frame, paired with
        // their configured placements.
        let mut frames: Vec<GrayImage> = Vec::new();
        let mut placements: Vec<SlotPlacement> = Vec::new();
        for (slot, feed) in self.feeds.iter().enumerate() {
            let Some(latest) = &feed.latest else {
                continue;
            };
            frames.push(latest.clone());
            placements.push(config.placements.get(slot).copied().unwrap_or_default());
        }
        if frames.is_empty() {
            return FrameReport::idle(status_event);
        }

        let composed = self
            .compositor
            .compose(&frames, &placements, config.trim_canvas);
        if composed.resized {
            // Learned pixel geometry is meaningless after a layout change.
            self.background.request_reset();
        }

        let mut canvas = composed.canvas;
        if let Some(mask) = mask {
            apply_exclusion_mask(&mut canvas, mask);
        }

        let processed = if config.use_worker {
            match self.filter_on_worker(&canvas, now, config) {
                Some(frame) => frame,
                None => {
                    // Nothing back from the worker this tick; detection
                    // state stands until a filtered frame arrives.
                    return FrameReport {
                        new_frame: false,
                        active_zone: self.last_active_zone,
                        blobs: Vec::new(),
                        canvas_size: self.compositor.dimensions(),
                        placements: composed.placements,
                        zone_event: None,
                        status_event,
                    };
                }
            }
        } else {
            if self.supervisor.state() != WorkerState::Idle {
                self.supervisor.stop();
            }
            apply_filters(&canvas, config.filter_settings())
        };

        let raw_mask = self.background.update(
            &processed,
            config.background_mode(),
            config.learning_time,
            config.threshold,
        );
        let clean_mask = morphology::apply(&raw_mask, config.erosions, config.dilations);

        let blobs = self
            .tracker
            .find_blobs(&clean_mask, &config.tracker_settings());

        let zones: Vec<DetectionZone> = config
            .zones
            .iter()
            .enumerate()
            .map(|(index, vertices)| DetectionZone::new(index, *vertices))
            .collect();
        let zone = active_zone(&zones, &blobs);
        self.last_active_zone = zone;

        let zone_event = self
            .emitter
            .maybe_emit_zone(zone, blobs.len(), now, &config.emitter);
        if let Some(event) = &zone_event {
            sink.zone_detected(event);
        }

        FrameReport {
            new_frame: true,
            active_zone: zone,
            blobs,
            canvas_size: clean_mask.dimensions(),
            placements: composed.placements,
            zone_event,
            status_event,
        }
    }

    fn drain_queue(&mut self, now: Duration, config: &PipelineConfig) {
        while let Some(frame) = self.queue.pop_front() {
            let Some(feed) = self
                .feeds
                .iter_mut()
                .find(|feed| feed.address == Some(frame.device_id))
            else {
                // Binding removed between ingest and process.
                warn!("dropping frame from unbound device {}", frame.device_id);
                continue;
            };
            feed.push_frame(frame.gray, now, config);
        }
    }

    fn emit_status(
        &mut self,
        now: Duration,
        config: &PipelineConfig,
        sink: &mut dyn EventSink,
    ) -> Option<StatusEvent> {
        let ages: Vec<Duration> = self
            .feeds
            .iter()
            .filter(|feed| feed.address.is_some())
            .map(|feed| match feed.last_frame_at {
                Some(at) => now.saturating_sub(at),
                // Bound but never heard from: stale since the beginning.
                None => now,
            })
            .collect();

        let event = self.emitter.maybe_emit_status(&ages, now, &config.emitter);
        if let Some(event) = &event {
            sink.status(event);
        }
        event
    }

    /// Ships the canvas to the supervised worker and pulls back the most
    /// recent filtered frame, if any. Runs the watchdog as a side effect.
    fn filter_on_worker(
        &mut self,
        canvas: &GrayImage,
        now: Duration,
        config: &PipelineConfig,
    ) -> Option<GrayImage> {
        if self.supervisor.state() == WorkerState::Idle {
            self.supervisor.start(now);
        }
        self.supervisor.tick(now);
        if self.supervisor.take_background_reset() {
            self.background.request_reset();
        }

        self.supervisor.submit(canvas, config.filter_settings());
        self.supervisor.poll(now)
    }
}

/// Clears every canvas pixel the exclusion mask marks. A stale mask painted
/// against an older layout is reconciled by pasting it onto a canvas-sized
/// black buffer at the origin first.
fn apply_exclusion_mask(canvas: &mut GrayImage, mask: &GrayImage) {
    let reconciled;
    let mask = if mask.dimensions() == canvas.dimensions() {
        mask
    } else {
        let (w, h) = canvas.dimensions();
        let mut resized = GrayImage::new(w, h);
        imageops::replace(&mut resized, mask, 0, 0);
        reconciled = resized;
        &reconciled
    };

    for (pixel, mask_pixel) in canvas.pixels_mut().zip(mask.pixels()) {
        if mask_pixel.0[0] > 0 {
            pixel.0[0] = 0;
        }
    }
}
