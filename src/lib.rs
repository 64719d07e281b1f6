// THEORY:
// This file is the main entry point for the `thermal_sentry` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the
// public API exposed to external consumers (GUI shells, headless runners,
// network transports).
//
// The primary surface is `DetectionPipeline` plus the configuration and
// event types a consumer needs to drive it: push frames in, call `process`
// on a tick, wire an `EventSink` to the outbound messages. The per-stage
// modules under `core_modules` stay public for consumers that want to run a
// single stage in isolation, but the pipeline is the supported entry point.

pub mod config;
pub mod core_modules;
pub mod emitter;
pub mod error;
pub mod pipeline;
pub mod supervisor;

pub use config::PipelineConfig;
pub use core_modules::background::BackgroundMode;
pub use core_modules::blob_tracker::{Blob, TrackedBlob};
pub use core_modules::compositor::{Rotation, SlotPlacement};
pub use emitter::{EmitterConfig, EventSink, StatusEvent, SystemStatus, ZoneEvent};
pub use error::PipelineError;
pub use pipeline::{DetectionPipeline, FrameReport, RawFrame};
pub use supervisor::WorkerState;
