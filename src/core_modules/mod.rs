// THEORY:
// The core modules are the per-frame image processing stages, kept free of
// threading, configuration storage and I/O so each is testable with a bare
// `GrayImage`. The pipeline composes them in a fixed order: statistics,
// compositing, background extraction, morphology, blob tracking, zones.

pub mod background;
pub mod blob_tracker;
pub mod compositor;
pub mod morphology;
pub mod pixel_statistics;
pub mod zone;
