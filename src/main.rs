// Example runner for the `thermal_sentry` library: drives the pipeline with
// synthetic frames (a warm blob drifting across a cold scene) and prints
// every report and emitted message. A real deployment replaces the
// synthetic source with camera capture and the logging sink with a network
// transport.

use std::time::Duration;

use image::{GrayImage, Luma};
use log::info;

use thermal_sentry::{
    DetectionPipeline, EventSink, PipelineConfig, RawFrame, SlotPlacement, StatusEvent, ZoneEvent,
};

struct LoggingSink;

impl EventSink for LoggingSink {
    fn zone_detected(&mut self, event: &ZoneEvent) {
        info!("zone {} active, {} blob(s)", event.zone, event.blob_count);
    }

    fn status(&mut self, event: &StatusEvent) {
        info!("status {}", event.status.code());
    }
}

/// A 64x48 "thermal" frame with a warm square at the given offset.
fn synthetic_frame(x0: u32) -> GrayImage {
    let mut frame = GrayImage::from_pixel(64, 48, Luma([20]));
    for y in 18..26 {
        for x in x0..(x0 + 8).min(64) {
            frame.put_pixel(x, y, Luma([200]));
        }
    }
    frame
}

fn main() {
    env_logger::init();

    let config = PipelineConfig {
        blur_radius: 0,
        threshold: 100,
        max_area: 20_000.0,
        placements: vec![SlotPlacement::default()],
        zones: vec![[(24.0, 0.0), (40.0, 0.0), (40.0, 48.0), (24.0, 48.0)]],
        ..PipelineConfig::default()
    };

    let mut pipeline = DetectionPipeline::new(1);
    if let Err(error) = pipeline.bind_slot(0, 0xA0) {
        eprintln!("failed to bind camera slot: {error}");
        return;
    }

    let mut sink = LoggingSink;
    for tick in 0..48u64 {
        let now = Duration::from_millis(tick * 100);
        let frame = RawFrame {
            device_id: 0xA0,
            gray: synthetic_frame(tick as u32),
        };
        if let Err(error) = pipeline.ingest(frame) {
            eprintln!("dropped frame: {error}");
            continue;
        }

        let report = pipeline.process(&config, now, None, &mut sink);
        info!(
            "t={:>4}ms zone={} blobs={}",
            now.as_millis(),
            report.active_zone,
            report.blobs.len()
        );
    }
}
