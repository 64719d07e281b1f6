// THEORY:
// The `BackgroundModel` turns the composite canvas into a binary foreground
// mask. It runs in one of two modes, selected per tick by configuration:
//
// 1.  **Static threshold**: binarize the input at a fixed cutoff, no history.
//     Useful when the empty-scene level is stable and known.
// 2.  **Running background**: learn a per-pixel estimate of the empty scene
//     and subtract it from every new frame. Differencing is fixed
//     brighter-than-background — warm bodies read brighter than an empty
//     room on a thermal sensor, and dark-side deviations are sensor drift,
//     not objects. The estimate adapts with a learning time expressed in
//     frames: larger values adapt slower, so a person standing still takes
//     longer to melt into the background.
//
// Resets are deferred: switching modes, resizing the canvas or an explicit
// request arms a flag that is honored at the start of the next `update`,
// never mid-call, so the owning thread's tick is the only place model state
// changes (see the concurrency notes on `WorkerSupervisor`).

use image::{GrayImage, Luma};
use imageproc::contrast::{threshold, ThresholdType};

/// Foreground extraction mode, chosen per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundMode {
    /// Fixed-cutoff binarization of the input; no learned state.
    StaticThreshold,
    /// Brighter-than-background differencing against a learned estimate.
    RunningBackground,
}

/// Per-pixel running estimate of the empty scene plus the derived
/// foreground/threshold buffers of the most recent update.
pub struct BackgroundModel {
    accumulator: Vec<f32>,
    dims: (u32, u32),
    primed: bool,
    needs_reset: bool,
    last_mode: Option<BackgroundMode>,
    background: GrayImage,
    foreground: GrayImage,
}

impl Default for BackgroundModel {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundModel {
    pub fn new() -> Self {
        Self {
            accumulator: Vec::new(),
            dims: (0, 0),
            primed: false,
            needs_reset: false,
            last_mode: None,
            background: GrayImage::new(0, 0),
            foreground: GrayImage::new(0, 0),
        }
    }

    /// Discard all learned history before the next update.
    pub fn request_reset(&mut self) {
        self.needs_reset = true;
    }

    /// Produces the binary (0/255) foreground mask for `input`.
    ///
    /// `learning_time` is in frames; values below 1 are clamped up. The
    /// threshold compares the brighter-than-background difference in running
    /// mode and the raw pixel value in static mode.
    pub fn update(
        &mut self,
        input: &GrayImage,
        mode: BackgroundMode,
        learning_time: f32,
        threshold_value: u8,
    ) -> GrayImage {
        if self.last_mode != Some(mode) {
            self.needs_reset = true;
            self.last_mode = Some(mode);
        }

        match mode {
            BackgroundMode::StaticThreshold => {
                // Learned state would be stale by the time we switch back.
                self.needs_reset = true;
                self.foreground = input.clone();
                threshold(input, threshold_value, ThresholdType::Binary)
            }
            BackgroundMode::RunningBackground => {
                self.update_running(input, learning_time, threshold_value)
            }
        }
    }

    fn update_running(
        &mut self,
        input: &GrayImage,
        learning_time: f32,
        threshold_value: u8,
    ) -> GrayImage {
        let dims = input.dimensions();
        if self.needs_reset || !self.primed || dims != self.dims {
            self.adopt(input);
        }

        let alpha = 1.0 / learning_time.max(1.0);
        let (width, height) = dims;
        let mut mask = GrayImage::new(width, height);
        let mut foreground = GrayImage::new(width, height);

        for (x, y, pixel) in input.enumerate_pixels() {
            let i = (y * width + x) as usize;
            let bg = self.accumulator[i];
            // Brighter-than-background only; colder deviations are drift.
            let diff = (f32::from(pixel.0[0]) - bg).max(0.0);

            foreground.put_pixel(x, y, Luma([diff.min(255.0) as u8]));
            if diff > f32::from(threshold_value) {
                mask.put_pixel(x, y, Luma([255]));
            }

            self.accumulator[i] = bg + (f32::from(pixel.0[0]) - bg) * alpha;
        }

        self.background = GrayImage::from_fn(width, height, |x, y| {
            let idx = (y * width + x) as usize;
            Luma([self.accumulator[idx].clamp(0.0, 255.0) as u8])
        });
        self.foreground = foreground;

        mask
    }

    /// First frame after a reset adopts the input wholesale.
    fn adopt(&mut self, input: &GrayImage) {
        self.dims = input.dimensions();
        self.accumulator = input.as_raw().iter().map(|&v| f32::from(v)).collect();
        self.primed = true;
        self.needs_reset = false;
    }

    /// Learned empty-scene estimate from the last running-mode update.
    pub fn background(&self) -> &GrayImage {
        &self.background
    }

    /// Brighter-than-background difference from the last update.
    pub fn foreground(&self) -> &GrayImage {
        &self.foreground
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(w: u32, h: u32, v: u8) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([v]))
    }

    #[test]
    fn static_mode_binarizes_without_history() {
        let mut model = BackgroundModel::new();
        let mut img = flat(8, 8, 10);
        img.put_pixel(3, 3, Luma([200]));

        let mask = model.update(&img, BackgroundMode::StaticThreshold, 100.0, 100);

        assert_eq!(mask.get_pixel(3, 3).0[0], 255);
        assert_eq!(mask.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn running_mode_flags_bright_intruder_after_priming() {
        let mut model = BackgroundModel::new();
        let empty = flat(16, 16, 20);

        // Prime on the empty scene; first frame is all background.
        let mask = model.update(&empty, BackgroundMode::RunningBackground, 100.0, 30);
        assert!(mask.as_raw().iter().all(|&v| v == 0));

        let mut occupied = empty.clone();
        occupied.put_pixel(5, 5, Luma([120]));
        let mask = model.update(&occupied, BackgroundMode::RunningBackground, 100.0, 30);

        assert_eq!(mask.get_pixel(5, 5).0[0], 255);
        assert_eq!(mask.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn darker_pixels_never_read_as_foreground() {
        let mut model = BackgroundModel::new();
        let empty = flat(8, 8, 200);
        model.update(&empty, BackgroundMode::RunningBackground, 100.0, 10);

        let dark = flat(8, 8, 10);
        let mask = model.update(&dark, BackgroundMode::RunningBackground, 100.0, 10);
        assert!(mask.as_raw().iter().all(|&v| v == 0));
    }

    #[test]
    fn reset_reprimes_on_next_update() {
        let mut model = BackgroundModel::new();
        model.update(&flat(8, 8, 0), BackgroundMode::RunningBackground, 100.0, 30);

        model.request_reset();

        // Without the reset this bright frame would be all foreground;
        // with it, the frame becomes the new background instead.
        let bright = flat(8, 8, 240);
        let mask = model.update(&bright, BackgroundMode::RunningBackground, 100.0, 30);
        assert!(mask.as_raw().iter().all(|&v| v == 0));
    }

    #[test]
    fn dimension_change_discards_history() {
        let mut model = BackgroundModel::new();
        model.update(&flat(8, 8, 0), BackgroundMode::RunningBackground, 100.0, 30);

        let resized = flat(12, 8, 240);
        let mask = model.update(&resized, BackgroundMode::RunningBackground, 100.0, 30);
        assert!(mask.as_raw().iter().all(|&v| v == 0));
    }

    #[test]
    fn mode_switch_forces_reset() {
        let mut model = BackgroundModel::new();
        model.update(&flat(8, 8, 0), BackgroundMode::RunningBackground, 100.0, 30);
        model.update(&flat(8, 8, 0), BackgroundMode::StaticThreshold, 100.0, 30);

        let bright = flat(8, 8, 240);
        let mask = model.update(&bright, BackgroundMode::RunningBackground, 100.0, 30);
        assert!(mask.as_raw().iter().all(|&v| v == 0));
    }
}
