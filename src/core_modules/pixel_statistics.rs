// THEORY:
// `PixelStatistics` is the noise-floor detector for a single camera feed. A
// thermal sensor pointed at a mostly uniform scene produces a sharply peaked
// intensity histogram: nearly all pixels land in a handful of bins. A noisy or
// half-disconnected sensor smears its samples across the whole 0..255 range,
// flattening the histogram. The metric exploited here is therefore the
// standard deviation of histogram *bin occupancy counts*, not the standard
// deviation of pixel intensities.
//
// That distinction is deliberate and load-bearing: the bad-frame threshold
// shipped with existing installations (default 300.0) was tuned against this
// exact formula, including its integer division when averaging bins. Do not
// replace it with a conventional per-pixel standard deviation.

use image::GrayImage;

/// One bin per possible 8-bit pixel value.
pub const HISTOGRAM_BINS: usize = 256;

/// Per-feed histogram analyzer. Recomputed from scratch every call; holds no
/// cross-frame state beyond the last snapshot.
pub struct PixelStatistics {
    /// Occupancy count per pixel value.
    bins: [i64; HISTOGRAM_BINS],
    /// Mean pixel intensity of the last analyzed frame.
    pub mean: f64,
    /// Mean of the per-bin squared deviations from the average bin occupancy.
    pub avg_variance: f64,
    /// Square root of `avg_variance`; the noise-floor metric.
    pub std_dev: f64,
    /// True when `std_dev` fell below the configured threshold.
    pub data_is_bad: bool,
}

impl Default for PixelStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelStatistics {
    pub fn new() -> Self {
        Self {
            bins: [0; HISTOGRAM_BINS],
            mean: 0.0,
            avg_variance: 0.0,
            std_dev: 0.0,
            data_is_bad: false,
        }
    }

    /// Rebuilds the histogram for `pix` and refreshes every derived metric.
    /// `threshold` is the bad-data cutoff: `std_dev` below it flags the frame.
    pub fn analyze(&mut self, pix: &GrayImage, threshold: f64) {
        self.bins = [0; HISTOGRAM_BINS];
        self.data_is_bad = false;

        let samples = pix.as_raw();
        if samples.is_empty() {
            self.mean = 0.0;
            self.avg_variance = 0.0;
            self.std_dev = 0.0;
            return;
        }

        let mut sum: i64 = 0;
        for &v in samples {
            sum += i64::from(v);
            self.bins[v as usize] += 1;
        }
        self.mean = sum as f64 / samples.len() as f64;

        // Average occupancy per bin, with the same integer truncation the
        // shipped threshold was tuned against.
        let avg_per_bin: i64 = samples.len() as i64 / HISTOGRAM_BINS as i64;

        let mut variance_sum = 0.0;
        for &count in &self.bins {
            let dev = (count - avg_per_bin) as f64;
            variance_sum += dev * dev;
        }
        self.avg_variance = variance_sum / HISTOGRAM_BINS as f64;
        self.std_dev = self.avg_variance.sqrt();

        self.data_is_bad = self.std_dev < threshold;
    }

    /// Occupancy counts of the last analyzed frame.
    pub fn histogram(&self) -> &[i64; HISTOGRAM_BINS] {
        &self.bins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[test]
    fn histogram_counts_sum_to_pixel_count() {
        let mut img = GrayImage::new(100, 100);
        for (i, p) in img.pixels_mut().enumerate() {
            p.0[0] = (i % 251) as u8;
        }

        let mut stats = PixelStatistics::new();
        stats.analyze(&img, 300.0);

        let total: i64 = stats.histogram().iter().sum();
        assert_eq!(total, 100 * 100);
        assert!(stats.std_dev >= 0.0);
    }

    #[test]
    fn flat_buffer_std_dev_is_independent_of_level() {
        let mut stats = PixelStatistics::new();

        let dark = GrayImage::from_pixel(64, 48, image::Luma([3u8]));
        stats.analyze(&dark, 300.0);
        let dark_std_dev = stats.std_dev;

        let bright = GrayImage::from_pixel(64, 48, image::Luma([250u8]));
        stats.analyze(&bright, 300.0);

        // Every pixel lands in one bin either way, so the bin-occupancy
        // spread is identical regardless of which bin it is.
        assert_eq!(stats.std_dev, dark_std_dev);
    }

    #[test]
    fn flat_buffer_reads_as_peaked_not_noisy() {
        // A uniform frame is maximally peaked: one bin holds everything.
        // The occupancy spread is therefore at its maximum, far above any
        // sane noise threshold.
        let img = GrayImage::from_pixel(206, 156, image::Luma([128u8]));
        let mut stats = PixelStatistics::new();
        stats.analyze(&img, 300.0);
        assert!(!stats.data_is_bad);
        assert_eq!(stats.mean, 128.0);
    }

    #[test]
    fn evenly_spread_frame_trips_the_noise_gate() {
        // Pixels spread evenly over all 256 values: every bin sits at the
        // average occupancy, so the deviation collapses toward zero.
        let mut img = GrayImage::new(256, 64);
        for (x, _y, p) in img.enumerate_pixels_mut() {
            p.0[0] = x as u8;
        }

        let mut stats = PixelStatistics::new();
        stats.analyze(&img, 300.0);
        assert_eq!(stats.std_dev, 0.0);
        assert!(stats.data_is_bad);
    }
}
