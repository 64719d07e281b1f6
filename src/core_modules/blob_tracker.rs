// THEORY:
// The `BlobTracker` bridges the stateless and stateful halves of the
// pipeline. Per frame it extracts connected foreground components from the
// binary mask ("detections"), then solves the data-association problem:
// which detection is the same physical object as a blob tracked in previous
// frames?
//
// Key architectural principles:
// 1.  **Area gating first**: components outside the configured
//     [min_area, max_area] window are discarded before matching. Tiny
//     components are residual noise; huge ones are lighting/sensor faults.
// 2.  **Greedy nearest-centroid matching**: each existing track claims the
//     nearest unmatched detection within `max_distance` of its last
//     centroid. Greedy local matching (not a global optimal assignment) is
//     sufficient for the sparse, slow-moving scenes this pipeline watches.
// 3.  **Persistence through flicker**: a track that finds no detection this
//     frame is not deleted; it survives unmatched for up to `persistence`
//     frames so a single missed detection does not recycle its label.
//     Labels are never reused.

use std::collections::HashMap;

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::region_labelling::{connected_components, Connectivity};

/// Tunables for one tracking pass, injected per tick.
#[derive(Debug, Clone, Copy)]
pub struct TrackerSettings {
    /// Minimum component pixel area; smaller components are noise.
    pub min_area: f32,
    /// Maximum component pixel area; larger components are faults.
    pub max_area: f32,
    /// Frames an unmatched track survives before its label is dropped.
    pub persistence: u32,
    /// Maximum centroid travel (pixels) for a track to claim a detection.
    pub max_distance: f32,
}

/// A labeled connected foreground component in the current frame.
#[derive(Debug, Clone)]
pub struct Blob {
    /// Stable identity label; persists across frames while the blob is
    /// matched or within its persistence window.
    pub label: u32,
    /// Outer border of the component, in mask coordinates.
    pub outline: Vec<(f32, f32)>,
    /// Mean position of the component's pixels.
    pub centroid: (f32, f32),
    /// Component pixel count.
    pub area: f32,
}

/// A blob's existence over time, including frames where it went unseen.
#[derive(Debug, Clone)]
pub struct TrackedBlob {
    /// Snapshot from the last frame this object was actually detected.
    pub latest: Blob,
    /// Consecutive frames this object has been tracked.
    pub age: u32,
    /// Frames since the object was last matched; 0 when seen this frame.
    pub frames_since_seen: u32,
}

/// Connected-component detection without an identity yet.
struct Detection {
    outline: Vec<(f32, f32)>,
    centroid: (f32, f32),
    area: f32,
}

/// Extracts components per frame and maintains identity across frames.
pub struct BlobTracker {
    tracks: Vec<TrackedBlob>,
    next_label: u32,
}

impl Default for BlobTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobTracker {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            next_label: 0,
        }
    }

    /// Extracts area-filtered components from `mask` and assigns each a
    /// label, reusing existing labels for components matched to live tracks.
    /// Returns the current frame's blobs; lost-but-persisting tracks remain
    /// queryable through [`BlobTracker::tracks`].
    pub fn find_blobs(&mut self, mask: &GrayImage, settings: &TrackerSettings) -> Vec<Blob> {
        let detections = detect_components(mask, settings);

        // --- Matching ---
        // Each track claims the nearest unmatched detection in range.
        let mut claimed = vec![false; detections.len()];
        let mut matches: Vec<(usize, usize)> = Vec::new(); // (track, detection)

        for (t, track) in self.tracks.iter().enumerate() {
            let mut best_distance = settings.max_distance;
            let mut best: Option<usize> = None;

            for (d, detection) in detections.iter().enumerate() {
                if claimed[d] {
                    continue;
                }
                let dx = track.latest.centroid.0 - detection.centroid.0;
                let dy = track.latest.centroid.1 - detection.centroid.1;
                let distance = (dx * dx + dy * dy).sqrt();
                if distance <= best_distance {
                    best_distance = distance;
                    best = Some(d);
                }
            }

            if let Some(d) = best {
                claimed[d] = true;
                matches.push((t, d));
            }
        }

        // --- Lifecycle ---
        let mut blobs: Vec<Blob> = Vec::with_capacity(detections.len());
        let mut updated: Vec<TrackedBlob> = Vec::with_capacity(self.tracks.len());
        let mut matched_tracks = vec![false; self.tracks.len()];
        let mut labels = vec![None; detections.len()];

        for &(t, d) in &matches {
            matched_tracks[t] = true;
            labels[d] = Some(self.tracks[t].latest.label);
        }

        for (d, detection) in detections.into_iter().enumerate() {
            let label = match labels[d] {
                Some(label) => label,
                None => {
                    // Birth: nothing close enough claimed this component.
                    let label = self.next_label;
                    self.next_label += 1;
                    label
                }
            };
            blobs.push(Blob {
                label,
                outline: detection.outline,
                centroid: detection.centroid,
                area: detection.area,
            });
        }

        for blob in &blobs {
            let age = self
                .tracks
                .iter()
                .find(|track| track.latest.label == blob.label)
                .map_or(0, |track| track.age);
            updated.push(TrackedBlob {
                latest: blob.clone(),
                age: age + 1,
                frames_since_seen: 0,
            });
        }

        // Unmatched tracks survive inside the persistence window.
        for (t, track) in self.tracks.iter().enumerate() {
            if matched_tracks[t] {
                continue;
            }
            let mut lost = track.clone();
            lost.frames_since_seen += 1;
            if lost.frames_since_seen <= settings.persistence {
                updated.push(lost);
            }
        }

        self.tracks = updated;
        blobs
    }

    /// All live tracks, including ones unseen for a few frames.
    pub fn tracks(&self) -> &[TrackedBlob] {
        &self.tracks
    }
}

/// Connected-component extraction: pixel-exact area and centroid from a
/// component labeling pass, outer border from contour following.
fn detect_components(mask: &GrayImage, settings: &TrackerSettings) -> Vec<Detection> {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    // Pixel count and coordinate sums per component label.
    let mut stats: HashMap<u32, (u64, f64, f64)> = HashMap::new();
    for (x, y, pixel) in labels.enumerate_pixels() {
        let component = pixel.0[0];
        if component == 0 {
            continue;
        }
        let entry = stats.entry(component).or_insert((0, 0.0, 0.0));
        entry.0 += 1;
        entry.1 += f64::from(x);
        entry.2 += f64::from(y);
    }

    let mut detections = Vec::new();
    for contour in find_contours::<i32>(mask) {
        if contour.border_type != BorderType::Outer || contour.points.is_empty() {
            continue;
        }
        let first = contour.points[0];
        let component = labels.get_pixel(first.x as u32, first.y as u32).0[0];
        let Some(&(count, sum_x, sum_y)) = stats.get(&component) else {
            continue;
        };

        let area = count as f32;
        if area < settings.min_area || area > settings.max_area {
            continue;
        }

        detections.push(Detection {
            outline: contour
                .points
                .iter()
                .map(|p| (p.x as f32, p.y as f32))
                .collect(),
            centroid: ((sum_x / count as f64) as f32, (sum_y / count as f64) as f32),
            area,
        });
    }
    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> TrackerSettings {
        TrackerSettings {
            min_area: 0.0,
            max_area: 20_000.0,
            persistence: 15,
            max_distance: 32.0,
        }
    }

    fn mask_with_square(x0: u32, y0: u32, side: u32) -> GrayImage {
        let mut mask = GrayImage::new(100, 100);
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        mask
    }

    #[test]
    fn single_square_yields_one_centered_blob() {
        let mut tracker = BlobTracker::new();
        let mask = mask_with_square(45, 45, 10);

        let blobs = tracker.find_blobs(&mask, &settings());

        assert_eq!(blobs.len(), 1);
        let blob = &blobs[0];
        assert!((blob.area - 100.0).abs() < f32::EPSILON);
        // Square covers 45..=54; geometric center 49.5.
        assert!((blob.centroid.0 - 49.5).abs() <= 1.0);
        assert!((blob.centroid.1 - 49.5).abs() <= 1.0);
        assert!(!blob.outline.is_empty());
    }

    #[test]
    fn area_filter_discards_out_of_range_components() {
        let mut tracker = BlobTracker::new();
        let mask = mask_with_square(45, 45, 10);

        let mut tight = settings();
        tight.min_area = 200.0;
        assert!(tracker.find_blobs(&mask, &tight).is_empty());

        tight.min_area = 0.0;
        tight.max_area = 50.0;
        assert!(tracker.find_blobs(&mask, &tight).is_empty());
    }

    #[test]
    fn small_motion_keeps_the_label() {
        let mut tracker = BlobTracker::new();
        let settings = settings();

        let first = tracker.find_blobs(&mask_with_square(40, 40, 10), &settings);
        let label = first[0].label;

        // Centroid moves 5 px, well under max_distance.
        let second = tracker.find_blobs(&mask_with_square(45, 40, 10), &settings);
        assert_eq!(second[0].label, label);
        assert_eq!(tracker.tracks().len(), 1);
    }

    #[test]
    fn large_jump_assigns_new_label_and_retains_old_track() {
        let mut tracker = BlobTracker::new();
        let mut config = settings();
        config.persistence = 3;

        let first = tracker.find_blobs(&mask_with_square(5, 5, 10), &config);
        let old_label = first[0].label;

        // 70 px jump, far beyond max_distance: a birth, not a match.
        let second = tracker.find_blobs(&mask_with_square(75, 5, 10), &config);
        assert_ne!(second[0].label, old_label);

        // The old identity lingers for the persistence window...
        assert!(tracker
            .tracks()
            .iter()
            .any(|t| t.latest.label == old_label && t.frames_since_seen == 1));

        // ...and expires once it stays unmatched past it.
        let empty = GrayImage::new(100, 100);
        for _ in 0..config.persistence {
            tracker.find_blobs(&mask_with_square(75, 5, 10), &config);
        }
        tracker.find_blobs(&empty, &config);
        assert!(!tracker.tracks().iter().any(|t| t.latest.label == old_label));
    }

    #[test]
    fn two_separate_squares_get_distinct_labels() {
        let mut tracker = BlobTracker::new();
        let mut mask = mask_with_square(10, 10, 8);
        for y in 60..68 {
            for x in 60..68 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }

        let blobs = tracker.find_blobs(&mask, &settings());
        assert_eq!(blobs.len(), 2);
        assert_ne!(blobs[0].label, blobs[1].label);
    }
}
