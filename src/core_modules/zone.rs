// THEORY:
// Detection zones are the geometric half of the alarm logic: quadrilateral
// regions drawn over the composite canvas, ordered inside-out. Zone 0 is the
// innermost ("danger") region; each higher index is conventionally a larger
// region containing the previous one. Nesting is a configuration convention,
// not something the geometry enforces — the evaluator trusts the index
// order, so an operator who draws non-nested zones gets index-priority
// behavior, not geometric-containment behavior.
//
// The evaluator scans zones from index 0 upward, testing every outline point
// of every blob, and stops at the first hit. The reported active zone is
// therefore always the lowest-indexed zone containing any tracked point.

use crate::core_modules::blob_tracker::Blob;

/// A closed quadrilateral region of the composite canvas.
#[derive(Debug, Clone)]
pub struct DetectionZone {
    /// Position in the inside-out ordering; 0 is the innermost zone.
    pub index: usize,
    vertices: [(f32, f32); 4],
}

impl DetectionZone {
    pub fn new(index: usize, vertices: [(f32, f32); 4]) -> Self {
        Self { index, vertices }
    }

    /// Replaces the quad's corners. The polygon closes itself
    /// (v0 -> v1 -> v2 -> v3 -> v0).
    pub fn set_vertices(&mut self, vertices: [(f32, f32); 4]) {
        self.vertices = vertices;
    }

    pub fn vertices(&self) -> &[(f32, f32); 4] {
        &self.vertices
    }

    /// Even-odd ray-cast containment over the closed outline. Works for
    /// non-convex quads; every zone check in a frame uses this same rule.
    pub fn contains(&self, point: (f32, f32)) -> bool {
        let (px, py) = point;
        let mut inside = false;
        let mut j = self.vertices.len() - 1;
        for i in 0..self.vertices.len() {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[j];
            if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// Inside-out scan of `zones` against every blob outline point. Returns the
/// index of the first (lowest-indexed) zone containing any point, or -1 when
/// nothing is inside any zone. Short-circuits all three loops on the first
/// hit, so zones past the match are never tested.
pub fn active_zone(zones: &[DetectionZone], blobs: &[Blob]) -> i32 {
    for zone in zones {
        for blob in blobs {
            for &point in &blob.outline {
                if zone.contains(point) {
                    return zone.index as i32;
                }
            }
        }
    }
    -1
}
