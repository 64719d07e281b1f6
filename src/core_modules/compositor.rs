// THEORY:
// The `FrameCompositor` stitches N independently placed camera feeds into one
// "master" canvas that the rest of the pipeline treats as a single image.
// Each slot carries a signed placement offset, a quarter-turn rotation and a
// mirror flag, so cameras can be mounted in any orientation and arranged
// into arbitrary room layouts.
//
// Key architectural principles:
// 1.  **Union bounds every frame**: the canvas is resized to the bounding box
//     of all placed rectangles on every compose, so moving a camera takes
//     effect immediately. The caller is told when the dimensions changed,
//     because every derived buffer downstream (processed, threshold,
//     background, foreground) must be reallocated and the background model
//     reset — learned pixel geometry is meaningless after a resize.
// 2.  **Same-tick trim**: when trimming is requested and the layout origin
//     has drifted off (0, 0), every placement is shifted uniformly so the
//     top-left of the union lands back on the origin in this compose call,
//     not the next one.
// 3.  **Overwrite paste**: slots are pasted in index order with a plain
//     overwrite. Overlapping placements are last-write-wins; layouts are
//     expected to keep slots disjoint. This is a documented constraint, not
//     a compositing rule.

use image::imageops;
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Quarter-turn rotation applied to a feed before pasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Quarter,
    Half,
    ThreeQuarter,
}

impl Rotation {
    /// Number of clockwise quarter turns.
    pub fn turns(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Quarter => 1,
            Rotation::Half => 2,
            Rotation::ThreeQuarter => 3,
        }
    }

    /// True when the rotation swaps the placed rectangle's width and height.
    pub fn swaps_dimensions(self) -> bool {
        self.turns() % 2 == 1
    }
}

/// Where and how one camera slot lands on the composite canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SlotPlacement {
    /// Top-left offset in canvas coordinates. May be negative; trimming
    /// shifts the whole layout back to a non-negative origin.
    pub position: (i32, i32),
    pub rotation: Rotation,
    /// Horizontal flip, applied before rotation.
    pub mirror: bool,
}

/// Result of one compose pass.
pub struct ComposedFrame {
    pub canvas: GrayImage,
    /// True when the canvas dimensions differ from the previous compose.
    /// The pipeline reallocates derived buffers and resets the background
    /// model when this is set.
    pub resized: bool,
    /// Placements actually used, post-trim. When trimming shifted the
    /// layout the caller's configuration source should adopt these.
    pub placements: Vec<SlotPlacement>,
}

/// Stitches per-camera buffers into a single master canvas.
pub struct FrameCompositor {
    last_dims: (u32, u32),
}

impl Default for FrameCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCompositor {
    pub fn new() -> Self {
        Self { last_dims: (0, 0) }
    }

    /// Canvas dimensions produced by the previous compose.
    pub fn dimensions(&self) -> (u32, u32) {
        self.last_dims
    }

    /// Places every `(frame, placement)` pair into a freshly cleared canvas
    /// sized to the union of all placed rectangles. `frames` and
    /// `placements` correspond by index.
    pub fn compose(
        &mut self,
        frames: &[GrayImage],
        placements: &[SlotPlacement],
        trim: bool,
    ) -> ComposedFrame {
        debug_assert_eq!(frames.len(), placements.len());
        let mut placements = placements.to_vec();

        let mut min_x = i32::MAX;
        let mut min_y = i32::MAX;
        let mut max_x = i32::MIN;
        let mut max_y = i32::MIN;

        for (frame, placement) in frames.iter().zip(&placements) {
            let (w, h) = placed_dimensions(frame, placement);
            let (x, y) = placement.position;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x + w as i32);
            max_y = max_y.max(y + h as i32);
        }

        if frames.is_empty() {
            min_x = 0;
            min_y = 0;
            max_x = 0;
            max_y = 0;
        }

        // Shift the whole layout so the union's top-left sits on the origin.
        // Applying it to max_* too makes the trim visible this frame instead
        // of one compose later.
        if trim && (min_x != 0 || min_y != 0) {
            for placement in &mut placements {
                placement.position.0 -= min_x;
                placement.position.1 -= min_y;
            }
            max_x -= min_x;
            max_y -= min_y;
        }

        let width = max_x.max(0) as u32;
        let height = max_y.max(0) as u32;

        let resized = (width, height) != self.last_dims;
        self.last_dims = (width, height);

        let mut canvas = GrayImage::new(width, height);
        for (frame, placement) in frames.iter().zip(&placements) {
            let oriented = orient(frame, placement);
            let (x, y) = placement.position;
            imageops::replace(&mut canvas, &oriented, i64::from(x), i64::from(y));
        }

        ComposedFrame {
            canvas,
            resized,
            placements,
        }
    }
}

/// Width/height of a frame's placed rectangle, accounting for quarter-turn
/// dimension swapping.
fn placed_dimensions(frame: &GrayImage, placement: &SlotPlacement) -> (u32, u32) {
    if placement.rotation.swaps_dimensions() {
        (frame.height(), frame.width())
    } else {
        (frame.width(), frame.height())
    }
}

/// Applies the slot's mirror then rotation to a feed buffer.
fn orient(frame: &GrayImage, placement: &SlotPlacement) -> GrayImage {
    let mirrored = if placement.mirror {
        imageops::flip_horizontal(frame)
    } else {
        frame.clone()
    };

    match placement.rotation {
        Rotation::None => mirrored,
        Rotation::Quarter => imageops::rotate90(&mirrored),
        Rotation::Half => imageops::rotate180(&mirrored),
        Rotation::ThreeQuarter => imageops::rotate270(&mirrored),
    }
}
