// THEORY:
// Post-threshold cleanup. Erosion passes eat away single-pixel speckle that
// survives background subtraction; dilation passes then grow the surviving
// regions back so genuine objects keep their footprint. The order is fixed
// (erode first, then dilate) and each pass runs on the previous pass's
// output, matching how operators tune these counts in the field: raise
// erosions until the speckle dies, then raise dilations until blobs stop
// fragmenting.

use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};

/// Upper bound on either pass count; configuration clamps into 0..=10.
pub const MAX_PASSES: u32 = 10;

/// Applies `erosions` erosion passes followed by `dilations` dilation passes
/// to a binary mask. Each pass uses a 3x3 structuring element. Zero passes
/// of both kinds returns the input unchanged.
pub fn apply(mask: &GrayImage, erosions: u32, dilations: u32) -> GrayImage {
    let erosions = erosions.min(MAX_PASSES);
    let dilations = dilations.min(MAX_PASSES);

    if erosions == 0 && dilations == 0 {
        return mask.clone();
    }

    let mut out = mask.clone();
    for _ in 0..erosions {
        out = erode(&out, Norm::LInf, 1);
    }
    for _ in 0..dilations {
        out = dilate(&out, Norm::LInf, 1);
    }
    out
}
