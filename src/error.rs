// THEORY:
// One error enum for the crate's fallible surface. Most of the pipeline is
// deliberately infallible (a detection loop that can fail per frame is a
// detection loop that silently stops detecting); errors are reserved for
// caller mistakes at the boundary, like addressing a camera slot that does
// not exist.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// A frame arrived from a device no slot is bound to.
    #[error("no camera slot bound to device {0}")]
    UnknownDevice(u64),

    /// A slot index past the configured placement list.
    #[error("camera slot {slot} out of range ({slots} slots configured)")]
    SlotOutOfRange { slot: usize, slots: usize },
}
