// Whole-state deltas: the flat, non-windowed form a delta takes between
// decoding and re-encoding.  Everything the merge engine touches lives
// here.
//
// # Modules
//
// - `state`  — the WholeState buffers and instruction model
// - `append` — building a WholeState from a VCDIFF stream
// - `apply`  — reconstructing target bytes from a WholeState + source
// - `encode` — serializing a WholeState back to VCDIFF

pub mod append;
pub mod apply;
pub mod encode;
pub mod state;

pub use append::{append_window, decode_whole, read_whole};
pub use apply::apply;
pub use encode::{EncodeOptions, encode_whole};
pub use state::{ALLOC_GRANULE, InstKind, RefFrame, WholeInst, WholeState};

// ---------------------------------------------------------------------------
// Error surface of the whole-state layer and the merge engine
// ---------------------------------------------------------------------------

/// Errors from whole-state construction, validation, and merging.
///
/// The taxonomy is three-valued on purpose: allocation failure, bad
/// input, and internal invariant violations that indicate a bug rather
/// than bad data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeError {
    /// Buffer growth failed.  The affected state keeps its previous
    /// contents and still tiles its current length.
    OutOfMemory,
    /// The input delta references data it cannot: the message says what.
    InvalidInput(&'static str),
    /// A structural invariant did not hold.  Unreachable for any
    /// well-formed input; kept as a bug detector.
    Internal(&'static str),
}

impl std::fmt::Display for MergeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeError::OutOfMemory => write!(f, "out of memory"),
            MergeError::InvalidInput(msg) | MergeError::Internal(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for MergeError {}
