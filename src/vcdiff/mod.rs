// VCDIFF format layer (RFC 3284).
//
// Byte-compatible with xdelta3's wire format.  This layer deals only in
// windows, sections, and instruction records; the flat delta model and
// the merge algorithm live in `whole` and `merge`.
//
// # Modules
//
// - `varint`        — Base-128 big-endian integers
// - `code_table`    — Default RFC 3284 code table and opcode selection
// - `address_cache` — NEAR/SAME cache for COPY addresses
// - `header`        — File and per-window headers
// - `decoder`       — Window/section reading and instruction iteration
// - `encoder`       — Instruction packing and window emission

pub mod address_cache;
pub mod code_table;
pub mod decoder;
pub mod encoder;
pub mod header;
pub mod varint;

// Re-export key types for convenience.
pub use code_table::Instruction;
pub use decoder::{DecodeError, DeltaReader, InstructionIterator, Sections};
pub use encoder::{DeltaWriter, EncodedWindow, WindowEncoder};
pub use header::{FileHeader, VCDIFF_MAGIC, WindowHeader};
