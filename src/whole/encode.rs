// Serializing a whole-state back to a VCDIFF stream.
//
// The instruction stream is cut into windows of at most `window_size`
// target bytes, splitting instructions at the boundary.  Each window's
// source copy window covers `[0, span)` where span is the furthest
// source byte any of its COPYs reads.  Self-copies re-encode as
// window-relative addresses, which only works while the referenced
// bytes live in the same window; a merged delta that back-references
// across the cut is reported as unsupported rather than silently
// mis-encoded, as is any TARGET-frame copy (emitting VCD_TARGET windows
// is not implemented).
//
// Merged output carries no Adler-32: this layer never holds the target
// bytes a checksum would cover.

use std::io::{self, Write};

use crate::vcdiff::encoder::{DeltaWriter, WindowEncoder};
use crate::vcdiff::header::HARD_MAX_WINSIZE;

use super::state::{InstKind, RefFrame, WholeState};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Serialization options.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Maximum target bytes per window.  Clamped to the format's hard
    /// maximum (16 MiB).
    pub window_size: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            window_size: 1 << 23, // 8 MiB
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum EncodeError {
    Io(io::Error),
    Unsupported(String),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Unsupported(msg) => write!(f, "unsupported: {msg}"),
        }
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Unsupported(_) => None,
        }
    }
}

impl From<io::Error> for EncodeError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Serialize `whole` as a VCDIFF stream.  Returns the window count.
///
/// `whole` must be structurally valid (`WholeState::validate`); states
/// built by the decoder or the merge engine always are.
pub fn encode_whole<W: Write>(
    whole: &WholeState,
    writer: W,
    opts: &EncodeOptions,
) -> Result<u64, EncodeError> {
    let window_size = opts.window_size.clamp(1, HARD_MAX_WINSIZE as usize);
    let insts = whole.instructions();
    let mut writer = DeltaWriter::new(writer);

    // Cursor over the instruction stream: instruction index plus byte
    // offset into the current instruction.
    let mut idx = 0usize;
    let mut off = 0usize;
    let mut pos = 0u64;

    while idx < insts.len() {
        let win_base = pos;

        // First pass: decide what fits this window and how far into the
        // source its COPYs reach.
        let mut pieces: Vec<(usize, usize, usize)> = Vec::new();
        let mut src_span = 0u64;
        {
            let (mut idx, mut off) = (idx, off);
            let mut budget = window_size;
            while idx < insts.len() && budget > 0 {
                let inst = &insts[idx];
                let take = (inst.size - off).min(budget);
                if let InstKind::Copy {
                    addr,
                    frame: RefFrame::Source,
                } = inst.kind
                {
                    src_span = src_span.max(addr + (off + take) as u64);
                }
                pieces.push((idx, off, take));
                budget -= take;
                off += take;
                if off == inst.size {
                    idx += 1;
                    off = 0;
                }
            }
        }

        // Second pass: emit.
        let source = (src_span > 0).then_some((src_span, 0));
        let mut we = WindowEncoder::new(source);
        for &(i, o, take) in &pieces {
            let inst = &insts[i];
            match inst.kind {
                InstKind::Run { addr } => {
                    we.run(take as u32, whole.literals()[addr]);
                }
                InstKind::Add { addr } => {
                    we.add(whole.literal_slice(addr + o, take));
                }
                InstKind::Copy { addr, frame } => match frame {
                    RefFrame::Source => {
                        we.copy(take as u32, addr + o as u64);
                    }
                    RefFrame::Output => {
                        let tgt = addr + o as u64;
                        if tgt < win_base {
                            return Err(EncodeError::Unsupported(format!(
                                "self-referential copy at output offset {} reaches back across \
                                 the window boundary at {win_base}; increase the window size",
                                inst.position + o as u64,
                            )));
                        }
                        we.copy(take as u32, src_span + (tgt - win_base));
                    }
                    RefFrame::Target => {
                        return Err(EncodeError::Unsupported(
                            "re-encoding VCD_TARGET-frame copies is not implemented".to_string(),
                        ));
                    }
                },
            }

            off = o + take;
            idx = i;
            pos += take as u64;
        }
        if off == insts[idx].size {
            idx += 1;
            off = 0;
        }

        writer.write_window(we.finish(None))?;
    }

    let windows = writer.windows_written();
    writer.finish()?;
    Ok(windows)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
