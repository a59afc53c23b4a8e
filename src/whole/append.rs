// Building whole-states from VCDIFF streams.
//
// Each decoded window instruction becomes one whole-instruction:
// RUN/ADD literals migrate into the pool, and COPY addresses are
// rewritten from the window's combined address space into an absolute
// reference frame:
//
//   - addresses inside the copy window become source- or target-frame
//     addresses (per the window indicator), offset by the copy window's
//     position in that stream;
//   - addresses past the copy window are window-relative self-copies and
//     become absolute offsets into this delta's own output.
//
// Window checksums are not verified here: nothing materializes the
// target bytes they cover.  `whole::apply` is where bytes exist again.

use std::io::Read;

use crate::vcdiff::decoder::{DecodeError, DeltaReader, InstructionIterator, Sections};
use crate::vcdiff::header::WindowHeader;
use crate::vcdiff::Instruction;

use super::state::{RefFrame, WholeState};
use super::MergeError;

impl From<MergeError> for DecodeError {
    fn from(e: MergeError) -> Self {
        match e {
            MergeError::OutOfMemory => DecodeError::OutOfMemory,
            MergeError::InvalidInput(msg) | MergeError::Internal(msg) => {
                DecodeError::InvalidInput(msg.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-window append
// ---------------------------------------------------------------------------

/// Absorb one decoded window into `whole`.
pub fn append_window(
    whole: &mut WholeState,
    header: &WindowHeader,
    sections: Sections<'_>,
) -> Result<(), DecodeError> {
    let win_start = whole.length();
    let cpylen = header.copy_window_len;
    let copy_frame = if header.copies_from_target() {
        // A target copy window must be carved out of output that
        // already exists.
        if header.copy_window_offset + cpylen > win_start {
            return Err(DecodeError::InvalidInput(
                "target copy window exceeds decoded output".to_string(),
            ));
        }
        RefFrame::Target
    } else {
        RefFrame::Source
    };

    let mut data_pos = 0usize;

    for inst in InstructionIterator::new(sections.inst, sections.addr, cpylen) {
        match inst? {
            Instruction::Run { len } => {
                let &byte = sections.data.get(data_pos).ok_or_else(|| {
                    DecodeError::InvalidInput("data section underflow (RUN)".to_string())
                })?;
                data_pos += 1;
                whole.emit_run(byte, len as usize)?;
            }

            Instruction::Add { len } => {
                let end = data_pos + len as usize;
                let bytes = sections.data.get(data_pos..end).ok_or_else(|| {
                    DecodeError::InvalidInput("data section underflow (ADD)".to_string())
                })?;
                data_pos = end;
                whole.emit_add(bytes)?;
            }

            Instruction::Copy { len, addr, .. } => {
                let len = len as usize;
                if addr < cpylen {
                    if addr + len as u64 > cpylen {
                        return Err(DecodeError::InvalidInput(
                            "copy spans the source/target boundary".to_string(),
                        ));
                    }
                    whole.emit_copy(header.copy_window_offset + addr, len, copy_frame)?;
                } else {
                    whole.emit_copy(win_start + (addr - cpylen), len, RefFrame::Output)?;
                }
            }
        }
    }

    if data_pos != sections.data.len() {
        return Err(DecodeError::InvalidInput(format!(
            "data section has {} unconsumed bytes",
            sections.data.len() - data_pos
        )));
    }

    let produced = whole.length() - win_start;
    if produced != header.target_window_len {
        return Err(DecodeError::InvalidInput(format!(
            "target size mismatch: window header says {}, instructions produce {produced}",
            header.target_window_len
        )));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Whole-stream decoding
// ---------------------------------------------------------------------------

/// Decode a complete VCDIFF stream from a reader into a WholeState.
pub fn read_whole<R: Read>(reader: R) -> Result<WholeState, DecodeError> {
    let mut reader = DeltaReader::new(reader);
    let mut whole = WholeState::new();
    while let Some(header) = reader.next_window()? {
        append_window(&mut whole, &header, reader.sections())?;
    }
    Ok(whole)
}

/// Decode an in-memory VCDIFF delta into a WholeState.
pub fn decode_whole(delta: &[u8]) -> Result<WholeState, DecodeError> {
    read_whole(std::io::Cursor::new(delta))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
