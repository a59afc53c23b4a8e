// The delta-merge engine.
//
// `merge(source, input)` composes two whole-state deltas: `source` maps
// V0 -> V1, `input` maps V1 -> V2, and the result maps V0 -> V2 directly.
// Each input instruction is rewritten against `source`:
//
//   - RUN/ADD produce V2 bytes directly and pass through, their
//     literals re-pooled;
//   - self-referential copies (OUTPUT/TARGET frame) address the merged
//     delta's own output, which is built in the same order as the
//     input's, so positions are unchanged and they pass through
//     verbatim;
//   - SOURCE-frame copies read V1, which does not exist.  The engine
//     locates the source instructions that produce the referenced V1
//     range and emits one output instruction per piece, splitting at
//     source-instruction boundaries.
//
// A piece that lands on a source instruction that is itself a
// self-referential copy is chased further back through the source —
// its bytes are earlier V1 output, not V0 — with overlapping (RLE-form)
// copies reduced period by period first.  Referenced addresses strictly
// decrease, so the chase always bottoms out.

use crate::whole::state::{InstKind, RefFrame, WholeState};
pub use crate::whole::MergeError;

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Merge `input` (V1 -> V2) over `source` (V0 -> V1) into a fresh
/// whole-state mapping V0 -> V2.
///
/// Every SOURCE-frame copy in `input` must satisfy
/// `addr + size <= source.length()`; violations surface as
/// `InvalidInput`.  The output tiles `[0, input.length())`.
pub fn merge(source: &WholeState, input: &WholeState) -> Result<WholeState, MergeError> {
    let mut output = WholeState::new();

    for inst in input.instructions() {
        debug_assert_eq!(output.length(), inst.position);
        match inst.kind {
            InstKind::Run { addr } => {
                output.emit_run(input.literals()[addr], inst.size)?;
            }
            InstKind::Add { addr } => {
                output.emit_add(input.literal_slice(addr, inst.size))?;
            }
            InstKind::Copy { addr, frame } => {
                if frame.is_output() {
                    output.emit_copy(addr, inst.size, frame)?;
                } else {
                    merge_source_copy(&mut output, source, addr, inst.size)?;
                }
            }
        }
    }

    debug_assert_eq!(output.length(), input.length());
    Ok(output)
}

/// Merge `source` under `whole` in place: `whole` is the input and
/// receives the result.  The merge builds into a temporary and swaps it
/// in, so on error `whole` is untouched.
pub fn merge_into(source: &WholeState, whole: &mut WholeState) -> Result<(), MergeError> {
    let mut merged = merge(source, whole)?;
    whole.swap(&mut merged);
    Ok(())
}

// ---------------------------------------------------------------------------
// Position lookup
// ---------------------------------------------------------------------------

/// Find the instruction whose output range contains byte `addr`.
///
/// Half-open binary search over the tiling.  `addr` past the end is the
/// caller handing us a bad delta (`InvalidInput`); a search that falls
/// through on an in-range address means the tiling itself is broken,
/// which is a bug (`Internal`).
pub fn find_position(source: &WholeState, addr: u64) -> Result<usize, MergeError> {
    if addr >= source.length() {
        return Err(MergeError::InvalidInput("Invalid copy offset in merge"));
    }

    let inst = source.instructions();
    let mut low = 0usize;
    let mut high = inst.len();

    while low != high {
        let mid = low + (high - low) / 2;
        let mid_lpos = inst[mid].position;
        if addr < mid_lpos {
            high = mid;
            continue;
        }
        let mid_hpos = mid_lpos + inst[mid].size as u64;
        if addr >= mid_hpos {
            low = mid + 1;
            continue;
        }
        return Ok(mid);
    }

    Err(MergeError::Internal("Internal error in merge"))
}

// ---------------------------------------------------------------------------
// SOURCE-copy resolution
// ---------------------------------------------------------------------------

/// Resolve one input SOURCE copy of `size` bytes at V1 offset `addr`.
///
/// Ranges still to resolve sit on an explicit stack (deepest first, so
/// they pop in output order); chasing a self-referential source copy
/// pushes the remainder of the current range and the referenced chunks
/// instead of recursing, keeping the call depth flat for arbitrarily
/// nested inputs.
fn merge_source_copy(
    output: &mut WholeState,
    source: &WholeState,
    addr: u64,
    size: usize,
) -> Result<(), MergeError> {
    let mut pending: Vec<(u64, usize)> = vec![(addr, size)];

    while let Some((mut addr, mut remaining)) = pending.pop() {
        let mut idx = find_position(source, addr)?;

        'range: while remaining > 0 {
            let sinst = source
                .instructions()
                .get(idx)
                .ok_or(MergeError::Internal("Internal error in merge"))?;
            debug_assert!(addr >= sinst.position);
            let offset = (addr - sinst.position) as usize;
            debug_assert!(sinst.size > offset);
            let take = remaining.min(sinst.size - offset);

            match sinst.kind {
                InstKind::Run { addr: pool } => {
                    output.emit_run(source.literals()[pool], take)?;
                }

                InstKind::Add { addr: pool } => {
                    output.emit_add(source.literal_slice(pool + offset, take))?;
                }

                InstKind::Copy { addr: caddr, frame } if !frame.is_output() => {
                    // Source-frame copy in the source delta: the piece
                    // reads V0 directly, offset into the copied range.
                    output.emit_copy(caddr + offset as u64, take, RefFrame::Source)?;
                }

                InstKind::Copy { addr: caddr, .. } => {
                    // Self-referential source instruction: its bytes are
                    // earlier V1 output.  Queue the tail of the current
                    // range, then the referenced chunks in its place.
                    if caddr >= sinst.position {
                        return Err(MergeError::InvalidInput(
                            "self-referential copy is not strictly backward",
                        ));
                    }
                    if remaining > take {
                        pending.push((addr + take as u64, remaining - take));
                    }

                    // An overlapping self-copy cycles through the
                    // backing region with this period; a plain backward
                    // copy reduces to a single chunk.
                    let period = (sinst.position - caddr) as usize;
                    let mut chunks: Vec<(u64, usize)> = Vec::new();
                    let mut o = offset;
                    let mut rem = take;
                    while rem > 0 {
                        let w = o % period;
                        let t = rem.min(period - w);
                        chunks.push((caddr + w as u64, t));
                        o += t;
                        rem -= t;
                    }
                    while let Some(chunk) = chunks.pop() {
                        pending.push(chunk);
                    }
                    break 'range;
                }
            }

            addr += take as u64;
            remaining -= take;
            idx += 1;
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
