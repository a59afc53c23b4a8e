// Applying a whole-state delta to a source, producing target bytes.
//
// The workhorse behind the `apply` command and the correctness tests:
// a merged delta is right exactly when applying it to V0 equals
// applying the chain one step at a time.

use super::state::{InstKind, WholeState};
use super::MergeError;

/// Reconstruct the target bytes of `whole` against `source`.
///
/// Output- and target-frame copies read earlier output; when the copied
/// range overlaps bytes the copy itself is producing, the copy proceeds
/// byte-by-byte so each read sees what was just written (RLE semantics).
pub fn apply(whole: &WholeState, source: &[u8]) -> Result<Vec<u8>, MergeError> {
    let length = usize::try_from(whole.length()).map_err(|_| MergeError::OutOfMemory)?;
    let mut output = Vec::new();
    output
        .try_reserve_exact(length)
        .map_err(|_| MergeError::OutOfMemory)?;

    for inst in whole.instructions() {
        match inst.kind {
            InstKind::Run { addr } => {
                let byte = whole.literals()[addr];
                output.resize(output.len() + inst.size, byte);
            }

            InstKind::Add { addr } => {
                output.extend_from_slice(whole.literal_slice(addr, inst.size));
            }

            InstKind::Copy { addr, frame } => {
                if frame.is_output() {
                    let start = usize::try_from(addr)
                        .map_err(|_| MergeError::InvalidInput("copy address overflow"))?;
                    if start >= output.len() {
                        return Err(MergeError::InvalidInput(
                            "self-referential copy is not strictly backward",
                        ));
                    }
                    let end = start + inst.size;
                    if end <= output.len() {
                        output.extend_from_within(start..end);
                    } else {
                        // Overlapping: reads must observe freshly
                        // written bytes.
                        for i in start..end {
                            let byte = output[i];
                            output.push(byte);
                        }
                    }
                } else {
                    let start = usize::try_from(addr)
                        .map_err(|_| MergeError::InvalidInput("copy address overflow"))?;
                    let range = source
                        .get(start..start + inst.size)
                        .ok_or(MergeError::InvalidInput("copy past end of source"))?;
                    output.extend_from_slice(range);
                }
            }
        }
    }

    debug_assert_eq!(output.len() as u64, whole.length());
    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
