// The flat "whole-state" delta representation.
//
// One WholeState holds a fully decoded delta's output side: an ordered
// instruction list that tiles `[0, length)` with no gaps or overlaps,
// and a packed pool of literal bytes for RUN/ADD instructions.
// Instructions index the pool; there are no pointers between the two
// buffers, so a WholeState moves and swaps freely.
//
// Both buffers grow geometrically in fixed granules and surface
// allocation failure as `MergeError::OutOfMemory` instead of aborting;
// on failure the buffer keeps its previous contents and the state still
// tiles `[0, length)`.

use super::MergeError;

/// Allocation granule for both buffers (xdelta3's XD3_ALLOCSIZE).
pub const ALLOC_GRANULE: usize = 1 << 14;

// ---------------------------------------------------------------------------
// Instruction model
// ---------------------------------------------------------------------------

/// Reference frame of a COPY instruction's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefFrame {
    /// This delta's own output (a window self-copy rewritten to an
    /// absolute output offset).
    Output,
    /// The external source stream (VCD_SOURCE windows).
    Source,
    /// Earlier output of the target file (VCD_TARGET windows).
    Target,
}

impl RefFrame {
    /// Whether the address points into the delta's own output stream.
    /// Output and Target addresses are both absolute target offsets
    /// once the append path has rewritten them.
    #[inline]
    pub fn is_output(self) -> bool {
        matches!(self, RefFrame::Output | RefFrame::Target)
    }
}

/// Per-kind payload of a whole-instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstKind {
    /// `size` repeats of the single pool byte at `addr`.
    Run { addr: usize },
    /// `size` literal pool bytes starting at `addr`.
    Add { addr: usize },
    /// `size` bytes from absolute address `addr` in `frame`.
    Copy { addr: u64, frame: RefFrame },
}

/// One instruction describing a contiguous run of output bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WholeInst {
    /// Output bytes produced; always positive.
    pub size: usize,
    /// Absolute offset of the first produced byte.
    pub position: u64,
    pub kind: InstKind,
}

impl WholeInst {
    /// One past the last output offset this instruction produces.
    #[inline]
    pub fn end(&self) -> u64 {
        self.position + self.size as u64
    }
}

// ---------------------------------------------------------------------------
// WholeState
// ---------------------------------------------------------------------------

/// A fully decoded delta: instruction list plus literal pool.
#[derive(Clone)]
pub struct WholeState {
    inst: Vec<WholeInst>,
    adds: Vec<u8>,
    length: u64,
}

impl WholeState {
    /// An empty state with both buffers at the initial granule.
    pub fn new() -> Self {
        Self {
            inst: Vec::with_capacity(ALLOC_GRANULE / size_of::<WholeInst>()),
            adds: Vec::with_capacity(ALLOC_GRANULE),
            length: 0,
        }
    }

    /// Total output bytes this delta produces.
    #[inline]
    pub fn length(&self) -> u64 {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inst.is_empty()
    }

    /// The instruction list, in increasing position order.
    #[inline]
    pub fn instructions(&self) -> &[WholeInst] {
        &self.inst
    }

    /// The literal pool.
    #[inline]
    pub fn literals(&self) -> &[u8] {
        &self.adds
    }

    /// Pool bytes `[addr, addr + len)`.
    #[inline]
    pub fn literal_slice(&self, addr: usize, len: usize) -> &[u8] {
        &self.adds[addr..addr + len]
    }

    /// Current instruction-buffer capacity, in instructions.
    pub fn inst_capacity(&self) -> usize {
        self.inst.capacity()
    }

    /// Current literal-pool capacity, in bytes.
    pub fn adds_capacity(&self) -> usize {
        self.adds.capacity()
    }

    // -----------------------------------------------------------------------
    // Growth
    // -----------------------------------------------------------------------

    /// Make room for `n` more literal bytes without changing the pool
    /// length.
    pub fn reserve_literals(&mut self, n: usize) -> Result<(), MergeError> {
        grow(&mut self.adds, n)
    }

    /// Copy `bytes` into the pool, returning the address of the first.
    pub fn append_literals(&mut self, bytes: &[u8]) -> Result<usize, MergeError> {
        self.reserve_literals(bytes.len())?;
        let addr = self.adds.len();
        self.adds.extend_from_slice(bytes);
        Ok(addr)
    }

    // -----------------------------------------------------------------------
    // Appending instructions
    // -----------------------------------------------------------------------

    /// Append one instruction at the current end of the output.  Its
    /// position is the current length; the length advances by `size`.
    /// This is the only way instructions enter a WholeState, which is
    /// what keeps the tiling invariant true by construction.
    pub fn emit(&mut self, kind: InstKind, size: usize) -> Result<(), MergeError> {
        debug_assert!(size > 0, "zero-size instruction");
        grow(&mut self.inst, 1)?;
        self.inst.push(WholeInst {
            size,
            position: self.length,
            kind,
        });
        self.length += size as u64;
        Ok(())
    }

    /// Append a RUN: `size` repeats of `byte`, pooling the byte.
    pub fn emit_run(&mut self, byte: u8, size: usize) -> Result<(), MergeError> {
        let addr = self.append_literals(std::slice::from_ref(&byte))?;
        self.emit(InstKind::Run { addr }, size)
    }

    /// Append an ADD of `bytes`, pooling them.
    pub fn emit_add(&mut self, bytes: &[u8]) -> Result<(), MergeError> {
        let addr = self.append_literals(bytes)?;
        self.emit(InstKind::Add { addr }, bytes.len())
    }

    /// Append a COPY of `size` bytes from `addr` in `frame`.
    pub fn emit_copy(&mut self, addr: u64, size: usize, frame: RefFrame) -> Result<(), MergeError> {
        self.emit(InstKind::Copy { addr, frame }, size)
    }

    // -----------------------------------------------------------------------
    // Swap
    // -----------------------------------------------------------------------

    /// Exchange buffers and counters with `other` in O(1).  Used to
    /// install merge output in place of merge input while keeping both
    /// allocations alive for reuse.
    pub fn swap(&mut self, other: &mut WholeState) {
        std::mem::swap(self, other);
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Check every structural invariant: the tiling of `[0, length)`,
    /// size positivity, literal-pool bounds, and copy-address bounds.
    /// Source-frame bounds are only checked when `source_len` is known.
    ///
    /// Output/Target copies must start strictly before their own
    /// position; the copied range may extend past it (the RLE form,
    /// where the copy reads bytes it is itself producing).
    pub fn validate(&self, source_len: Option<u64>) -> Result<(), MergeError> {
        let mut expect_pos = 0u64;
        for inst in &self.inst {
            if inst.size == 0 {
                return Err(MergeError::Internal("zero-size instruction"));
            }
            if inst.position != expect_pos {
                return Err(MergeError::Internal("instruction tiling broken"));
            }
            match inst.kind {
                InstKind::Run { addr } => {
                    if addr >= self.adds.len() {
                        return Err(MergeError::Internal("run byte outside literal pool"));
                    }
                }
                InstKind::Add { addr } => {
                    if addr + inst.size > self.adds.len() {
                        return Err(MergeError::Internal("add bytes outside literal pool"));
                    }
                }
                InstKind::Copy { addr, frame } => {
                    if frame.is_output() {
                        if addr >= inst.position {
                            return Err(MergeError::InvalidInput(
                                "self-referential copy is not strictly backward",
                            ));
                        }
                    } else if let Some(limit) = source_len
                        && addr + inst.size as u64 > limit
                    {
                        return Err(MergeError::InvalidInput("copy past end of source"));
                    }
                }
            }
            expect_pos += inst.size as u64;
        }
        if expect_pos != self.length {
            return Err(MergeError::Internal("length does not match tiling"));
        }
        Ok(())
    }
}

impl Default for WholeState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WholeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WholeState")
            .field("length", &self.length)
            .field("instructions", &self.inst.len())
            .field("literals", &self.adds.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Buffer growth
// ---------------------------------------------------------------------------

/// Grow `buf` so it can hold `extra` more elements.
///
/// Same policy as xdelta3's `xd3_realloc_buffer`: when the request
/// exceeds capacity, the new capacity is twice the needed byte size,
/// rounded up to the allocation granule.  The doubling keeps appends
/// amortized O(1); on failure the buffer is untouched.
fn grow<T>(buf: &mut Vec<T>, extra: usize) -> Result<(), MergeError> {
    let unit = size_of::<T>().max(1);
    let needed_units = buf
        .len()
        .checked_add(extra)
        .ok_or(MergeError::OutOfMemory)?;
    if needed_units <= buf.capacity() {
        return Ok(());
    }

    let new_bytes = needed_units
        .checked_mul(unit)
        .and_then(|b| b.checked_mul(2))
        .and_then(|b| b.checked_next_multiple_of(ALLOC_GRANULE))
        .ok_or(MergeError::OutOfMemory)?;

    buf.try_reserve_exact(new_bytes / unit - buf.len())
        .map_err(|_| MergeError::OutOfMemory)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_empty_with_granule_capacity() {
        let w = WholeState::new();
        assert!(w.is_empty());
        assert_eq!(w.length(), 0);
        assert_eq!(w.adds_capacity(), ALLOC_GRANULE);
        assert!(w.inst_capacity() >= ALLOC_GRANULE / size_of::<WholeInst>());
        w.validate(None).unwrap();
    }

    #[test]
    fn emit_assigns_positions_cumulatively() {
        let mut w = WholeState::new();
        w.emit_add(b"abc").unwrap();
        w.emit_run(b'x', 10).unwrap();
        w.emit_copy(5, 7, RefFrame::Source).unwrap();
        let inst = w.instructions();
        assert_eq!(inst[0].position, 0);
        assert_eq!(inst[1].position, 3);
        assert_eq!(inst[2].position, 13);
        assert_eq!(w.length(), 20);
        w.validate(Some(12)).unwrap();
    }

    #[test]
    fn literal_pool_packs_run_and_add_bytes() {
        let mut w = WholeState::new();
        w.emit_run(0x5A, 100).unwrap();
        w.emit_add(&[1, 2, 3]).unwrap();
        assert_eq!(w.literals(), &[0x5A, 1, 2, 3]);
        match w.instructions()[0].kind {
            InstKind::Run { addr } => assert_eq!(addr, 0),
            _ => panic!("expected Run"),
        }
        match w.instructions()[1].kind {
            InstKind::Add { addr } => {
                assert_eq!(addr, 1);
                assert_eq!(w.literal_slice(addr, 3), &[1, 2, 3]);
            }
            _ => panic!("expected Add"),
        }
    }

    #[test]
    fn growth_at_least_doubles_capacity() {
        let mut w = WholeState::new();
        let mut last_cap = w.adds_capacity();
        let chunk = vec![0u8; ALLOC_GRANULE / 2 + 1];
        for _ in 0..8 {
            let before_len = w.literals().len();
            w.append_literals(&chunk).unwrap();
            assert_eq!(w.literals().len(), before_len + chunk.len());
            let cap = w.adds_capacity();
            if cap != last_cap {
                assert!(
                    cap >= 2 * (before_len + chunk.len()),
                    "growth did not double: {last_cap} -> {cap}"
                );
                assert_eq!(cap % ALLOC_GRANULE, 0, "capacity off-granule: {cap}");
                last_cap = cap;
            }
        }
    }

    #[test]
    fn reserve_does_not_advance_length() {
        let mut w = WholeState::new();
        w.reserve_literals(100_000).unwrap();
        assert_eq!(w.literals().len(), 0);
        assert!(w.adds_capacity() >= 100_000);
    }

    #[test]
    fn inst_buffer_grows_past_initial_granule() {
        let mut w = WholeState::new();
        let initial = w.inst_capacity();
        for _ in 0..initial + 1 {
            w.emit_run(0, 1).unwrap();
        }
        assert!(w.inst_capacity() >= 2 * initial);
        w.validate(None).unwrap();
    }

    #[test]
    fn swap_exchanges_everything() {
        let mut a = WholeState::new();
        a.emit_add(b"aaaa").unwrap();
        let mut b = WholeState::new();
        b.emit_run(b'b', 9).unwrap();
        b.emit_copy(0, 3, RefFrame::Source).unwrap();

        a.swap(&mut b);
        assert_eq!(a.length(), 12);
        assert_eq!(a.instructions().len(), 2);
        assert_eq!(b.length(), 4);
        assert_eq!(b.literals(), b"aaaa");
    }

    #[test]
    fn validate_rejects_source_copy_past_limit() {
        let mut w = WholeState::new();
        w.emit_copy(5, 10, RefFrame::Source).unwrap();
        w.validate(None).unwrap();
        w.validate(Some(15)).unwrap();
        assert!(matches!(
            w.validate(Some(14)),
            Err(MergeError::InvalidInput(_))
        ));
    }

    #[test]
    fn validate_accepts_overlapping_self_copy() {
        // ADD one byte, then copy 5 from offset 0: the RLE form.
        let mut w = WholeState::new();
        w.emit_add(b"A").unwrap();
        w.emit_copy(0, 5, RefFrame::Output).unwrap();
        w.validate(None).unwrap();
    }

    #[test]
    fn validate_rejects_forward_self_copy() {
        let mut w = WholeState::new();
        w.emit_add(b"A").unwrap();
        w.emit_copy(1, 2, RefFrame::Output).unwrap();
        assert!(matches!(
            w.validate(None),
            Err(MergeError::InvalidInput(_))
        ));
    }
}
