// VCDIFF delta reading: window sections and instruction streams.
//
// Unlike a patch applier, the merge toolkit never executes COPY/ADD/RUN
// against real bytes at this layer.  The reader hands out each window's
// raw DATA/INST/ADDR sections plus an iterator over decoded instruction
// records; the whole-state builder (`whole::append`) consumes both.
//
// Section buffers are reused across windows: they grow to the largest
// section seen and never shrink.

use std::io::Read;

use super::address_cache::AddressCache;
use super::code_table::{self, CodeTable, Instruction, TYPE_CPY, TYPE_NOOP, TYPE_RUN};
use super::header::{FileHeader, WindowHeader};
use super::varint;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum DecodeError {
    Io(std::io::Error),
    InvalidInput(String),
    Unsupported(String),
    /// Whole-state buffer growth failed while absorbing a window.
    OutOfMemory,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Self::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::Unsupported => Self::Unsupported(e.to_string()),
            _ => Self::Io(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Window sections
// ---------------------------------------------------------------------------

/// Borrowed DATA/INST/ADDR triplet for one window.
#[derive(Clone, Copy)]
pub struct Sections<'a> {
    pub data: &'a [u8],
    pub inst: &'a [u8],
    pub addr: &'a [u8],
}

// ---------------------------------------------------------------------------
// Delta reader
// ---------------------------------------------------------------------------

/// Reads a VCDIFF stream window by window.
pub struct DeltaReader<R: Read> {
    reader: R,
    file_header: Option<FileHeader>,
    windows_read: u64,
    data_buf: Vec<u8>,
    inst_buf: Vec<u8>,
    addr_buf: Vec<u8>,
}

impl<R: Read> DeltaReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            file_header: None,
            windows_read: 0,
            data_buf: Vec::new(),
            inst_buf: Vec::new(),
            addr_buf: Vec::new(),
        }
    }

    /// Read the file header if not yet read, and return it.
    pub fn file_header(&mut self) -> Result<&FileHeader, DecodeError> {
        if self.file_header.is_none() {
            self.file_header = Some(FileHeader::decode(&mut self.reader)?);
        }
        Ok(self.file_header.as_ref().unwrap())
    }

    /// Windows consumed so far.
    pub fn windows_read(&self) -> u64 {
        self.windows_read
    }

    /// Advance to the next window: parse its header and pull the three
    /// sections into the reusable buffers.  Returns `None` at clean EOF.
    pub fn next_window(&mut self) -> Result<Option<WindowHeader>, DecodeError> {
        self.file_header()?;

        let Some(hdr) = WindowHeader::decode(&mut self.reader)? else {
            return Ok(None);
        };

        read_section(&mut self.reader, &mut self.data_buf, hdr.data_len, "data")?;
        read_section(&mut self.reader, &mut self.inst_buf, hdr.inst_len, "inst")?;
        read_section(&mut self.reader, &mut self.addr_buf, hdr.addr_len, "addr")?;

        self.windows_read += 1;
        Ok(Some(hdr))
    }

    /// The sections of the window last returned by `next_window`.
    pub fn sections(&self) -> Sections<'_> {
        Sections {
            data: &self.data_buf,
            inst: &self.inst_buf,
            addr: &self.addr_buf,
        }
    }
}

fn read_section<R: Read>(
    r: &mut R,
    buf: &mut Vec<u8>,
    len: u64,
    name: &str,
) -> Result<(), DecodeError> {
    let len = usize::try_from(len)
        .map_err(|_| DecodeError::InvalidInput(format!("{name} section length overflow")))?;
    buf.resize(len, 0);
    r.read_exact(buf)
        .map_err(|e| DecodeError::InvalidInput(format!("{name} section truncated: {e}")))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Instruction iteration
// ---------------------------------------------------------------------------

/// Walks one window's INST/ADDR sections, yielding decoded instruction
/// records with COPY addresses resolved through the address cache.
/// NOOP halves of fused opcodes are skipped.
pub struct InstructionIterator<'a> {
    inst_data: &'a [u8],
    addr_data: &'a [u8],
    inst_pos: usize,
    addr_pos: usize,
    table: &'static CodeTable,
    acache: AddressCache,
    copy_window_len: u64,
    target_pos: u64,
    /// Second half of a fused opcode, waiting to be yielded.
    pending: Option<(u8, u8)>,
}

impl<'a> InstructionIterator<'a> {
    pub fn new(inst_section: &'a [u8], addr_section: &'a [u8], copy_window_len: u64) -> Self {
        Self {
            inst_data: inst_section,
            addr_data: addr_section,
            inst_pos: 0,
            addr_pos: 0,
            table: code_table::default_table(),
            acache: AddressCache::new(),
            copy_window_len,
            target_pos: 0,
            pending: None,
        }
    }

    fn decode_half(&mut self, itype: u8, table_size: u8) -> Result<Instruction, DecodeError> {
        debug_assert_ne!(itype, TYPE_NOOP);

        let size = if table_size == 0 {
            let (val, consumed) = varint::read_u32(&self.inst_data[self.inst_pos..])
                .map_err(|e| DecodeError::InvalidInput(format!("instruction size: {e}")))?;
            self.inst_pos += consumed;
            val
        } else {
            table_size as u32
        };
        if size == 0 {
            return Err(DecodeError::InvalidInput(
                "zero-size instruction".to_string(),
            ));
        }

        let inst = if itype == TYPE_RUN {
            Instruction::Run { len: size }
        } else if itype == code_table::TYPE_ADD {
            Instruction::Add { len: size }
        } else {
            let mode = itype - TYPE_CPY;
            let here = self.copy_window_len + self.target_pos;
            let (addr, consumed) = self
                .acache
                .decode(mode, &self.addr_data[self.addr_pos..], here)
                .map_err(|e| DecodeError::InvalidInput(format!("copy address: {e}")))?;
            self.addr_pos += consumed;
            Instruction::Copy {
                len: size,
                addr,
                mode,
            }
        };

        self.target_pos += size as u64;
        Ok(inst)
    }
}

impl Iterator for InstructionIterator<'_> {
    type Item = Result<Instruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((itype, size)) = self.pending.take() {
                if itype != TYPE_NOOP {
                    return Some(self.decode_half(itype, size));
                }
                continue;
            }

            let &opcode = self.inst_data.get(self.inst_pos)?;
            self.inst_pos += 1;
            let entry = self.table[opcode as usize];
            self.pending = Some((entry.type2, entry.size2));
            if entry.type1 != TYPE_NOOP {
                return Some(self.decode_half(entry.type1, entry.size1));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcdiff::encoder::WindowEncoder;
    use crate::vcdiff::header::VCD_SOURCE;

    /// Encode a window's sections directly, then re-iterate them.
    fn roundtrip(copy_window_len: u64, build: impl FnOnce(&mut WindowEncoder)) -> Vec<Instruction> {
        let source = if copy_window_len > 0 {
            Some((copy_window_len, 0))
        } else {
            None
        };
        let mut we = WindowEncoder::new(source);
        build(&mut we);
        let win = we.finish(None);

        let mut bytes = Vec::new();
        win.encode(&mut bytes).unwrap();

        let mut cursor = std::io::Cursor::new(&bytes);
        let hdr = WindowHeader::decode(&mut cursor).unwrap().unwrap();
        if copy_window_len > 0 {
            assert_eq!(hdr.win_ind & VCD_SOURCE, VCD_SOURCE);
        }
        let rest = &bytes[cursor.position() as usize..];
        let (data, rest) = rest.split_at(hdr.data_len as usize);
        let (inst, addr) = rest.split_at(hdr.inst_len as usize);
        assert_eq!(addr.len(), hdr.addr_len as usize);
        let _ = data;

        InstructionIterator::new(inst, addr, hdr.copy_window_len)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn iterate_single_add() {
        let decoded = roundtrip(0, |we| we.add(b"Hello, world!"));
        assert_eq!(decoded, vec![Instruction::Add { len: 13 }]);
    }

    #[test]
    fn iterate_run_and_copy() {
        let decoded = roundtrip(64, |we| {
            we.run(50, 0xAA);
            we.copy(8, 4);
        });
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], Instruction::Run { len: 50 });
        match decoded[1] {
            Instruction::Copy { len, addr, .. } => {
                assert_eq!((len, addr), (8, 4));
            }
            other => panic!("expected Copy, got {other:?}"),
        }
    }

    #[test]
    fn iterate_fused_opcode() {
        // ADD(1) + COPY(4) fuses into one opcode; both halves must
        // still come out as separate records.
        let decoded = roundtrip(1024, |we| {
            we.add(b"X");
            we.copy(4, 0);
        });
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], Instruction::Add { len: 1 });
        assert_eq!(decoded[1].len(), 4);
    }

    #[test]
    fn iterate_large_sizes_use_varints() {
        let data = vec![0x42u8; 1000];
        let decoded = roundtrip(0, |we| we.add(&data));
        assert_eq!(decoded, vec![Instruction::Add { len: 1000 }]);
    }

    #[test]
    fn self_copy_addresses_resolve_past_window() {
        // A self-copy points past the copy window into the target space.
        let decoded = roundtrip(16, |we| {
            we.add(b"abcd");
            we.copy(4, 16); // target offset 0 == combined address 16
        });
        match decoded[1] {
            Instruction::Copy { addr, .. } => assert_eq!(addr, 16),
            other => panic!("expected Copy, got {other:?}"),
        }
    }

    #[test]
    fn truncated_inst_section_errors() {
        // Opcode 1 is ADD with a varint size that never arrives.
        let result: Result<Vec<_>, _> = InstructionIterator::new(&[1], &[], 0).collect();
        assert!(result.is_err());
    }

    #[test]
    fn reader_walks_windows_and_reuses_buffers() {
        let mut bytes = Vec::new();
        let mut writer = crate::vcdiff::encoder::DeltaWriter::new(&mut bytes);
        for chunk in [b"first window".as_slice(), b"second, longer window".as_slice()] {
            let mut we = WindowEncoder::new(None);
            we.add(chunk);
            writer.write_window(we.finish(None)).unwrap();
        }
        writer.finish().unwrap();

        let mut reader = DeltaReader::new(std::io::Cursor::new(&bytes));
        let mut seen = 0;
        while let Some(hdr) = reader.next_window().unwrap() {
            let sections = reader.sections();
            assert_eq!(sections.data.len(), hdr.data_len as usize);
            assert_eq!(sections.inst.len(), hdr.inst_len as usize);
            seen += 1;
        }
        assert_eq!(seen, 2);
        assert_eq!(reader.windows_read(), 2);
    }

    #[test]
    fn reader_rejects_garbage() {
        let mut reader = DeltaReader::new(std::io::Cursor::new(b"not a delta"));
        assert!(reader.next_window().is_err());
    }
}
