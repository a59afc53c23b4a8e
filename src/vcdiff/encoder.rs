// VCDIFF window emission.
//
// `WindowEncoder` packs add/run/copy calls into the DATA/INST/ADDR
// sections, fusing instruction pairs into double opcodes where the code
// table allows, and `DeltaWriter` frames finished windows into a stream.
// Match-finding does not happen here; callers already hold an
// instruction stream (usually a whole-state delta).

use std::io::{self, Write};

use super::address_cache::AddressCache;
use super::code_table::{self, CodeTable, HalfInst, TYPE_ADD, TYPE_CPY, TYPE_RUN, pick_opcodes};
use super::header::{FileHeader, VCD_ADLER32, VCD_APPHEADER, VCD_SOURCE, WindowHeader};
use super::varint;

// ---------------------------------------------------------------------------
// Window encoder
// ---------------------------------------------------------------------------

/// Accumulates one window's instructions and sections.
///
/// `source` is the window's source copy window as `(len, offset)`;
/// COPY addresses below `len` reference the source, addresses at or
/// above it reference earlier output of this same window.
pub struct WindowEncoder {
    data_section: Vec<u8>,
    inst_section: Vec<u8>,
    addr_section: Vec<u8>,
    acache: AddressCache,
    /// Last instruction, held back for possible fusion with the next.
    pending: Option<Pending>,
    target_len: u64,
    source: Option<(u64, u64)>,
    table: &'static CodeTable,
}

#[derive(Clone, Copy)]
struct Pending {
    inst: HalfInst,
    single: u8,
}

impl WindowEncoder {
    pub fn new(source: Option<(u64, u64)>) -> Self {
        Self {
            data_section: Vec::new(),
            inst_section: Vec::new(),
            addr_section: Vec::new(),
            acache: AddressCache::new(),
            pending: None,
            target_len: 0,
            source,
            table: code_table::default_table(),
        }
    }

    /// Current position in the combined address space.
    #[inline]
    fn here(&self) -> u64 {
        self.source.map_or(0, |(len, _)| len) + self.target_len
    }

    /// Target bytes queued so far.
    #[inline]
    pub fn target_len(&self) -> u64 {
        self.target_len
    }

    /// Append an ADD instruction carrying `data`.
    pub fn add(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.data_section.extend_from_slice(data);
        self.queue(HalfInst {
            itype: TYPE_ADD,
            size: data.len() as u32,
        });
        self.target_len += data.len() as u64;
    }

    /// Append a RUN of `len` copies of `byte`.
    pub fn run(&mut self, len: u32, byte: u8) {
        if len == 0 {
            return;
        }
        self.data_section.push(byte);
        self.queue(HalfInst {
            itype: TYPE_RUN,
            size: len,
        });
        self.target_len += len as u64;
    }

    /// Append a COPY of `len` bytes from combined address `addr`.
    /// The address cache picks the cheapest mode.
    pub fn copy(&mut self, len: u32, addr: u64) {
        if len == 0 {
            return;
        }
        let here = self.here();
        let mode = self.acache.encode(addr, here, &mut self.addr_section);
        self.queue(HalfInst {
            itype: TYPE_CPY + mode,
            size: len,
        });
        self.target_len += len as u64;
    }

    fn queue(&mut self, inst: HalfInst) {
        let picked = pick_opcodes(self.pending.as_ref().map(|p| &p.inst), &inst);
        if let Some(fused) = picked.fused {
            // Fused opcodes carry both sizes in the table entry.
            self.pending = None;
            self.inst_section.push(fused);
        } else {
            self.flush_pending();
            self.pending = Some(Pending {
                inst,
                single: picked.single,
            });
        }
    }

    fn flush_pending(&mut self) {
        if let Some(p) = self.pending.take() {
            self.inst_section.push(p.single);
            if self.table[p.single as usize].size1 == 0 {
                varint::push(&mut self.inst_section, p.inst.size as u64);
            }
        }
    }

    /// Finalize the window.  When `target` is given, an Adler-32 of it
    /// is stamped into the window header.
    pub fn finish(mut self, target: Option<&[u8]>) -> EncodedWindow {
        self.flush_pending();

        let adler32 = target.map(adler32);
        let mut win_ind = 0u8;
        if self.source.is_some() {
            win_ind |= VCD_SOURCE;
        }
        if adler32.is_some() {
            win_ind |= VCD_ADLER32;
        }
        let (copy_window_len, copy_window_offset) = self.source.unwrap_or((0, 0));

        let header = WindowHeader {
            win_ind,
            copy_window_len,
            copy_window_offset,
            enc_len: 0,
            target_window_len: self.target_len,
            del_ind: 0,
            data_len: self.data_section.len() as u64,
            inst_len: self.inst_section.len() as u64,
            addr_len: self.addr_section.len() as u64,
            adler32,
        };
        let enc_len = header.compute_enc_len();

        EncodedWindow {
            header: WindowHeader { enc_len, ..header },
            data_section: self.data_section,
            inst_section: self.inst_section,
            addr_section: self.addr_section,
        }
    }
}

// ---------------------------------------------------------------------------
// Encoded window
// ---------------------------------------------------------------------------

/// A finished window: header plus raw sections, ready to be framed.
pub struct EncodedWindow {
    pub header: WindowHeader,
    pub data_section: Vec<u8>,
    pub inst_section: Vec<u8>,
    pub addr_section: Vec<u8>,
}

impl EncodedWindow {
    /// Write header and sections in wire order.
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.header.encode(w)?;
        w.write_all(&self.data_section)?;
        w.write_all(&self.inst_section)?;
        w.write_all(&self.addr_section)
    }
}

// ---------------------------------------------------------------------------
// Stream writer
// ---------------------------------------------------------------------------

/// Writes a complete VCDIFF stream: file header once, then windows.
pub struct DeltaWriter<W: Write> {
    writer: W,
    file_header: FileHeader,
    header_written: bool,
    windows_written: u64,
}

impl<W: Write> DeltaWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            file_header: FileHeader::default(),
            header_written: false,
            windows_written: 0,
        }
    }

    /// Attach application header data (must precede the first window).
    pub fn set_app_header(&mut self, data: Vec<u8>) {
        debug_assert!(!self.header_written);
        self.file_header.hdr_ind |= VCD_APPHEADER;
        self.file_header.app_header = Some(data);
    }

    pub fn write_window(&mut self, window: EncodedWindow) -> io::Result<()> {
        if !self.header_written {
            self.file_header.encode(&mut self.writer)?;
            self.header_written = true;
        }
        window.encode(&mut self.writer)?;
        self.windows_written += 1;
        Ok(())
    }

    pub fn windows_written(&self) -> u64 {
        self.windows_written
    }

    /// Flush and return the inner writer.  An empty stream still gets
    /// its file header.
    pub fn finish(mut self) -> io::Result<W> {
        if !self.header_written {
            self.file_header.encode(&mut self.writer)?;
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}

// ---------------------------------------------------------------------------
// Adler-32
// ---------------------------------------------------------------------------

/// Adler-32 of `data`.  SIMD when the `adler32` feature is on.
pub fn adler32(data: &[u8]) -> u32 {
    #[cfg(feature = "adler32")]
    {
        let mut hasher = simd_adler32::Adler32::new();
        hasher.write(data);
        hasher.finish()
    }
    #[cfg(not(feature = "adler32"))]
    {
        const MOD_ADLER: u32 = 65521;
        let mut a: u32 = 1;
        let mut b: u32 = 0;
        for &byte in data {
            a = (a + u32::from(byte)) % MOD_ADLER;
            b = (b + a) % MOD_ADLER;
        }
        (b << 16) | a
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
