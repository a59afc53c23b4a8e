// VCDIFF file and window headers (RFC 3284).
//
// Same field order and redundancy checks as xdelta3.  Secondary
// compression (VCD_SECONDARY / del_ind bits) and application-supplied
// code tables (VCD_CODETABLE) are rejected as unsupported: this toolkit
// composes plain deltas.  VCD_TARGET windows are accepted — the
// whole-state representation carries their reference frame through the
// merge.

use std::io::{self, Read, Write};

use super::varint;

// ---------------------------------------------------------------------------
// Magic, indicator bits, limits
// ---------------------------------------------------------------------------

pub const VCDIFF_MAGIC: [u8; 4] = [0xD6, 0xC3, 0xC4, 0x00];

// Header indicator (hdr_ind).
pub const VCD_SECONDARY: u8 = 1 << 0;
pub const VCD_CODETABLE: u8 = 1 << 1;
pub const VCD_APPHEADER: u8 = 1 << 2;
const VCD_INVHDR: u8 = !0x07;

// Window indicator (win_ind).
pub const VCD_SOURCE: u8 = 1 << 0;
pub const VCD_TARGET: u8 = 1 << 1;
pub const VCD_ADLER32: u8 = 1 << 2;
const VCD_INVWIN: u8 = !0x07;

// Delta indicator (del_ind): any set bit means secondary compression.
const VCD_INVDEL: u8 = !0x07;

/// Largest decoded window this implementation accepts
/// (xdelta3's XD3_HARDMAXWINSIZE).
pub const HARD_MAX_WINSIZE: u64 = 1 << 24;

/// Upper bound on a copy window's length.  Generous (256 TiB), but keeps
/// combined-address-space arithmetic comfortably inside u64.
pub const HARD_MAX_CPYWIN: u64 = 1 << 48;

// ---------------------------------------------------------------------------
// File header
// ---------------------------------------------------------------------------

/// Parsed VCDIFF file header.
#[derive(Debug, Clone, Default)]
pub struct FileHeader {
    pub hdr_ind: u8,
    /// Application-defined header data (VCD_APPHEADER).
    pub app_header: Option<Vec<u8>>,
}

impl FileHeader {
    /// Emit magic, indicator, and the optional app header.
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&VCDIFF_MAGIC)?;
        w.write_all(&[self.hdr_ind])?;
        if self.hdr_ind & VCD_APPHEADER != 0 {
            let data = self.app_header.as_deref().unwrap_or(&[]);
            varint::write(w, data.len() as u64)?;
            w.write_all(data)?;
        }
        Ok(())
    }

    /// Parse and validate a file header.
    pub fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic[..3] != VCDIFF_MAGIC[..3] {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "not a VCDIFF stream: got {:02X} {:02X} {:02X}",
                    magic[0], magic[1], magic[2]
                ),
            ));
        }
        if magic[3] != 0x00 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported VCDIFF version: {:#04X}", magic[3]),
            ));
        }

        let mut buf1 = [0u8; 1];
        r.read_exact(&mut buf1)?;
        let hdr_ind = buf1[0];
        if hdr_ind & VCD_INVHDR != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid header indicator bits: {hdr_ind:#04X}"),
            ));
        }
        if hdr_ind & VCD_SECONDARY != 0 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "secondary compression is not supported",
            ));
        }
        if hdr_ind & VCD_CODETABLE != 0 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "application code tables are not supported",
            ));
        }

        let app_header = if hdr_ind & VCD_APPHEADER != 0 {
            let len = varint::read_usize_from(r)?;
            let mut data = vec![0u8; len];
            r.read_exact(&mut data)?;
            Some(data)
        } else {
            None
        };

        Ok(Self {
            hdr_ind,
            app_header,
        })
    }
}

// ---------------------------------------------------------------------------
// Window header
// ---------------------------------------------------------------------------

/// Parsed VCDIFF per-window header.
#[derive(Debug, Clone, Default)]
pub struct WindowHeader {
    pub win_ind: u8,

    /// Length of the source/target copy window (VCD_SOURCE or VCD_TARGET).
    pub copy_window_len: u64,
    /// Absolute offset of the copy window in its reference stream.
    pub copy_window_offset: u64,

    /// Redundant total length of the delta encoding.
    pub enc_len: u64,
    /// Bytes of target this window reconstructs.
    pub target_window_len: u64,
    /// Secondary-compression flags; must be zero here.
    pub del_ind: u8,

    pub data_len: u64,
    pub inst_len: u64,
    pub addr_len: u64,

    /// Adler-32 of the target window (VCD_ADLER32).
    pub adler32: Option<u32>,
}

impl WindowHeader {
    #[inline]
    pub fn copies_from_source(&self) -> bool {
        self.win_ind & VCD_SOURCE != 0
    }

    #[inline]
    pub fn copies_from_target(&self) -> bool {
        self.win_ind & VCD_TARGET != 0
    }

    /// Expected `enc_len` for the current field values.
    pub fn compute_enc_len(&self) -> u64 {
        let mut len = varint::encoded_len(self.target_window_len) as u64;
        len += 1; // del_ind
        len += varint::encoded_len(self.data_len) as u64;
        len += varint::encoded_len(self.inst_len) as u64;
        len += varint::encoded_len(self.addr_len) as u64;
        len += self.data_len + self.inst_len + self.addr_len;
        if self.adler32.is_some() {
            len += 4;
        }
        len
    }

    /// Emit the window header.  Field order matches `xd3_emit_hdr`.
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&[self.win_ind])?;
        if self.win_ind & (VCD_SOURCE | VCD_TARGET) != 0 {
            varint::write(w, self.copy_window_len)?;
            varint::write(w, self.copy_window_offset)?;
        }
        varint::write(w, self.enc_len)?;
        varint::write(w, self.target_window_len)?;
        w.write_all(&[self.del_ind])?;
        varint::write(w, self.data_len)?;
        varint::write(w, self.inst_len)?;
        varint::write(w, self.addr_len)?;
        if let Some(cksum) = self.adler32 {
            w.write_all(&cksum.to_be_bytes())?;
        }
        Ok(())
    }

    /// Parse the next window header.  Returns `None` on clean EOF.
    pub fn decode<R: Read>(r: &mut R) -> io::Result<Option<Self>> {
        let mut buf1 = [0u8; 1];
        match r.read_exact(&mut buf1) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let win_ind = buf1[0];
        if win_ind & VCD_INVWIN != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid window indicator bits: {win_ind:#04X}"),
            ));
        }
        if win_ind & VCD_SOURCE != 0 && win_ind & VCD_TARGET != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "VCD_SOURCE and VCD_TARGET are mutually exclusive",
            ));
        }

        let (copy_window_len, copy_window_offset) = if win_ind & (VCD_SOURCE | VCD_TARGET) != 0 {
            (varint::read_from(r)?, varint::read_from(r)?)
        } else {
            (0, 0)
        };
        if copy_window_len > HARD_MAX_CPYWIN
            || copy_window_offset.checked_add(copy_window_len).is_none()
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("copy window out of range: offset {copy_window_offset}, len {copy_window_len}"),
            ));
        }

        let enc_len = varint::read_from(r)?;
        let target_window_len = varint::read_from(r)?;
        if target_window_len > HARD_MAX_WINSIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("target window too large: {target_window_len} > {HARD_MAX_WINSIZE}"),
            ));
        }

        r.read_exact(&mut buf1)?;
        let del_ind = buf1[0];
        if del_ind & VCD_INVDEL != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid delta indicator bits: {del_ind:#04X}"),
            ));
        }
        if del_ind != 0 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "secondary compression is not supported",
            ));
        }

        let data_len = varint::read_from(r)?;
        let inst_len = varint::read_from(r)?;
        let addr_len = varint::read_from(r)?;

        let adler32 = if win_ind & VCD_ADLER32 != 0 {
            let mut cksum = [0u8; 4];
            r.read_exact(&mut cksum)?;
            Some(u32::from_be_bytes(cksum))
        } else {
            None
        };

        let hdr = WindowHeader {
            win_ind,
            copy_window_len,
            copy_window_offset,
            enc_len,
            target_window_len,
            del_ind,
            data_len,
            inst_len,
            addr_len,
            adler32,
        };

        let expected = hdr.compute_enc_len();
        if enc_len != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("enc_len mismatch: header says {enc_len}, computed {expected}"),
            ));
        }

        Ok(Some(hdr))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn file_header_minimal_roundtrip() {
        let hdr = FileHeader::default();
        let mut buf = Vec::new();
        hdr.encode(&mut buf).unwrap();
        assert_eq!(&buf[..4], &VCDIFF_MAGIC);
        assert_eq!(buf[4], 0);

        let decoded = FileHeader::decode(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded.hdr_ind, 0);
        assert!(decoded.app_header.is_none());
    }

    #[test]
    fn file_header_app_header_roundtrip() {
        let hdr = FileHeader {
            hdr_ind: VCD_APPHEADER,
            app_header: Some(b"v0//v2".to_vec()),
        };
        let mut buf = Vec::new();
        hdr.encode(&mut buf).unwrap();
        let decoded = FileHeader::decode(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded.app_header.as_deref(), Some(b"v0//v2".as_slice()));
    }

    #[test]
    fn file_header_rejects_bad_magic() {
        assert!(FileHeader::decode(&mut Cursor::new([0u8; 5])).is_err());
    }

    #[test]
    fn file_header_rejects_secondary() {
        let mut data = VCDIFF_MAGIC.to_vec();
        data.push(VCD_SECONDARY);
        data.push(1); // would-be compressor id
        let err = FileHeader::decode(&mut Cursor::new(&data)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn file_header_rejects_code_table() {
        let mut data = VCDIFF_MAGIC.to_vec();
        data.push(VCD_CODETABLE);
        let err = FileHeader::decode(&mut Cursor::new(&data)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    fn with_enc_len(wh: WindowHeader) -> WindowHeader {
        let enc_len = wh.compute_enc_len();
        WindowHeader { enc_len, ..wh }
    }

    #[test]
    fn window_header_source_roundtrip() {
        let wh = with_enc_len(WindowHeader {
            win_ind: VCD_SOURCE | VCD_ADLER32,
            copy_window_len: 65536,
            copy_window_offset: 1024,
            target_window_len: 4096,
            data_len: 1000,
            inst_len: 500,
            addr_len: 200,
            adler32: Some(0x1234_5678),
            ..Default::default()
        });
        let mut buf = Vec::new();
        wh.encode(&mut buf).unwrap();
        let decoded = WindowHeader::decode(&mut Cursor::new(&buf)).unwrap().unwrap();
        assert_eq!(decoded.copy_window_len, 65536);
        assert_eq!(decoded.copy_window_offset, 1024);
        assert_eq!(decoded.target_window_len, 4096);
        assert_eq!(decoded.adler32, Some(0x1234_5678));
        assert!(decoded.copies_from_source());
        assert!(!decoded.copies_from_target());
    }

    #[test]
    fn window_header_target_window_accepted() {
        let wh = with_enc_len(WindowHeader {
            win_ind: VCD_TARGET,
            copy_window_len: 100,
            copy_window_offset: 0,
            target_window_len: 10,
            data_len: 0,
            inst_len: 2,
            addr_len: 1,
            ..Default::default()
        });
        let mut buf = Vec::new();
        wh.encode(&mut buf).unwrap();
        let decoded = WindowHeader::decode(&mut Cursor::new(&buf)).unwrap().unwrap();
        assert!(decoded.copies_from_target());
    }

    #[test]
    fn window_header_eof_is_none() {
        assert!(
            WindowHeader::decode(&mut Cursor::new(&[] as &[u8]))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn window_header_rejects_source_and_target() {
        let data = [VCD_SOURCE | VCD_TARGET];
        assert!(WindowHeader::decode(&mut Cursor::new(&data)).is_err());
    }

    #[test]
    fn window_header_rejects_secondary_sections() {
        let wh = with_enc_len(WindowHeader {
            win_ind: 0,
            target_window_len: 4,
            del_ind: 1,
            data_len: 4,
            inst_len: 1,
            addr_len: 0,
            ..Default::default()
        });
        let mut buf = Vec::new();
        wh.encode(&mut buf).unwrap();
        let err = WindowHeader::decode(&mut Cursor::new(&buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn window_header_rejects_enc_len_mismatch() {
        let wh = WindowHeader {
            win_ind: 0,
            enc_len: 9999,
            target_window_len: 4,
            data_len: 4,
            inst_len: 1,
            addr_len: 0,
            ..Default::default()
        };
        let mut buf = Vec::new();
        wh.encode(&mut buf).unwrap();
        assert!(WindowHeader::decode(&mut Cursor::new(&buf)).is_err());
    }

    #[test]
    fn checksum_is_big_endian_tail() {
        let wh = with_enc_len(WindowHeader {
            win_ind: VCD_ADLER32,
            target_window_len: 1,
            adler32: Some(0xAABB_CCDD),
            ..Default::default()
        });
        let mut buf = Vec::new();
        wh.encode(&mut buf).unwrap();
        assert_eq!(&buf[buf.len() - 4..], &[0xAA, 0xBB, 0xCC, 0xDD]);
    }
}
