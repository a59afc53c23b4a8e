// VCDIFF COPY-address cache (RFC 3284, Section 5.3).
//
// NEAR and SAME caches shrink COPY addresses: an address is sent either
// as a varint relative to one of several bases (SELF, HERE, NEAR slots)
// or as a single byte indexing the SAME table.  Cache update order is
// identical on the encode and decode sides, so both stay in lockstep.

use super::varint;

/// Mode 0: the address itself.
pub const MODE_SELF: u8 = 0;
/// Mode 1: distance back from the current position.
pub const MODE_HERE: u8 = 1;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrError {
    /// Address section exhausted mid-address.
    Underflow,
    /// Decoded address is outside the valid address space.
    OutOfRange,
}

impl std::fmt::Display for AddrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddrError::Underflow => write!(f, "address section underflow"),
            AddrError::OutOfRange => write!(f, "copy address out of range"),
        }
    }
}

impl std::error::Error for AddrError {}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// NEAR/SAME address cache with the default RFC 3284 geometry
/// (4 NEAR slots, 3 SAME groups, 9 modes total).
#[derive(Clone)]
pub struct AddressCache {
    near: [u64; Self::NEAR_SLOTS],
    same: Vec<u64>,
    next_near: usize,
}

impl AddressCache {
    const NEAR_SLOTS: usize = 4;
    const SAME_GROUPS: usize = 3;

    pub fn new() -> Self {
        Self {
            near: [0; Self::NEAR_SLOTS],
            same: vec![0; Self::SAME_GROUPS * 256],
            next_near: 0,
        }
    }

    /// Number of address modes (2 + near + same).
    #[inline]
    pub fn mode_count() -> u8 {
        (2 + Self::NEAR_SLOTS + Self::SAME_GROUPS) as u8
    }

    /// First SAME mode index.
    #[inline]
    fn same_base() -> usize {
        2 + Self::NEAR_SLOTS
    }

    /// Zero all cache state.  Every window starts from a fresh cache.
    pub fn reset(&mut self) {
        self.near = [0; Self::NEAR_SLOTS];
        self.same.fill(0);
        self.next_near = 0;
    }

    /// Record an address after it was encoded or decoded.
    /// Exact `xd3_update_cache` behavior.
    #[inline]
    fn update(&mut self, addr: u64) {
        self.near[self.next_near] = addr;
        self.next_near = (self.next_near + 1) % Self::NEAR_SLOTS;
        let idx = addr as usize % (Self::SAME_GROUPS * 256);
        self.same[idx] = addr;
    }

    // -----------------------------------------------------------------------
    // Encode
    // -----------------------------------------------------------------------

    /// Encode `addr` (which must be `< here`), appending the address
    /// bytes to `out`.  Returns the chosen mode.
    pub fn encode(&mut self, addr: u64, here: u64, out: &mut Vec<u8>) -> u8 {
        debug_assert!(addr < here);

        // An exact SAME hit costs one byte, beating every varint.
        let same_idx = addr as usize % (Self::SAME_GROUPS * 256);
        if self.same[same_idx] == addr {
            self.update(addr);
            out.push((same_idx % 256) as u8);
            return (Self::same_base() + same_idx / 256) as u8;
        }

        // Otherwise pick the base giving the shortest distance; ties go
        // to the lower mode number.
        let mut best_val = addr;
        let mut best_mode = MODE_SELF;
        let here_d = here - addr;
        if here_d < best_val {
            best_val = here_d;
            best_mode = MODE_HERE;
        }
        for (slot, &base) in self.near.iter().enumerate() {
            if addr >= base && addr - base < best_val {
                best_val = addr - base;
                best_mode = (slot + 2) as u8;
            }
        }

        self.update(addr);
        varint::push(out, best_val);
        best_mode
    }

    // -----------------------------------------------------------------------
    // Decode
    // -----------------------------------------------------------------------

    /// Decode one address from the front of `addr_data`.
    ///
    /// `here` is the current position in the combined address space
    /// (copy-window length + target bytes produced so far).  Returns
    /// `(address, bytes_consumed)`.
    pub fn decode(
        &mut self,
        mode: u8,
        addr_data: &[u8],
        here: u64,
    ) -> Result<(u64, usize), AddrError> {
        let mode = mode as usize;
        let (addr, consumed) = if mode < Self::same_base() {
            let (raw, consumed) = varint::read(addr_data).map_err(|_| AddrError::Underflow)?;
            let addr = match mode {
                0 => raw,
                1 => here.checked_sub(raw).ok_or(AddrError::OutOfRange)?,
                _ => self.near[mode - 2]
                    .checked_add(raw)
                    .ok_or(AddrError::OutOfRange)?,
            };
            (addr, consumed)
        } else {
            let &byte = addr_data.first().ok_or(AddrError::Underflow)?;
            let group = mode - Self::same_base();
            (self.same[group * 256 + byte as usize], 1)
        };

        if addr >= here {
            return Err(AddrError::OutOfRange);
        }
        self.update(addr);
        Ok((addr, consumed))
    }
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_one(enc: &mut AddressCache, dec: &mut AddressCache, addr: u64, here: u64) {
        let mut bytes = Vec::new();
        let mode = enc.encode(addr, here, &mut bytes);
        assert!(mode < AddressCache::mode_count());
        let (decoded, consumed) = dec.decode(mode, &bytes, here).unwrap();
        assert_eq!(decoded, addr, "addr={addr} here={here} mode={mode}");
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn self_mode_for_small_absolute() {
        let mut enc = AddressCache::new();
        let mut out = Vec::new();
        let mode = enc.encode(42, 1000, &mut out);
        assert_eq!(mode, MODE_SELF);
        assert_eq!(out, &[42]);
    }

    #[test]
    fn here_mode_when_closer() {
        let mut enc = AddressCache::new();
        let mut out = Vec::new();
        let mode = enc.encode(990, 1000, &mut out);
        assert_eq!(mode, MODE_HERE);
        assert_eq!(out, &[10]);
    }

    #[test]
    fn near_mode_after_priming() {
        let mut enc = AddressCache::new();
        let mut dec = AddressCache::new();
        roundtrip_one(&mut enc, &mut dec, 500_000, 1_000_000);
        // Close to the primed slot: a NEAR mode should win.
        let mut out = Vec::new();
        let mode = enc.encode(500_005, 1_000_000, &mut out);
        assert!((2..6).contains(&mode), "expected NEAR mode, got {mode}");
        let (decoded, _) = dec.decode(mode, &out, 1_000_000).unwrap();
        assert_eq!(decoded, 500_005);
    }

    #[test]
    fn same_mode_single_byte() {
        let mut enc = AddressCache::new();
        let mut dec = AddressCache::new();
        let addr = 12_345u64;
        roundtrip_one(&mut enc, &mut dec, addr, 10_000_000);
        // Push the address out of every NEAR slot.
        for i in 1..=4u64 {
            roundtrip_one(&mut enc, &mut dec, i * 1_000_000, 10_000_000);
        }
        let mut out = Vec::new();
        let mode = enc.encode(addr, 10_000_000, &mut out);
        assert!(mode as usize >= 2 + 4, "expected SAME mode, got {mode}");
        assert_eq!(out.len(), 1);
        let (decoded, consumed) = dec.decode(mode, &out, 10_000_000).unwrap();
        assert_eq!((decoded, consumed), (addr, 1));
    }

    #[test]
    fn decode_rejects_here_underflow() {
        let mut dec = AddressCache::new();
        // HERE with distance greater than `here`.
        let mut bytes = Vec::new();
        varint::push(&mut bytes, 50);
        assert_eq!(
            dec.decode(MODE_HERE, &bytes, 10),
            Err(AddrError::OutOfRange)
        );
    }

    #[test]
    fn decode_rejects_address_at_or_past_here() {
        let mut dec = AddressCache::new();
        let mut bytes = Vec::new();
        varint::push(&mut bytes, 10);
        assert_eq!(
            dec.decode(MODE_SELF, &bytes, 10),
            Err(AddrError::OutOfRange)
        );
    }

    #[test]
    fn decode_rejects_empty_section() {
        let mut dec = AddressCache::new();
        assert_eq!(dec.decode(MODE_SELF, &[], 10), Err(AddrError::Underflow));
        let same_mode = 2 + 4;
        assert_eq!(dec.decode(same_mode, &[], 10), Err(AddrError::Underflow));
    }

    #[test]
    fn stays_in_lockstep_over_a_session() {
        let mut enc = AddressCache::new();
        let mut dec = AddressCache::new();
        let addrs = [0u64, 4, 100, 4, 100, 50_000, 50_004, 50_000, 1, 99_999];
        let mut here = 100_000u64;
        for &addr in &addrs {
            roundtrip_one(&mut enc, &mut dec, addr, here);
            here += 100;
        }
    }
}
