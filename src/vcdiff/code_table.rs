// VCDIFF default code table (RFC 3284, Section 5.6).
//
// The 256-entry table is generated from the same descriptor parameters
// xdelta3 feeds to `xd3_build_code_table`, so opcode assignments are
// byte-for-byte compatible with deltas produced by xdelta3.

/// Instruction type tags, matching xdelta3's `xd3_rtype`.
pub const TYPE_NOOP: u8 = 0;
pub const TYPE_ADD: u8 = 1;
pub const TYPE_RUN: u8 = 2;
/// COPY types are `TYPE_CPY + mode`, mode in 0..9 for the default table.
pub const TYPE_CPY: u8 = 3;

/// Minimum COPY match length in the default table.
pub const MIN_MATCH: u8 = 4;

/// One of 256 opcode slots.  An opcode encodes one instruction, or two
/// when `type2 != TYPE_NOOP`.  A zero size means the actual size follows
/// as a varint in the instruction section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableEntry {
    pub type1: u8,
    pub size1: u8,
    pub type2: u8,
    pub size2: u8,
}

pub type CodeTable = [TableEntry; 256];

// ---------------------------------------------------------------------------
// Table generation
// ---------------------------------------------------------------------------

/// The `__rfc3284_code_table_desc` parameters.
struct TableDesc {
    add_sizes: u8,
    near_modes: u8,
    same_modes: u8,
    cpy_sizes: u8,
    addcopy_add_max: u8,
    addcopy_near_cpy_max: u8,
    addcopy_same_cpy_max: u8,
    copyadd_add_max: u8,
    copyadd_near_cpy_max: u8,
    copyadd_same_cpy_max: u8,
}

const RFC3284_DESC: TableDesc = TableDesc {
    add_sizes: 17,
    near_modes: 4,
    same_modes: 3,
    cpy_sizes: 15,
    addcopy_add_max: 4,
    addcopy_near_cpy_max: 6,
    addcopy_same_cpy_max: 4,
    copyadd_add_max: 1,
    copyadd_near_cpy_max: 4,
    copyadd_same_cpy_max: 4,
};

/// Number of COPY modes in the default table (2 + near + same = 9).
pub const CPY_MODES: u8 = 2 + RFC3284_DESC.near_modes + RFC3284_DESC.same_modes;

/// Generate the default code table from the RFC 3284 descriptor.
pub fn build_default_table() -> CodeTable {
    let d = &RFC3284_DESC;
    let mut tbl = [TableEntry::default(); 256];
    let mut idx = 0usize;

    let put = |tbl: &mut CodeTable, idx: &mut usize, e: TableEntry| {
        tbl[*idx] = e;
        *idx += 1;
    };
    let single = |t: u8, s: u8| TableEntry {
        type1: t,
        size1: s,
        type2: TYPE_NOOP,
        size2: 0,
    };

    // RUN and ADD with explicit size, then ADD sizes 1..=add_sizes.
    put(&mut tbl, &mut idx, single(TYPE_RUN, 0));
    put(&mut tbl, &mut idx, single(TYPE_ADD, 0));
    for size in 1..=d.add_sizes {
        put(&mut tbl, &mut idx, single(TYPE_ADD, size));
    }

    // Per COPY mode: explicit size, then MIN_MATCH..MIN_MATCH+cpy_sizes.
    for mode in 0..CPY_MODES {
        put(&mut tbl, &mut idx, single(TYPE_CPY + mode, 0));
        for size in MIN_MATCH..MIN_MATCH + d.cpy_sizes {
            put(&mut tbl, &mut idx, single(TYPE_CPY + mode, size));
        }
    }

    // ADD+COPY fused opcodes.
    for mode in 0..CPY_MODES {
        let cpy_max = if mode < 2 + d.near_modes {
            d.addcopy_near_cpy_max
        } else {
            d.addcopy_same_cpy_max
        };
        for add_size in 1..=d.addcopy_add_max {
            for cpy_size in MIN_MATCH..=cpy_max {
                put(
                    &mut tbl,
                    &mut idx,
                    TableEntry {
                        type1: TYPE_ADD,
                        size1: add_size,
                        type2: TYPE_CPY + mode,
                        size2: cpy_size,
                    },
                );
            }
        }
    }

    // COPY+ADD fused opcodes.
    for mode in 0..CPY_MODES {
        let cpy_max = if mode < 2 + d.near_modes {
            d.copyadd_near_cpy_max
        } else {
            d.copyadd_same_cpy_max
        };
        for cpy_size in MIN_MATCH..=cpy_max {
            for add_size in 1..=d.copyadd_add_max {
                put(
                    &mut tbl,
                    &mut idx,
                    TableEntry {
                        type1: TYPE_CPY + mode,
                        size1: cpy_size,
                        type2: TYPE_ADD,
                        size2: add_size,
                    },
                );
            }
        }
    }

    debug_assert_eq!(idx, 256, "descriptor must fill the table exactly");
    tbl
}

/// The lazily-initialized default code table.
pub fn default_table() -> &'static CodeTable {
    use std::sync::LazyLock;
    static TABLE: LazyLock<CodeTable> = LazyLock::new(build_default_table);
    &TABLE
}

// ---------------------------------------------------------------------------
// Opcode selection (encoder side)
//
// Same selection rules as xdelta3's `xd3_choose_instruction`.
// ---------------------------------------------------------------------------

/// An instruction about to be encoded: `TYPE_ADD`, `TYPE_RUN`, or
/// `TYPE_CPY + mode`, plus its size.
#[derive(Debug, Clone, Copy)]
pub struct HalfInst {
    pub itype: u8,
    pub size: u32,
}

/// Opcode choice for one instruction.
#[derive(Debug, Clone, Copy)]
pub struct Picked {
    /// Opcode encoding this instruction alone.
    pub single: u8,
    /// Fused opcode encoding the *previous* queued instruction together
    /// with this one, when the pair fits a double slot.
    pub fused: Option<u8>,
}

/// Choose opcode(s) for `inst`, possibly fusing with the previously
/// queued instruction `prev`.
pub fn pick_opcodes(prev: Option<&HalfInst>, inst: &HalfInst) -> Picked {
    match inst.itype {
        TYPE_RUN => Picked {
            single: 0,
            fused: None,
        },

        TYPE_ADD => {
            let mut single = 1u8;
            let mut fused = None;
            if inst.size <= 17 {
                single += inst.size as u8;
                if inst.size == 1
                    && let Some(prev) = prev
                    && prev.size == 4
                    && prev.itype >= TYPE_CPY
                {
                    // COPY(4, mode) + ADD(1)
                    fused = Some(247 + (prev.itype - TYPE_CPY));
                }
            }
            Picked { single, fused }
        }

        _ => {
            let mode = inst.itype - TYPE_CPY;
            let mut single = 19 + 16 * mode;
            let mut fused = None;
            if (4..=18).contains(&inst.size) {
                single += inst.size as u8 - 3;
                if let Some(prev) = prev
                    && prev.itype == TYPE_ADD
                    && prev.size <= 4
                {
                    if inst.size <= 6 && mode <= 5 {
                        // ADD(1..4) + COPY(4..6), NEAR-group modes
                        fused = Some(
                            163 + mode * 12 + 3 * (prev.size as u8 - 1) + (inst.size as u8 - 4),
                        );
                    } else if inst.size == 4 && mode >= 6 {
                        // ADD(1..4) + COPY(4), SAME-group modes
                        fused = Some(235 + (mode - 6) * 4 + (prev.size as u8 - 1));
                    }
                }
            }
            Picked { single, fused }
        }
    }
}

// ---------------------------------------------------------------------------
// Decoded instruction record
// ---------------------------------------------------------------------------

/// One decoded instruction, with its COPY address already resolved
/// through the address cache.  Addresses live in the combined
/// source-window + target address space of the window that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Emit `len` literal bytes from the data section.
    Add { len: u32 },
    /// Copy `len` bytes from absolute address `addr`.
    Copy { len: u32, addr: u64, mode: u8 },
    /// Repeat one data-section byte `len` times.
    Run { len: u32 },
}

impl Instruction {
    /// Output bytes this instruction produces.
    #[inline]
    pub fn len(&self) -> u32 {
        match *self {
            Instruction::Add { len } | Instruction::Copy { len, .. } | Instruction::Run { len } => {
                len
            }
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_layout_landmarks() {
        let t = default_table();
        // 0: RUN, 1: ADD size=0, 2..=18: ADD sizes 1..=17.
        assert_eq!((t[0].type1, t[0].size1), (TYPE_RUN, 0));
        assert_eq!((t[1].type1, t[1].size1), (TYPE_ADD, 0));
        assert_eq!((t[2].type1, t[2].size1), (TYPE_ADD, 1));
        assert_eq!((t[18].type1, t[18].size1), (TYPE_ADD, 17));
        // COPY mode 0 block: 19 (size=0), 20..=34 (sizes 4..=18).
        assert_eq!((t[19].type1, t[19].size1), (TYPE_CPY, 0));
        assert_eq!((t[20].type1, t[20].size1), (TYPE_CPY, 4));
        assert_eq!((t[34].type1, t[34].size1), (TYPE_CPY, 18));
        // COPY mode 8 block ends the singles at 162.
        assert_eq!((t[147].type1, t[147].size1), (TYPE_CPY + 8, 0));
        assert_eq!((t[162].type1, t[162].size1), (TYPE_CPY + 8, 18));
        // Fused blocks.
        assert_eq!(
            (t[163].type1, t[163].size1, t[163].type2, t[163].size2),
            (TYPE_ADD, 1, TYPE_CPY, 4)
        );
        assert_eq!(
            (t[247].type1, t[247].size1, t[247].type2, t[247].size2),
            (TYPE_CPY, 4, TYPE_ADD, 1)
        );
        assert_eq!(
            (t[255].type1, t[255].size1, t[255].type2, t[255].size2),
            (TYPE_CPY + 8, 4, TYPE_ADD, 1)
        );
    }

    #[test]
    fn fused_entries_have_fixed_sizes() {
        for (i, e) in default_table().iter().enumerate() {
            if e.type2 != TYPE_NOOP {
                assert_ne!(e.size1, 0, "fused opcode {i} with varint size1");
                assert_ne!(e.size2, 0, "fused opcode {i} with varint size2");
            }
        }
    }

    #[test]
    fn pick_run_is_opcode_zero() {
        let p = pick_opcodes(
            None,
            &HalfInst {
                itype: TYPE_RUN,
                size: 10,
            },
        );
        assert_eq!(p.single, 0);
        assert!(p.fused.is_none());
    }

    #[test]
    fn pick_add_sizes() {
        for size in 1..=17u32 {
            let p = pick_opcodes(None, &HalfInst {
                itype: TYPE_ADD,
                size,
            });
            assert_eq!(p.single, 1 + size as u8);
        }
        // Larger ADDs fall back to the explicit-size opcode.
        let p = pick_opcodes(None, &HalfInst {
            itype: TYPE_ADD,
            size: 18,
        });
        assert_eq!(p.single, 1);
    }

    #[test]
    fn pick_fused_add_copy() {
        let prev = HalfInst {
            itype: TYPE_ADD,
            size: 1,
        };
        let inst = HalfInst {
            itype: TYPE_CPY,
            size: 4,
        };
        assert_eq!(pick_opcodes(Some(&prev), &inst).fused, Some(163));
    }

    #[test]
    fn pick_fused_copy_add() {
        let prev = HalfInst {
            itype: TYPE_CPY,
            size: 4,
        };
        let inst = HalfInst {
            itype: TYPE_ADD,
            size: 1,
        };
        assert_eq!(pick_opcodes(Some(&prev), &inst).fused, Some(247));
    }

    #[test]
    fn pick_fused_same_group() {
        let prev = HalfInst {
            itype: TYPE_ADD,
            size: 2,
        };
        let inst = HalfInst {
            itype: TYPE_CPY + 6,
            size: 4,
        };
        // 235 + 0*4 + (2-1) = 236
        assert_eq!(pick_opcodes(Some(&prev), &inst).fused, Some(236));
    }

    #[test]
    fn picked_opcodes_agree_with_table() {
        // Every single opcode pick must land on a table entry describing
        // the same instruction.
        let t = default_table();
        for itype in [TYPE_RUN, TYPE_ADD, TYPE_CPY, TYPE_CPY + 5, TYPE_CPY + 8] {
            for size in [1u32, 4, 6, 17, 18, 100] {
                if itype >= TYPE_CPY && size < MIN_MATCH as u32 {
                    continue;
                }
                let p = pick_opcodes(None, &HalfInst { itype, size });
                let e = &t[p.single as usize];
                assert_eq!(e.type1, itype, "itype={itype} size={size}");
                assert!(
                    e.size1 == 0 || e.size1 as u32 == size,
                    "itype={itype} size={size} entry size {}",
                    e.size1
                );
            }
        }
    }
}
