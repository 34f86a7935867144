//! Shared vocabulary for the rv2wasm pipeline: the guest machine-state layout
//! (§3 of the design), the index types threaded between the CFG builder, the
//! translator and the emitter, and the sentinel encoding used for a block
//! function's return value (§6.4).

use cranelift_entity::entity_impl;

/// Offset of the integer register file (`x0..x31`) within the machine-state region.
pub const INT_REGS_OFFSET: u32 = 0;
/// Size in bytes of the integer register file.
pub const INT_REGS_SIZE: u32 = 256;
/// Offset of the floating-point register file (`f0..f31`).
pub const FLOAT_REGS_OFFSET: u32 = INT_REGS_OFFSET + INT_REGS_SIZE;
/// Size in bytes of the floating-point register file.
pub const FLOAT_REGS_SIZE: u32 = 256;
/// Offset of the LR/SC reservation-address slot.
pub const RESERVATION_OFFSET: u32 = FLOAT_REGS_OFFSET + FLOAT_REGS_SIZE;
/// Total size of the machine-state region. Guest RAM begins here.
pub const STATE_SIZE: u32 = RESERVATION_OFFSET + 8;

/// Byte offset of integer register `r` (0..=31) in the state region.
pub const fn int_reg_offset(r: u8) -> u32 {
    INT_REGS_OFFSET + (r as u32) * 8
}

/// Byte offset of floating-point register `r` (0..=31) in the state region.
pub const fn float_reg_offset(r: u8) -> u32 {
    FLOAT_REGS_OFFSET + (r as u32) * 8
}

/// A RISC-V integer or floating-point register index, 0..=31.
///
/// `x0`/`f0` are representable but the translator must never emit a write
/// through `Reg(0)` of the integer file (§3 invariant 2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Reg(u8);

impl Reg {
    pub const ZERO: Reg = Reg(0);

    /// Builds a register reference, panicking if `index` is out of the 5-bit range.
    pub fn new(index: u8) -> Reg {
        assert!(index < 32, "register index {index} out of range");
        Reg(index)
    }

    pub const fn index(self) -> u8 {
        self.0
    }

    /// `true` for the hard-wired-zero integer register.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// Dense index of a basic block within a [`crate::Reg`]-addressed [block
/// graph](../rv2wasm_cfg/index.html), in CFG-builder enumeration order.
///
/// Mirrors the way Cranelift represents its own `Block` and `Inst` handles:
/// a `u32` newtype with the standard entity-reference operations.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockIndex(u32);
entity_impl!(BlockIndex, "block");

/// Dense index of an emitted Wasm function, assigned in the same order as
/// [`BlockIndex`] so that the dispatch table can use block index and function
/// index interchangeably.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncIndex(u32);
entity_impl!(FuncIndex, "func");

/// 32-bit signed value of all-ones: the dispatcher halts when a block
/// function returns this.
pub const HALT_SENTINEL: i32 = -1;

/// High bit of the 32-bit dispatcher return value. When set (and the value
/// is not [`HALT_SENTINEL`]), the low 31 bits carry the guest PC of the
/// instruction that trapped into a syscall.
pub const SYSCALL_BIT: u32 = 0x8000_0000;

/// Encodes a syscall handoff: the dispatcher will invoke the imported
/// syscall function with `pc` and resume at the PC it returns.
///
/// `pc` is truncated to its low 31 bits; callers are responsible for keeping
/// guest code below that range (see the open question in §9 of the design:
/// the convention does not disambiguate a legitimate PC at or above
/// `0x8000_0000` from the syscall tag).
pub fn encode_syscall(pc: u32) -> i32 {
    ((pc & !SYSCALL_BIT) | SYSCALL_BIT) as i32
}

/// The three ways a dispatcher return value can be interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchSignal {
    Halt,
    Syscall { pc: u32 },
    NextPc(u32),
}

/// Decodes a raw dispatcher return value per §6.4. `HALT_SENTINEL` is
/// checked before the syscall bit since `-1` also has every low bit set.
pub fn decode_dispatch(value: i32) -> DispatchSignal {
    if value == HALT_SENTINEL {
        DispatchSignal::Halt
    } else if (value as u32) & SYSCALL_BIT != 0 {
        DispatchSignal::Syscall {
            pc: (value as u32) & !SYSCALL_BIT,
        }
    } else {
        DispatchSignal::NextPc(value as u32)
    }
}

/// Options threaded through the whole pipeline; constructed by the CLI's
/// `clap` arguments but equally usable by an embedder calling the crates
/// directly as a library (§2.1).
#[derive(Clone, Copy, Debug)]
pub struct TranslateOptions {
    /// Optimization level requested (0, 1 or 2). The translator currently
    /// uses this only to decide whether to cache repeated register reads in
    /// scratch locals (level >= 1); it never changes observable semantics.
    pub opt_level: u8,
    /// Emit `block_<addr>` export names and retain a guest-PC-to-function-index
    /// map for host-side debugging (§6.2).
    pub debug: bool,
    /// Print per-segment and per-block statistics while translating (§6.1).
    pub verbose: bool,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        TranslateOptions {
            opt_level: 2,
            debug: false,
            verbose: false,
        }
    }
}
