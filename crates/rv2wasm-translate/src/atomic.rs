//! RV64A translation: `LR`/`SC` and the AMO read-modify-write family.
//!
//! The guest model is single-agent (§6.3): no other execution context can
//! observe a block mid-translation, so the reservation protocol degenerates
//! to "does this `SC` target the same address the last `LR` reserved."
//! `aq`/`rl` ordering bits carry no meaning without concurrent observers and
//! are dropped by the decoder's callers here.

use rv2wasm_decode::AmoOp;
use rv2wasm_types::{Reg, RESERVATION_OFFSET};

use crate::ir::{WasmInst, SCRATCH_ADDR, SCRATCH_I64_BASE};
use crate::{pop_into_int_reg, push_int_reg};
use rv2wasm_decode::AtomicWidth;

const OLD: u32 = SCRATCH_I64_BASE;
const RHS: u32 = SCRATCH_I64_BASE + 1;

fn load_width(body: &mut Vec<WasmInst>, width: AtomicWidth) {
    match width {
        AtomicWidth::W => body.push(WasmInst::I64Load32S { offset: 0 }),
        AtomicWidth::D => body.push(WasmInst::I64Load { offset: 0 }),
    }
}

fn store_width(body: &mut Vec<WasmInst>, width: AtomicWidth) {
    match width {
        AtomicWidth::W => body.push(WasmInst::I64Store32 { offset: 0 }),
        AtomicWidth::D => body.push(WasmInst::I64Store { offset: 0 }),
    }
}

/// `LR.W`/`LR.D`: load the reserved value and record the address being
/// watched in the machine-state reservation slot.
pub fn translate_lr(body: &mut Vec<WasmInst>, width: AtomicWidth, rd: Reg, rs1: Reg) {
    push_int_reg(body, rs1);
    body.push(WasmInst::I32WrapI64);
    body.push(WasmInst::LocalSet(SCRATCH_ADDR));

    body.push(WasmInst::LocalGet(0));
    body.push(WasmInst::LocalGet(SCRATCH_ADDR));
    body.push(WasmInst::I64ExtendI32U);
    body.push(WasmInst::I64Store { offset: RESERVATION_OFFSET });

    body.push(WasmInst::LocalGet(SCRATCH_ADDR));
    load_width(body, width);
    pop_into_int_reg(body, rd);
}

/// `SC.W`/`SC.D`: store conditionally on the reservation still matching
/// `rs1`'s address, writing 0 to `rd` on success and 1 on failure (the
/// reservation is cleared either way once an `SC` is attempted).
pub fn translate_sc(body: &mut Vec<WasmInst>, width: AtomicWidth, rd: Reg, rs1: Reg, rs2: Reg) {
    push_int_reg(body, rs1);
    body.push(WasmInst::I32WrapI64);
    body.push(WasmInst::LocalSet(SCRATCH_ADDR));
    push_int_reg(body, rs2);
    body.push(WasmInst::LocalSet(RHS));

    body.push(WasmInst::LocalGet(0));
    body.push(WasmInst::I64Load { offset: RESERVATION_OFFSET });
    body.push(WasmInst::LocalGet(SCRATCH_ADDR));
    body.push(WasmInst::I64ExtendI32U);
    body.push(WasmInst::I64Eq);
    body.push(WasmInst::If { i64_result: false });
    body.push(WasmInst::LocalGet(SCRATCH_ADDR));
    body.push(WasmInst::LocalGet(RHS));
    store_width(body, width);
    body.push(WasmInst::I32Const(0));
    body.push(WasmInst::Else);
    body.push(WasmInst::I32Const(1));
    body.push(WasmInst::End);
    body.push(WasmInst::I64ExtendI32U);
    pop_into_int_reg(body, rd);

    // Any `SC` attempt, success or failure, drops the reservation: clear it
    // to an address no guest `LR` can ever hold.
    body.push(WasmInst::LocalGet(0));
    body.push(WasmInst::I64Const(-1));
    body.push(WasmInst::I64Store { offset: RESERVATION_OFFSET });
}

/// `AMOSWAP`/`AMOADD`/`AMOXOR`/`AMOAND`/`AMOOR`/`AMOMIN[U]`/`AMOMAX[U]`:
/// read-modify-write at `rs1`'s address, writing the pre-op value to `rd`.
pub fn translate_amo(body: &mut Vec<WasmInst>, op: AmoOp, width: AtomicWidth, rd: Reg, rs1: Reg, rs2: Reg) {
    push_int_reg(body, rs1);
    body.push(WasmInst::I32WrapI64);
    body.push(WasmInst::LocalSet(SCRATCH_ADDR));
    push_int_reg(body, rs2);
    body.push(WasmInst::LocalSet(RHS));

    body.push(WasmInst::LocalGet(SCRATCH_ADDR));
    load_width(body, width);
    body.push(WasmInst::LocalSet(OLD));

    body.push(WasmInst::LocalGet(SCRATCH_ADDR));
    match op {
        AmoOp::Swap => body.push(WasmInst::LocalGet(RHS)),
        AmoOp::Add => {
            body.push(WasmInst::LocalGet(OLD));
            body.push(WasmInst::LocalGet(RHS));
            body.push(WasmInst::I64Add);
        }
        AmoOp::Xor => {
            body.push(WasmInst::LocalGet(OLD));
            body.push(WasmInst::LocalGet(RHS));
            body.push(WasmInst::I64Xor);
        }
        AmoOp::And => {
            body.push(WasmInst::LocalGet(OLD));
            body.push(WasmInst::LocalGet(RHS));
            body.push(WasmInst::I64And);
        }
        AmoOp::Or => {
            body.push(WasmInst::LocalGet(OLD));
            body.push(WasmInst::LocalGet(RHS));
            body.push(WasmInst::I64Or);
        }
        AmoOp::Min | AmoOp::Max | AmoOp::Minu | AmoOp::Maxu => {
            // select(old, rhs) keyed on the appropriate comparison; both
            // arms are pure values, so `select` (unlike the divide case) is
            // safe here.
            body.push(WasmInst::LocalGet(OLD));
            body.push(WasmInst::LocalGet(RHS));
            body.push(WasmInst::LocalGet(OLD));
            body.push(WasmInst::LocalGet(RHS));
            match op {
                AmoOp::Min => body.push(WasmInst::I64LtS),
                AmoOp::Max => body.push(WasmInst::I64GeS),
                AmoOp::Minu => body.push(WasmInst::I64LtU),
                AmoOp::Maxu => body.push(WasmInst::I64GeU),
                _ => unreachable!(),
            }
            body.push(WasmInst::Select);
        }
    }
    store_width(body, width);

    body.push(WasmInst::LocalGet(OLD));
    pop_into_int_reg(body, rd);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lr_reads_from_computed_address_and_writes_reservation() {
        let mut body = Vec::new();
        translate_lr(&mut body, AtomicWidth::D, Reg::new(5), Reg::new(10));
        assert!(body.contains(&WasmInst::I64Store { offset: RESERVATION_OFFSET }));
        assert!(body.iter().any(|i| matches!(i, WasmInst::I64Load { offset: 0 })));
    }

    #[test]
    fn sc_to_x0_rd_still_updates_memory_and_reservation() {
        let mut body = Vec::new();
        translate_sc(&mut body, AtomicWidth::W, Reg::ZERO, Reg::new(10), Reg::new(11));
        assert!(body.contains(&WasmInst::If { i64_result: false }));
        assert!(body.contains(&WasmInst::I64Store32 { offset: 0 }));
    }

    #[test]
    fn amo_add_reads_old_value_into_rd() {
        let mut body = Vec::new();
        translate_amo(&mut body, AmoOp::Add, AtomicWidth::D, Reg::new(6), Reg::new(10), Reg::new(11));
        assert!(body.contains(&WasmInst::I64Add));
        assert_eq!(body.last(), Some(&WasmInst::I64Store { offset: rv2wasm_types::int_reg_offset(6) }));
    }
}
