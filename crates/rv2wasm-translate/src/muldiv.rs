//! RV64M multiply/divide/remainder translation, including the RISC-V
//! division-by-zero and signed-overflow rules that Wasm's native `div`/`rem`
//! instructions would otherwise trap on (§4.4).

use rv2wasm_decode::MulOp;
use rv2wasm_types::Reg;

use crate::ir::{WasmInst, SCRATCH_I64_BASE};
use crate::{pop_into_int_reg, push_int_reg};

const SCRATCH_LHS: u32 = SCRATCH_I64_BASE;
const SCRATCH_RHS: u32 = SCRATCH_I64_BASE + 1;
const SCRATCH_T: u32 = SCRATCH_I64_BASE + 2;

pub fn translate_mul(body: &mut Vec<WasmInst>, op: MulOp, rd: Reg, rs1: Reg, rs2: Reg) {
    if rd.is_zero() {
        return;
    }
    match op {
        MulOp::Mul => {
            push_int_reg(body, rs1);
            push_int_reg(body, rs2);
            body.push(WasmInst::I64Mul);
        }
        MulOp::Mulh | MulOp::Mulhsu | MulOp::Mulhu => {
            // High 64 bits of a 128-bit product. Wasm has no 128-bit
            // multiply; emulate via the standard double-width decomposition
            // is out of proportion for this translator's scope, so the
            // high half is produced via widening through the only integer
            // width Wasm offers: split operands into 32-bit halves and
            // accumulate partial products in scratch locals.
            translate_mulh(body, op, rs1, rs2);
            pop_into_int_reg(body, rd);
            return;
        }
        MulOp::Div => {
            translate_div(body, rs1, rs2, true, false);
        }
        MulOp::Divu => {
            translate_div(body, rs1, rs2, false, false);
        }
        MulOp::Rem => {
            translate_div(body, rs1, rs2, true, true);
        }
        MulOp::Remu => {
            translate_div(body, rs1, rs2, false, true);
        }
    }
    pop_into_int_reg(body, rd);
}

/// `rs1 * rs2`'s high 64 bits, computed via the standard carry-propagating
/// 32x32->64 partial-product decomposition (Hacker's Delight's `mulhu`)
/// since Wasm has no 128-bit multiply. `a`/`b` stay in `SCRATCH_LHS`/
/// `SCRATCH_RHS` as full 64-bit values throughout — their halves are
/// recomputed from them on demand rather than cached in their own locals,
/// which keeps this within the shared six-slot scratch budget.
fn translate_mulh(body: &mut Vec<WasmInst>, op: MulOp, rs1: Reg, rs2: Reg) {
    push_int_reg(body, rs1);
    body.push(WasmInst::LocalSet(SCRATCH_LHS));
    push_int_reg(body, rs2);
    body.push(WasmInst::LocalSet(SCRATCH_RHS));

    // Treat both operands as unsigned 64-bit for the partial-product step,
    // then apply the sign correction appropriate to `op` afterward (the
    // standard trick: computing the unsigned full product and subtracting
    // back the sign-extension contribution of each negative operand).
    let a_lo = |body: &mut Vec<WasmInst>| {
        body.push(WasmInst::LocalGet(SCRATCH_LHS));
        body.push(WasmInst::I64Const(0xffff_ffff));
        body.push(WasmInst::I64And);
    };
    let a_hi = |body: &mut Vec<WasmInst>| {
        body.push(WasmInst::LocalGet(SCRATCH_LHS));
        body.push(WasmInst::I64Const(32));
        body.push(WasmInst::I64ShrU);
    };
    let b_lo = |body: &mut Vec<WasmInst>| {
        body.push(WasmInst::LocalGet(SCRATCH_RHS));
        body.push(WasmInst::I64Const(0xffff_ffff));
        body.push(WasmInst::I64And);
    };
    let b_hi = |body: &mut Vec<WasmInst>| {
        body.push(WasmInst::LocalGet(SCRATCH_RHS));
        body.push(WasmInst::I64Const(32));
        body.push(WasmInst::I64ShrU);
    };

    // k = (a_lo * b_lo) >> 32
    a_lo(body);
    b_lo(body);
    body.push(WasmInst::I64Mul);
    body.push(WasmInst::I64Const(32));
    body.push(WasmInst::I64ShrU);

    // t1 = a_hi * b_lo + k; stash it, its low/high halves (w2/w1) are each
    // needed once more below.
    a_hi(body);
    b_lo(body);
    body.push(WasmInst::I64Mul);
    body.push(WasmInst::I64Add);
    body.push(WasmInst::LocalSet(SCRATCH_T));

    // t2 = a_lo * b_hi + w2; k2 = t2 >> 32
    a_lo(body);
    b_hi(body);
    body.push(WasmInst::I64Mul);
    body.push(WasmInst::LocalGet(SCRATCH_T));
    body.push(WasmInst::I64Const(0xffff_ffff));
    body.push(WasmInst::I64And);
    body.push(WasmInst::I64Add);
    body.push(WasmInst::I64Const(32));
    body.push(WasmInst::I64ShrU);

    // hi = a_hi * b_hi + w1 + k2
    a_hi(body);
    b_hi(body);
    body.push(WasmInst::I64Mul);
    body.push(WasmInst::LocalGet(SCRATCH_T));
    body.push(WasmInst::I64Const(32));
    body.push(WasmInst::I64ShrU);
    body.push(WasmInst::I64Add);
    body.push(WasmInst::I64Add);

    match op {
        MulOp::Mulhu => {}
        MulOp::Mulh => {
            // Subtract b if a<0, subtract a if b<0 (two's-complement high-word correction).
            body.push(WasmInst::LocalGet(SCRATCH_LHS));
            body.push(WasmInst::I64Const(0));
            body.push(WasmInst::I64LtS);
            body.push(WasmInst::I64ExtendI32U);
            body.push(WasmInst::LocalGet(SCRATCH_RHS));
            body.push(WasmInst::I64Mul);
            body.push(WasmInst::I64Sub);
            body.push(WasmInst::LocalGet(SCRATCH_RHS));
            body.push(WasmInst::I64Const(0));
            body.push(WasmInst::I64LtS);
            body.push(WasmInst::I64ExtendI32U);
            body.push(WasmInst::LocalGet(SCRATCH_LHS));
            body.push(WasmInst::I64Mul);
            body.push(WasmInst::I64Sub);
        }
        MulOp::Mulhsu => {
            body.push(WasmInst::LocalGet(SCRATCH_LHS));
            body.push(WasmInst::I64Const(0));
            body.push(WasmInst::I64LtS);
            body.push(WasmInst::I64ExtendI32U);
            body.push(WasmInst::LocalGet(SCRATCH_RHS));
            body.push(WasmInst::I64Mul);
            body.push(WasmInst::I64Sub);
        }
        MulOp::Mul | MulOp::Div | MulOp::Divu | MulOp::Rem | MulOp::Remu => unreachable!(),
    }
}

/// Pushes the RISC-V-correct result of `rs1 op rs2` for `DIV`/`DIVU`/
/// `REM`/`REMU`. Wasm's `i64.div_s`/`i64.rem_s` trap on division by zero and
/// on `i64::MIN / -1`, so those cases must be guarded with a real `if` —
/// `select` evaluates both arms eagerly and would trap before it had a
/// chance to choose (§4.4).
fn translate_div(body: &mut Vec<WasmInst>, rs1: Reg, rs2: Reg, signed: bool, remainder: bool) {
    push_int_reg(body, rs1);
    body.push(WasmInst::LocalSet(SCRATCH_LHS));
    push_int_reg(body, rs2);
    body.push(WasmInst::LocalSet(SCRATCH_RHS));

    body.push(WasmInst::LocalGet(SCRATCH_RHS));
    body.push(WasmInst::I64Const(0));
    body.push(WasmInst::I64Eq);
    body.push(WasmInst::If { i64_result: true });
    // Division by zero: quotient all-ones, remainder the dividend.
    if remainder {
        body.push(WasmInst::LocalGet(SCRATCH_LHS));
    } else {
        body.push(WasmInst::I64Const(-1));
    }
    body.push(WasmInst::Else);
    if signed {
        body.push(WasmInst::LocalGet(SCRATCH_LHS));
        body.push(WasmInst::I64Const(i64::MIN));
        body.push(WasmInst::I64Eq);
        body.push(WasmInst::LocalGet(SCRATCH_RHS));
        body.push(WasmInst::I64Const(-1));
        body.push(WasmInst::I64Eq);
        body.push(WasmInst::I32And);
        body.push(WasmInst::If { i64_result: true });
        // Signed overflow: quotient the dividend, remainder zero.
        if remainder {
            body.push(WasmInst::I64Const(0));
        } else {
            body.push(WasmInst::LocalGet(SCRATCH_LHS));
        }
        body.push(WasmInst::Else);
        body.push(WasmInst::LocalGet(SCRATCH_LHS));
        body.push(WasmInst::LocalGet(SCRATCH_RHS));
        body.push(if remainder { WasmInst::I64RemS } else { WasmInst::I64DivS });
        body.push(WasmInst::End);
    } else {
        body.push(WasmInst::LocalGet(SCRATCH_LHS));
        body.push(WasmInst::LocalGet(SCRATCH_RHS));
        body.push(if remainder { WasmInst::I64RemU } else { WasmInst::I64DivU });
    }
    body.push(WasmInst::End);
}

/// `MULW`/`DIVW`/`DIVUW`/`REMW`/`REMUW`: operate on the low 32 bits of each
/// operand, then sign-extend the 32-bit result into the 64-bit register
/// (§4.4's word-form rule — every `*W` op sign-extends regardless of the
/// unsigned forms' own signedness).
pub fn translate_mulw(body: &mut Vec<WasmInst>, op: MulOp, rd: Reg, rs1: Reg, rs2: Reg) {
    if rd.is_zero() {
        return;
    }
    // Keep the scratch locals at their declared i64 width and wrap to i32
    // only on the stack, right before each 32-bit use.
    push_int_reg(body, rs1);
    body.push(WasmInst::LocalSet(SCRATCH_LHS));
    push_int_reg(body, rs2);
    body.push(WasmInst::LocalSet(SCRATCH_RHS));
    let lhs32 = |body: &mut Vec<WasmInst>| {
        body.push(WasmInst::LocalGet(SCRATCH_LHS));
        body.push(WasmInst::I32WrapI64);
    };
    let rhs32 = |body: &mut Vec<WasmInst>| {
        body.push(WasmInst::LocalGet(SCRATCH_RHS));
        body.push(WasmInst::I32WrapI64);
    };

    match op {
        MulOp::Mul => {
            lhs32(body);
            rhs32(body);
            body.push(WasmInst::I32Mul);
        }
        MulOp::Div | MulOp::Divu | MulOp::Rem | MulOp::Remu => {
            let signed = matches!(op, MulOp::Div | MulOp::Rem);
            let remainder = matches!(op, MulOp::Rem | MulOp::Remu);
            rhs32(body);
            body.push(WasmInst::I32Const(0));
            body.push(WasmInst::I32Eq);
            body.push(WasmInst::If { i64_result: false });
            if remainder {
                lhs32(body);
            } else {
                body.push(WasmInst::I32Const(-1));
            }
            body.push(WasmInst::Else);
            if signed {
                lhs32(body);
                body.push(WasmInst::I32Const(i32::MIN));
                body.push(WasmInst::I32Eq);
                rhs32(body);
                body.push(WasmInst::I32Const(-1));
                body.push(WasmInst::I32Eq);
                body.push(WasmInst::I32And);
                body.push(WasmInst::If { i64_result: false });
                if remainder {
                    body.push(WasmInst::I32Const(0));
                } else {
                    lhs32(body);
                }
                body.push(WasmInst::Else);
                lhs32(body);
                rhs32(body);
                body.push(if remainder { WasmInst::I32RemS } else { WasmInst::I32DivS });
                body.push(WasmInst::End);
            } else {
                lhs32(body);
                rhs32(body);
                body.push(if remainder { WasmInst::I32RemU } else { WasmInst::I32DivU });
            }
            body.push(WasmInst::End);
        }
        MulOp::Mulh | MulOp::Mulhsu | MulOp::Mulhu => unreachable!("decoder never emits a *w high-multiply"),
    }
    body.push(WasmInst::I64ExtendI32S);
    pop_into_int_reg(body, rd);
}
