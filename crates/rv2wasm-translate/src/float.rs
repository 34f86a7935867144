//! RV64FD translation. Every op that writes a float register uses the same
//! shape: push the destination `state_ptr` first, then compute the result
//! value on top of it, so the trailing `f32.store`/`f64.store` sees
//! `[state_ptr, value]` without needing a scratch round trip (§4.4, §9) —
//! unlike the integer register writes, which compute the value before they
//! know they'll need to store it.
//!
//! Dynamic rounding modes (`rm` other than round-to-nearest-even) are
//! decoded but not honored; every arithmetic op here uses Wasm's native
//! (round-to-nearest-even) float instructions regardless of `rm`.

use rv2wasm_decode::{FAluOp, FCmpOp, FCvtKind, FMaddOp, FMinMaxOp, FSgnjOp, FWidth};
use rv2wasm_types::{float_reg_offset, Reg};

use crate::ir::{WasmInst, SCRATCH_I64_BASE};
use crate::{pop_into_int_reg, push_effective_addr, push_float_reg_d, push_float_reg_s, push_int_reg};

pub fn translate_fload(body: &mut Vec<WasmInst>, width: FWidth, rd: Reg, rs1: Reg, imm: i64) {
    body.push(WasmInst::LocalGet(0));
    push_effective_addr(body, rs1, imm);
    match width {
        FWidth::S => {
            body.push(WasmInst::F32Load { offset: 0 });
            body.push(WasmInst::F32Store { offset: float_reg_offset(rd.index()) });
        }
        FWidth::D => {
            body.push(WasmInst::F64Load { offset: 0 });
            body.push(WasmInst::F64Store { offset: float_reg_offset(rd.index()) });
        }
    }
}

pub fn translate_fstore(body: &mut Vec<WasmInst>, width: FWidth, rs1: Reg, rs2: Reg, imm: i64) {
    push_effective_addr(body, rs1, imm);
    match width {
        FWidth::S => {
            push_float_reg_s(body, rs2);
            body.push(WasmInst::F32Store { offset: 0 });
        }
        FWidth::D => {
            push_float_reg_d(body, rs2);
            body.push(WasmInst::F64Store { offset: 0 });
        }
    }
}

pub fn translate_falu(body: &mut Vec<WasmInst>, op: FAluOp, width: FWidth, rd: Reg, rs1: Reg, rs2: Reg) {
    body.push(WasmInst::LocalGet(0));
    match width {
        FWidth::S => {
            push_float_reg_s(body, rs1);
            push_float_reg_s(body, rs2);
            body.push(match op {
                FAluOp::Add => WasmInst::F32Add,
                FAluOp::Sub => WasmInst::F32Sub,
                FAluOp::Mul => WasmInst::F32Mul,
                FAluOp::Div => WasmInst::F32Div,
            });
            body.push(WasmInst::F32Store { offset: float_reg_offset(rd.index()) });
        }
        FWidth::D => {
            push_float_reg_d(body, rs1);
            push_float_reg_d(body, rs2);
            body.push(match op {
                FAluOp::Add => WasmInst::F64Add,
                FAluOp::Sub => WasmInst::F64Sub,
                FAluOp::Mul => WasmInst::F64Mul,
                FAluOp::Div => WasmInst::F64Div,
            });
            body.push(WasmInst::F64Store { offset: float_reg_offset(rd.index()) });
        }
    }
}

pub fn translate_fsqrt(body: &mut Vec<WasmInst>, width: FWidth, rd: Reg, rs1: Reg) {
    body.push(WasmInst::LocalGet(0));
    match width {
        FWidth::S => {
            push_float_reg_s(body, rs1);
            body.push(WasmInst::F32Sqrt);
            body.push(WasmInst::F32Store { offset: float_reg_offset(rd.index()) });
        }
        FWidth::D => {
            push_float_reg_d(body, rs1);
            body.push(WasmInst::F64Sqrt);
            body.push(WasmInst::F64Store { offset: float_reg_offset(rd.index()) });
        }
    }
}

/// `FMIN`/`FMAX` approximated with Wasm's native `min`/`max`, which differ
/// from RISC-V's NaN-propagation rule (RISC-V returns the non-NaN operand;
/// Wasm propagates any NaN operand). Scoped simplification, noted in
/// DESIGN.md.
pub fn translate_fminmax(body: &mut Vec<WasmInst>, op: FMinMaxOp, width: FWidth, rd: Reg, rs1: Reg, rs2: Reg) {
    body.push(WasmInst::LocalGet(0));
    match width {
        FWidth::S => {
            push_float_reg_s(body, rs1);
            push_float_reg_s(body, rs2);
            body.push(match op {
                FMinMaxOp::Min => WasmInst::F32Min,
                FMinMaxOp::Max => WasmInst::F32Max,
            });
            body.push(WasmInst::F32Store { offset: float_reg_offset(rd.index()) });
        }
        FWidth::D => {
            push_float_reg_d(body, rs1);
            push_float_reg_d(body, rs2);
            body.push(match op {
                FMinMaxOp::Min => WasmInst::F64Min,
                FMinMaxOp::Max => WasmInst::F64Max,
            });
            body.push(WasmInst::F64Store { offset: float_reg_offset(rd.index()) });
        }
    }
}

pub fn translate_fcmp(body: &mut Vec<WasmInst>, op: FCmpOp, width: FWidth, rd: Reg, rs1: Reg, rs2: Reg) {
    match width {
        FWidth::S => {
            push_float_reg_s(body, rs1);
            push_float_reg_s(body, rs2);
            body.push(match op {
                FCmpOp::Eq => WasmInst::F32Eq,
                FCmpOp::Lt => WasmInst::F32Lt,
                FCmpOp::Le => WasmInst::F32Le,
            });
        }
        FWidth::D => {
            push_float_reg_d(body, rs1);
            push_float_reg_d(body, rs2);
            body.push(match op {
                FCmpOp::Eq => WasmInst::F64Eq,
                FCmpOp::Lt => WasmInst::F64Lt,
                FCmpOp::Le => WasmInst::F64Le,
            });
        }
    }
    body.push(WasmInst::I64ExtendI32U);
    pop_into_int_reg(body, rd);
}

pub fn translate_fmadd(body: &mut Vec<WasmInst>, op: FMaddOp, width: FWidth, rd: Reg, rs1: Reg, rs2: Reg, rs3: Reg) {
    body.push(WasmInst::LocalGet(0));
    match width {
        FWidth::S => {
            push_float_reg_s(body, rs1);
            push_float_reg_s(body, rs2);
            body.push(WasmInst::F32Mul);
            match op {
                FMaddOp::Madd => {
                    push_float_reg_s(body, rs3);
                    body.push(WasmInst::F32Add);
                }
                FMaddOp::Msub => {
                    push_float_reg_s(body, rs3);
                    body.push(WasmInst::F32Sub);
                }
                FMaddOp::Nmsub => {
                    body.push(WasmInst::F32Neg);
                    push_float_reg_s(body, rs3);
                    body.push(WasmInst::F32Add);
                }
                FMaddOp::Nmadd => {
                    body.push(WasmInst::F32Neg);
                    push_float_reg_s(body, rs3);
                    body.push(WasmInst::F32Sub);
                }
            }
            body.push(WasmInst::F32Store { offset: float_reg_offset(rd.index()) });
        }
        FWidth::D => {
            push_float_reg_d(body, rs1);
            push_float_reg_d(body, rs2);
            body.push(WasmInst::F64Mul);
            match op {
                FMaddOp::Madd => {
                    push_float_reg_d(body, rs3);
                    body.push(WasmInst::F64Add);
                }
                FMaddOp::Msub => {
                    push_float_reg_d(body, rs3);
                    body.push(WasmInst::F64Sub);
                }
                FMaddOp::Nmsub => {
                    body.push(WasmInst::F64Neg);
                    push_float_reg_d(body, rs3);
                    body.push(WasmInst::F64Add);
                }
                FMaddOp::Nmadd => {
                    body.push(WasmInst::F64Neg);
                    push_float_reg_d(body, rs3);
                    body.push(WasmInst::F64Sub);
                }
            }
            body.push(WasmInst::F64Store { offset: float_reg_offset(rd.index()) });
        }
    }
}

const SGNJ_A: u32 = SCRATCH_I64_BASE;
const SGNJ_B: u32 = SCRATCH_I64_BASE + 1;

pub fn translate_fsgnj(body: &mut Vec<WasmInst>, op: FSgnjOp, width: FWidth, rd: Reg, rs1: Reg, rs2: Reg) {
    let sign_mask: i64 = match width {
        FWidth::S => 0x8000_0000u32 as i64,
        FWidth::D => i64::MIN,
    };
    match width {
        FWidth::S => {
            push_float_reg_s(body, rs1);
            body.push(WasmInst::I32ReinterpretF32);
            body.push(WasmInst::I64ExtendI32U);
            body.push(WasmInst::LocalSet(SGNJ_A));
            push_float_reg_s(body, rs2);
            body.push(WasmInst::I32ReinterpretF32);
            body.push(WasmInst::I64ExtendI32U);
            body.push(WasmInst::LocalSet(SGNJ_B));
        }
        FWidth::D => {
            push_float_reg_d(body, rs1);
            body.push(WasmInst::I64ReinterpretF64);
            body.push(WasmInst::LocalSet(SGNJ_A));
            push_float_reg_d(body, rs2);
            body.push(WasmInst::I64ReinterpretF64);
            body.push(WasmInst::LocalSet(SGNJ_B));
        }
    }

    body.push(WasmInst::LocalGet(0));
    body.push(WasmInst::LocalGet(SGNJ_A));
    body.push(WasmInst::I64Const(!sign_mask));
    body.push(WasmInst::I64And);
    match op {
        FSgnjOp::Plain => {
            body.push(WasmInst::LocalGet(SGNJ_B));
            body.push(WasmInst::I64Const(sign_mask));
            body.push(WasmInst::I64And);
        }
        FSgnjOp::Negate => {
            body.push(WasmInst::LocalGet(SGNJ_B));
            body.push(WasmInst::I64Const(-1));
            body.push(WasmInst::I64Xor);
            body.push(WasmInst::I64Const(sign_mask));
            body.push(WasmInst::I64And);
        }
        FSgnjOp::Xor => {
            body.push(WasmInst::LocalGet(SGNJ_A));
            body.push(WasmInst::LocalGet(SGNJ_B));
            body.push(WasmInst::I64Xor);
            body.push(WasmInst::I64Const(sign_mask));
            body.push(WasmInst::I64And);
        }
    }
    body.push(WasmInst::I64Or);
    match width {
        FWidth::S => {
            body.push(WasmInst::I32WrapI64);
            body.push(WasmInst::F32ReinterpretI32);
            body.push(WasmInst::F32Store { offset: float_reg_offset(rd.index()) });
        }
        FWidth::D => {
            body.push(WasmInst::F64ReinterpretI64);
            body.push(WasmInst::F64Store { offset: float_reg_offset(rd.index()) });
        }
    }
}

pub fn translate_fcvt(body: &mut Vec<WasmInst>, kind: FCvtKind, rd: Reg, rs1: Reg) {
    match kind {
        FCvtKind::FloatToInt { width, signed, int64 } => {
            match width {
                FWidth::S => push_float_reg_s(body, rs1),
                FWidth::D => push_float_reg_d(body, rs1),
            }
            body.push(match (width, signed, int64) {
                (FWidth::S, true, false) => WasmInst::I32TruncSatF32S,
                (FWidth::S, false, false) => WasmInst::I32TruncSatF32U,
                (FWidth::D, true, false) => WasmInst::I32TruncSatF64S,
                (FWidth::D, false, false) => WasmInst::I32TruncSatF64U,
                (FWidth::S, true, true) => WasmInst::I64TruncSatF32S,
                (FWidth::S, false, true) => WasmInst::I64TruncSatF32U,
                (FWidth::D, true, true) => WasmInst::I64TruncSatF64S,
                (FWidth::D, false, true) => WasmInst::I64TruncSatF64U,
            });
            if !int64 {
                // Word-form result: always sign-extended into the 64-bit
                // register, even for the unsigned `WU` form (§4.4).
                body.push(WasmInst::I64ExtendI32S);
            }
            pop_into_int_reg(body, rd);
        }
        FCvtKind::IntToFloat { width, signed, int64 } => {
            body.push(WasmInst::LocalGet(0));
            push_int_reg(body, rs1);
            if !int64 {
                body.push(WasmInst::I32WrapI64);
            }
            body.push(match (width, signed, int64) {
                (FWidth::S, true, false) => WasmInst::F32ConvertI32S,
                (FWidth::S, false, false) => WasmInst::F32ConvertI32U,
                (FWidth::D, true, false) => WasmInst::F64ConvertI32S,
                (FWidth::D, false, false) => WasmInst::F64ConvertI32U,
                (FWidth::S, true, true) => WasmInst::F32ConvertI64S,
                (FWidth::S, false, true) => WasmInst::F32ConvertI64U,
                (FWidth::D, true, true) => WasmInst::F64ConvertI64S,
                (FWidth::D, false, true) => WasmInst::F64ConvertI64U,
            });
            match width {
                FWidth::S => body.push(WasmInst::F32Store { offset: float_reg_offset(rd.index()) }),
                FWidth::D => body.push(WasmInst::F64Store { offset: float_reg_offset(rd.index()) }),
            }
        }
        FCvtKind::FloatToFloat { from, to } => {
            body.push(WasmInst::LocalGet(0));
            match from {
                FWidth::S => push_float_reg_s(body, rs1),
                FWidth::D => push_float_reg_d(body, rs1),
            }
            match (from, to) {
                (FWidth::S, FWidth::D) => body.push(WasmInst::F64PromoteF32),
                (FWidth::D, FWidth::S) => body.push(WasmInst::F32DemoteF64),
                _ => {}
            }
            match to {
                FWidth::S => body.push(WasmInst::F32Store { offset: float_reg_offset(rd.index()) }),
                FWidth::D => body.push(WasmInst::F64Store { offset: float_reg_offset(rd.index()) }),
            }
        }
    }
}

/// `FMV.X.W`/`FMV.X.D`: raw bit move from a float register into an integer
/// one, sign-extending the 32-bit pattern for the `.W` form (§4.4).
pub fn translate_fmv_x_fmt(body: &mut Vec<WasmInst>, width: FWidth, rd: Reg, rs1: Reg) {
    match width {
        FWidth::S => {
            push_float_reg_s(body, rs1);
            body.push(WasmInst::I32ReinterpretF32);
            body.push(WasmInst::I64ExtendI32S);
        }
        FWidth::D => {
            push_float_reg_d(body, rs1);
            body.push(WasmInst::I64ReinterpretF64);
        }
    }
    pop_into_int_reg(body, rd);
}

/// `FMV.W.X`/`FMV.D.X`: raw bit move from an integer register into a float one.
pub fn translate_fmv_fmt_x(body: &mut Vec<WasmInst>, width: FWidth, rd: Reg, rs1: Reg) {
    body.push(WasmInst::LocalGet(0));
    push_int_reg(body, rs1);
    match width {
        FWidth::S => {
            body.push(WasmInst::I32WrapI64);
            body.push(WasmInst::F32ReinterpretI32);
            body.push(WasmInst::F32Store { offset: float_reg_offset(rd.index()) });
        }
        FWidth::D => {
            body.push(WasmInst::F64ReinterpretI64);
            body.push(WasmInst::F64Store { offset: float_reg_offset(rd.index()) });
        }
    }
}

const FCLASS_BITS: u32 = SCRATCH_I64_BASE;
const FCLASS_SIGN: u32 = SCRATCH_I64_BASE + 1;
const FCLASS_EXP: u32 = SCRATCH_I64_BASE + 2;
const FCLASS_MANT: u32 = SCRATCH_I64_BASE + 3;
const FCLASS_ACC: u32 = SCRATCH_I64_BASE + 4;

fn push_bool_eq(body: &mut Vec<WasmInst>, local: u32, value: i64) {
    body.push(WasmInst::LocalGet(local));
    body.push(WasmInst::I64Const(value));
    body.push(WasmInst::I64Eq);
}

/// Pushes an `i64` 0/1 term for classification bit `pos` and folds it into
/// the running accumulator.
fn fold_term(body: &mut Vec<WasmInst>, pos: i64, build: impl FnOnce(&mut Vec<WasmInst>)) {
    build(body);
    body.push(WasmInst::I64ExtendI32U);
    body.push(WasmInst::I64Const(pos));
    body.push(WasmInst::I64Shl);
    body.push(WasmInst::LocalGet(FCLASS_ACC));
    body.push(WasmInst::I64Or);
    body.push(WasmInst::LocalSet(FCLASS_ACC));
}

/// `FCLASS.S`/`FCLASS.D`: classifies the bit pattern into the 10-bit RISC-V
/// classification mask, built as a chain of boolean terms over sign,
/// exponent and mantissa fields rather than branching (§4.4).
pub fn translate_fclass(body: &mut Vec<WasmInst>, width: FWidth, rd: Reg, rs1: Reg) {
    match width {
        FWidth::S => {
            push_float_reg_s(body, rs1);
            body.push(WasmInst::I32ReinterpretF32);
            body.push(WasmInst::I64ExtendI32U);
        }
        FWidth::D => {
            push_float_reg_d(body, rs1);
            body.push(WasmInst::I64ReinterpretF64);
        }
    }
    body.push(WasmInst::LocalSet(FCLASS_BITS));

    let (sign_shift, exp_shift, exp_mask, mant_mask, mant_top_bit): (i64, i64, i64, i64, i64) = match width {
        FWidth::S => (31, 23, 0xFF, 0x007f_ffff, 22),
        FWidth::D => (63, 52, 0x7FF, 0x000f_ffff_ffff_ffff, 51),
    };

    body.push(WasmInst::LocalGet(FCLASS_BITS));
    body.push(WasmInst::I64Const(sign_shift));
    body.push(WasmInst::I64ShrU);
    body.push(WasmInst::I64Const(1));
    body.push(WasmInst::I64And);
    body.push(WasmInst::LocalSet(FCLASS_SIGN));

    body.push(WasmInst::LocalGet(FCLASS_BITS));
    body.push(WasmInst::I64Const(exp_shift));
    body.push(WasmInst::I64ShrU);
    body.push(WasmInst::I64Const(exp_mask));
    body.push(WasmInst::I64And);
    body.push(WasmInst::LocalSet(FCLASS_EXP));

    body.push(WasmInst::LocalGet(FCLASS_BITS));
    body.push(WasmInst::I64Const(mant_mask));
    body.push(WasmInst::I64And);
    body.push(WasmInst::LocalSet(FCLASS_MANT));

    body.push(WasmInst::I64Const(0));
    body.push(WasmInst::LocalSet(FCLASS_ACC));

    // bit 0: -inf
    fold_term(body, 0, |b| {
        push_bool_eq(b, FCLASS_SIGN, 1);
        push_bool_eq(b, FCLASS_EXP, exp_mask);
        b.push(WasmInst::I32And);
        push_bool_eq(b, FCLASS_MANT, 0);
        b.push(WasmInst::I32And);
    });
    // bit 1: negative normal
    fold_term(body, 1, |b| {
        push_bool_eq(b, FCLASS_SIGN, 1);
        b.push(WasmInst::LocalGet(FCLASS_EXP));
        b.push(WasmInst::I64Const(0));
        b.push(WasmInst::I64Ne);
        b.push(WasmInst::I32And);
        b.push(WasmInst::LocalGet(FCLASS_EXP));
        b.push(WasmInst::I64Const(exp_mask));
        b.push(WasmInst::I64Ne);
        b.push(WasmInst::I32And);
    });
    // bit 2: negative subnormal
    fold_term(body, 2, |b| {
        push_bool_eq(b, FCLASS_SIGN, 1);
        push_bool_eq(b, FCLASS_EXP, 0);
        b.push(WasmInst::I32And);
        b.push(WasmInst::LocalGet(FCLASS_MANT));
        b.push(WasmInst::I64Const(0));
        b.push(WasmInst::I64Ne);
        b.push(WasmInst::I32And);
    });
    // bit 3: -0
    fold_term(body, 3, |b| {
        push_bool_eq(b, FCLASS_SIGN, 1);
        push_bool_eq(b, FCLASS_EXP, 0);
        b.push(WasmInst::I32And);
        push_bool_eq(b, FCLASS_MANT, 0);
        b.push(WasmInst::I32And);
    });
    // bit 4: +0
    fold_term(body, 4, |b| {
        push_bool_eq(b, FCLASS_SIGN, 0);
        push_bool_eq(b, FCLASS_EXP, 0);
        b.push(WasmInst::I32And);
        push_bool_eq(b, FCLASS_MANT, 0);
        b.push(WasmInst::I32And);
    });
    // bit 5: positive subnormal
    fold_term(body, 5, |b| {
        push_bool_eq(b, FCLASS_SIGN, 0);
        push_bool_eq(b, FCLASS_EXP, 0);
        b.push(WasmInst::I32And);
        b.push(WasmInst::LocalGet(FCLASS_MANT));
        b.push(WasmInst::I64Const(0));
        b.push(WasmInst::I64Ne);
        b.push(WasmInst::I32And);
    });
    // bit 6: positive normal
    fold_term(body, 6, |b| {
        push_bool_eq(b, FCLASS_SIGN, 0);
        b.push(WasmInst::LocalGet(FCLASS_EXP));
        b.push(WasmInst::I64Const(0));
        b.push(WasmInst::I64Ne);
        b.push(WasmInst::I32And);
        b.push(WasmInst::LocalGet(FCLASS_EXP));
        b.push(WasmInst::I64Const(exp_mask));
        b.push(WasmInst::I64Ne);
        b.push(WasmInst::I32And);
    });
    // bit 7: +inf
    fold_term(body, 7, |b| {
        push_bool_eq(b, FCLASS_SIGN, 0);
        push_bool_eq(b, FCLASS_EXP, exp_mask);
        b.push(WasmInst::I32And);
        push_bool_eq(b, FCLASS_MANT, 0);
        b.push(WasmInst::I32And);
    });
    // bit 8: signaling NaN (exponent all-ones, mantissa nonzero, top mantissa bit clear)
    fold_term(body, 8, |b| {
        push_bool_eq(b, FCLASS_EXP, exp_mask);
        b.push(WasmInst::LocalGet(FCLASS_MANT));
        b.push(WasmInst::I64Const(0));
        b.push(WasmInst::I64Ne);
        b.push(WasmInst::I32And);
        b.push(WasmInst::LocalGet(FCLASS_MANT));
        b.push(WasmInst::I64Const(mant_top_bit));
        b.push(WasmInst::I64ShrU);
        b.push(WasmInst::I64Const(1));
        b.push(WasmInst::I64And);
        b.push(WasmInst::I64Const(0));
        b.push(WasmInst::I64Eq);
        b.push(WasmInst::I32And);
    });
    // bit 9: quiet NaN (exponent all-ones, top mantissa bit set)
    fold_term(body, 9, |b| {
        push_bool_eq(b, FCLASS_EXP, exp_mask);
        b.push(WasmInst::LocalGet(FCLASS_MANT));
        b.push(WasmInst::I64Const(mant_top_bit));
        b.push(WasmInst::I64ShrU);
        b.push(WasmInst::I64Const(1));
        b.push(WasmInst::I64And);
        b.push(WasmInst::I64Const(0));
        b.push(WasmInst::I64Ne);
        b.push(WasmInst::I32And);
    });

    body.push(WasmInst::LocalGet(FCLASS_ACC));
    pop_into_int_reg(body, rd);
}
