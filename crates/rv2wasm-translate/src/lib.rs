//! Translates a [`rv2wasm_cfg::Block`] into a [`TranslatedBlock`] body: a
//! straight-line sequence of [`WasmInst`]s honoring the machine-state
//! contract (§3) and ending in exactly one terminator return (§4.4).
//!
//! Every block function has the signature `(state_ptr: i32) -> i32`. Guest
//! integer and float registers live in linear memory at fixed offsets
//! ([`rv2wasm_types::int_reg_offset`]/[`rv2wasm_types::float_reg_offset`]);
//! a small fixed set of scratch locals (§9) holds values read more than
//! once within a single instruction's translation (division operands, an
//! AMO's old value, a classify's bit pattern). No value is ever cached
//! across instruction boundaries.

mod atomic;
mod float;
mod muldiv;

pub mod ir;

pub use ir::{TranslatedBlock, WasmInst};

use rv2wasm_cfg::{Block, Terminator};
use rv2wasm_decode::{AluOp, Inst, LoadWidth, Op, StoreWidth};
use rv2wasm_types::{encode_syscall, int_reg_offset, Reg, HALT_SENTINEL};

use ir::SCRATCH_ADDR;

/// Translates every non-terminator operation in `block`, then the
/// terminator itself, into a flat `Vec<WasmInst>` ready for the emitter.
pub fn translate_block(block: &Block) -> TranslatedBlock {
    let mut body = Vec::new();
    for inst in &block.insts {
        if inst.op.is_terminator() {
            translate_terminator(&mut body, inst, &block.terminator);
        } else {
            translate_op(&mut body, inst);
        }
    }
    if !matches!(body.last(), Some(WasmInst::Return)) {
        match block.terminator {
            // The CFG builder splits a block at a leader boundary even when
            // no real instruction terminates it there (two blocks sharing a
            // fallthrough edge). There is no instruction to drive
            // `translate_terminator` in that case, so the block falls
            // through to the next PC directly.
            Terminator::Jmp { target } => {
                body.push(WasmInst::I32Const(target as u32 as i32));
                body.push(WasmInst::Return);
            }
            // Any other terminator always pairs with a real instruction
            // that already pushed a `Return` above; reaching here means the
            // decode never produced one (a CFG/decoder mismatch), which
            // always traps rather than falling off the end of the function
            // (§4.4).
            _ => {
                body.push(WasmInst::I32Const(HALT_SENTINEL));
                body.push(WasmInst::Return);
            }
        }
    }
    TranslatedBlock { addr: block.start, body }
}

/// Pushes the `i64` value of an integer register onto the stack. `x0`
/// always reads as the constant zero.
fn push_int_reg(body: &mut Vec<WasmInst>, r: Reg) {
    if r.is_zero() {
        body.push(WasmInst::I64Const(0));
    } else {
        body.push(WasmInst::LocalGet(0));
        body.push(WasmInst::I64Load { offset: int_reg_offset(r.index()) });
    }
}

/// Pops the top-of-stack `i64` value and stores it to an integer register,
/// suppressing writes to `x0` (§3 invariant 2) by evaluating the value for
/// its side effects (there are none for pure ALU ops) and dropping it.
fn pop_into_int_reg(body: &mut Vec<WasmInst>, r: Reg) {
    if r.is_zero() {
        body.push(WasmInst::Drop);
        return;
    }
    // The value is already on the stack; wrap it with a store by first
    // moving the address beneath it via a scratch local round-trip, since
    // Wasm's store expects [address, value] on the stack in that order.
    body.push(WasmInst::LocalSet(ir::SCRATCH_I64_BASE));
    body.push(WasmInst::LocalGet(0));
    body.push(WasmInst::LocalGet(ir::SCRATCH_I64_BASE));
    body.push(WasmInst::I64Store { offset: int_reg_offset(r.index()) });
}

fn push_float_reg_s(body: &mut Vec<WasmInst>, r: Reg) {
    body.push(WasmInst::LocalGet(0));
    body.push(WasmInst::F32Load { offset: rv2wasm_types::float_reg_offset(r.index()) });
}

fn push_float_reg_d(body: &mut Vec<WasmInst>, r: Reg) {
    body.push(WasmInst::LocalGet(0));
    body.push(WasmInst::F64Load { offset: rv2wasm_types::float_reg_offset(r.index()) });
}

fn translate_op(body: &mut Vec<WasmInst>, inst: &Inst) {
    match inst.op {
        Op::Lui { rd, imm } => {
            if !rd.is_zero() {
                body.push(WasmInst::LocalGet(0));
                body.push(WasmInst::I64Const(imm));
                body.push(WasmInst::I64Store { offset: int_reg_offset(rd.index()) });
            }
        }
        Op::Auipc { rd, imm } => {
            if !rd.is_zero() {
                let value = (inst.addr as i64).wrapping_add(imm);
                body.push(WasmInst::LocalGet(0));
                body.push(WasmInst::I64Const(value));
                body.push(WasmInst::I64Store { offset: int_reg_offset(rd.index()) });
            }
        }
        Op::AluImm { op, rd, rs1, imm } => translate_alu(body, op, rd, rs1, |b| b.push(WasmInst::I64Const(imm)), false),
        Op::Alu { op, rd, rs1, rs2 } => translate_alu(body, op, rd, rs1, |b| push_int_reg(b, rs2), false),
        Op::AluImmW { op, rd, rs1, imm } => translate_alu(body, op, rd, rs1, |b| b.push(WasmInst::I64Const(imm)), true),
        Op::AluW { op, rd, rs1, rs2 } => translate_alu(body, op, rd, rs1, |b| push_int_reg(b, rs2), true),

        Op::Load { width, rd, rs1, imm } => translate_load(body, width, rd, rs1, imm),
        Op::Store { width, rs1, rs2, imm } => translate_store(body, width, rs1, rs2, imm),

        Op::Fence | Op::FenceI => {
            // No-op in a single-agent guest model (§6.3).
        }

        Op::Mul { op, rd, rs1, rs2 } => muldiv::translate_mul(body, op, rd, rs1, rs2),
        Op::MulW { op, rd, rs1, rs2 } => muldiv::translate_mulw(body, op, rd, rs1, rs2),

        Op::Lr { width, rd, rs1, .. } => atomic::translate_lr(body, width, rd, rs1),
        Op::Sc { width, rd, rs1, rs2, .. } => atomic::translate_sc(body, width, rd, rs1, rs2),
        Op::Amo { op, width, rd, rs1, rs2, .. } => atomic::translate_amo(body, op, width, rd, rs1, rs2),

        Op::FLoad { width, rd, rs1, imm } => float::translate_fload(body, width, rd, rs1, imm),
        Op::FStore { width, rs1, rs2, imm } => float::translate_fstore(body, width, rs1, rs2, imm),
        Op::FAlu { op, width, rd, rs1, rs2, .. } => float::translate_falu(body, op, width, rd, rs1, rs2),
        Op::FSqrt { width, rd, rs1, .. } => float::translate_fsqrt(body, width, rd, rs1),
        Op::FMinMax { op, width, rd, rs1, rs2 } => float::translate_fminmax(body, op, width, rd, rs1, rs2),
        Op::FCmp { op, width, rd, rs1, rs2 } => float::translate_fcmp(body, op, width, rd, rs1, rs2),
        Op::FMadd { op, width, rd, rs1, rs2, rs3, .. } => float::translate_fmadd(body, op, width, rd, rs1, rs2, rs3),
        Op::FSgnj { op, width, rd, rs1, rs2 } => float::translate_fsgnj(body, op, width, rd, rs1, rs2),
        Op::FCvt { kind, rd, rs1, .. } => float::translate_fcvt(body, kind, rd, rs1),
        Op::FMvXFmt { width, rd, rs1 } => float::translate_fmv_x_fmt(body, width, rd, rs1),
        Op::FMvFmtX { width, rd, rs1 } => float::translate_fmv_fmt_x(body, width, rd, rs1),
        Op::FClass { width, rd, rs1 } => float::translate_fclass(body, width, rd, rs1),

        // These are handled by `translate_terminator`; `translate_op` is
        // only ever called on non-terminator instructions.
        Op::Jal { .. }
        | Op::Jalr { .. }
        | Op::Branch { .. }
        | Op::Ecall
        | Op::Ebreak
        | Op::Illegal { .. } => unreachable!("terminator op reached translate_op"),
    }
}

fn translate_alu(
    body: &mut Vec<WasmInst>,
    op: AluOp,
    rd: Reg,
    rs1: Reg,
    push_rhs: impl FnOnce(&mut Vec<WasmInst>),
    word: bool,
) {
    if rd.is_zero() {
        return;
    }
    if word {
        push_int_reg(body, rs1);
        body.push(WasmInst::I32WrapI64);
        push_rhs(body);
        body.push(WasmInst::I32WrapI64);
        match op {
            AluOp::Add => body.push(WasmInst::I32Add),
            AluOp::Sub => body.push(WasmInst::I32Sub),
            AluOp::Sll => body.push(WasmInst::I32Shl),
            AluOp::Srl => body.push(WasmInst::I32ShrU),
            AluOp::Sra => body.push(WasmInst::I32ShrS),
            AluOp::Slt | AluOp::Sltu | AluOp::Xor | AluOp::Or | AluOp::And => {
                unreachable!("decoder never emits a word-form compare/logic op")
            }
        }
        body.push(WasmInst::I64ExtendI32S);
        pop_into_int_reg(body, rd);
        return;
    }

    push_int_reg(body, rs1);
    push_rhs(body);
    match op {
        AluOp::Add => body.push(WasmInst::I64Add),
        AluOp::Sub => body.push(WasmInst::I64Sub),
        AluOp::Sll => body.push(WasmInst::I64Shl),
        AluOp::Srl => body.push(WasmInst::I64ShrU),
        AluOp::Sra => body.push(WasmInst::I64ShrS),
        AluOp::Xor => body.push(WasmInst::I64Xor),
        AluOp::Or => body.push(WasmInst::I64Or),
        AluOp::And => body.push(WasmInst::I64And),
        AluOp::Slt => {
            body.push(WasmInst::I64LtS);
            body.push(WasmInst::I64ExtendI32U);
        }
        AluOp::Sltu => {
            body.push(WasmInst::I64LtU);
            body.push(WasmInst::I64ExtendI32U);
        }
    }
    pop_into_int_reg(body, rd);
}

/// Computes `reg[rs1] + sign_extend(imm)` and leaves it as a wrapped `i32`
/// guest address, caching it in the address scratch local for instructions
/// that need the address more than once (stores only need it once, but the
/// local round-trip keeps the calling convention uniform).
fn push_effective_addr(body: &mut Vec<WasmInst>, rs1: Reg, imm: i64) {
    push_int_reg(body, rs1);
    body.push(WasmInst::I64Const(imm));
    body.push(WasmInst::I64Add);
    body.push(WasmInst::I32WrapI64);
    body.push(WasmInst::LocalTee(SCRATCH_ADDR));
}

fn translate_load(body: &mut Vec<WasmInst>, width: LoadWidth, rd: Reg, rs1: Reg, imm: i64) {
    push_effective_addr(body, rs1, imm);
    match width {
        LoadWidth::B => body.push(WasmInst::I64Load8S { offset: 0 }),
        LoadWidth::Bu => body.push(WasmInst::I64Load8U { offset: 0 }),
        LoadWidth::H => body.push(WasmInst::I64Load16S { offset: 0 }),
        LoadWidth::Hu => body.push(WasmInst::I64Load16U { offset: 0 }),
        LoadWidth::W => body.push(WasmInst::I64Load32S { offset: 0 }),
        LoadWidth::Wu => body.push(WasmInst::I64Load32U { offset: 0 }),
        LoadWidth::D => body.push(WasmInst::I64Load { offset: 0 }),
    }
    pop_into_int_reg(body, rd);
}

fn translate_store(body: &mut Vec<WasmInst>, width: StoreWidth, rs1: Reg, rs2: Reg, imm: i64) {
    push_effective_addr(body, rs1, imm);
    push_int_reg(body, rs2);
    match width {
        StoreWidth::B => body.push(WasmInst::I64Store8 { offset: 0 }),
        StoreWidth::H => body.push(WasmInst::I64Store16 { offset: 0 }),
        StoreWidth::W => body.push(WasmInst::I64Store32 { offset: 0 }),
        StoreWidth::D => body.push(WasmInst::I64Store { offset: 0 }),
    }
}

fn translate_terminator(body: &mut Vec<WasmInst>, inst: &Inst, terminator: &Terminator) {
    match (&inst.op, terminator) {
        (Op::Branch { op, rs1, rs2, .. }, Terminator::Cond { taken, fallthrough }) => {
            // `select` needs [val_if_true, val_if_false, cond] with cond on
            // top, so push the two targets first and compute the condition
            // last.
            body.push(WasmInst::I32Const(*taken as u32 as i32));
            body.push(WasmInst::I32Const(*fallthrough as u32 as i32));
            push_int_reg(body, *rs1);
            push_int_reg(body, *rs2);
            use rv2wasm_decode::BranchOp::*;
            match op {
                Eq => body.push(WasmInst::I64Eq),
                Ne => body.push(WasmInst::I64Ne),
                Lt => body.push(WasmInst::I64LtS),
                Ge => body.push(WasmInst::I64GeS),
                Ltu => body.push(WasmInst::I64LtU),
                Geu => body.push(WasmInst::I64GeU),
            }
            body.push(WasmInst::Select);
            body.push(WasmInst::Return);
        }
        (Op::Jal { rd, .. }, Terminator::Jmp { target }) => {
            write_link(body, *rd, inst.addr + inst.len as u64);
            body.push(WasmInst::I32Const(*target as u32 as i32));
            body.push(WasmInst::Return);
        }
        (Op::Jal { rd, .. }, Terminator::Call { target }) => {
            write_link(body, *rd, inst.addr + inst.len as u64);
            body.push(WasmInst::I32Const(*target as u32 as i32));
            body.push(WasmInst::Return);
        }
        (Op::Jalr { rd, rs1, imm }, Terminator::IJmp) => {
            push_int_reg(body, *rs1);
            body.push(WasmInst::I64Const(*imm));
            body.push(WasmInst::I64Add);
            body.push(WasmInst::I64Const(!1i64));
            body.push(WasmInst::I64And);
            body.push(WasmInst::I32WrapI64);
            body.push(WasmInst::LocalSet(SCRATCH_ADDR));
            write_link(body, *rd, inst.addr + inst.len as u64);
            body.push(WasmInst::LocalGet(SCRATCH_ADDR));
            body.push(WasmInst::Return);
        }
        (Op::Ecall, Terminator::Syscall { fallthrough }) => {
            let _ = fallthrough;
            body.push(WasmInst::I32Const(encode_syscall(inst.addr as u32)));
            body.push(WasmInst::Return);
        }
        (Op::Ebreak, Terminator::Halt) | (Op::Illegal { .. }, Terminator::Halt) => {
            body.push(WasmInst::I32Const(HALT_SENTINEL));
            body.push(WasmInst::Return);
        }
        _ => {
            body.push(WasmInst::I32Const(HALT_SENTINEL));
            body.push(WasmInst::Return);
        }
    }
}

fn write_link(body: &mut Vec<WasmInst>, rd: Reg, return_addr: u64) {
    if rd.is_zero() {
        return;
    }
    body.push(WasmInst::LocalGet(0));
    body.push(WasmInst::I64Const(return_addr as i64));
    body.push(WasmInst::I64Store { offset: int_reg_offset(rd.index()) });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_with(insts: Vec<Inst>, terminator: Terminator) -> Block {
        Block {
            index: rv2wasm_types::BlockIndex::new(0),
            start: insts.first().map(|i| i.addr).unwrap_or(0),
            end: insts.last().map(|i| i.addr + i.len as u64).unwrap_or(0),
            insts,
            terminator,
        }
    }

    #[test]
    fn lui_writes_constant_then_the_block_still_ends_in_return() {
        let insts = vec![Inst { addr: 0x1000, len: 4, op: Op::Lui { rd: Reg::new(5), imm: 0x1000 } }];
        let block = block_with(insts, Terminator::Halt);
        let translated = translate_block(&block);
        assert!(matches!(translated.body.last(), Some(WasmInst::Return)));
        assert!(translated.body.contains(&WasmInst::I64Const(0x1000)));
    }

    #[test]
    fn write_to_x0_is_suppressed() {
        let insts = vec![Inst {
            addr: 0x1000,
            len: 4,
            op: Op::AluImm { op: AluOp::Add, rd: Reg::ZERO, rs1: Reg::ZERO, imm: 42 },
        }];
        let block = block_with(insts, Terminator::Halt);
        let translated = translate_block(&block);
        assert!(!translated.body.iter().any(|i| matches!(i, WasmInst::I64Store { .. })));
    }

    #[test]
    fn synthetic_jmp_terminator_returns_target_pc_not_a_halt() {
        // A block that falls through into another block's leader with no
        // instruction of its own to drive the control transfer.
        let insts = vec![Inst {
            addr: 0x1000,
            len: 4,
            op: Op::AluImm { op: AluOp::Add, rd: Reg::new(10), rs1: Reg::ZERO, imm: 1 },
        }];
        let block = block_with(insts, Terminator::Jmp { target: 0x1008 });
        let translated = translate_block(&block);
        assert_eq!(translated.body.last(), Some(&WasmInst::Return));
        assert_eq!(
            translated.body[translated.body.len() - 2],
            WasmInst::I32Const(0x1008)
        );
    }

    #[test]
    fn register_writes_never_target_x0_and_always_use_correct_offset() {
        for rd in 0u8..32 {
            let insts = vec![Inst {
                addr: 0x1000,
                len: 4,
                op: Op::AluImm { op: AluOp::Add, rd: Reg::new(rd), rs1: Reg::ZERO, imm: 7 },
            }];
            let block = block_with(insts, Terminator::Halt);
            let translated = translate_block(&block);
            let stores: Vec<_> = translated
                .body
                .iter()
                .filter_map(|i| match i {
                    WasmInst::I64Store { offset } => Some(*offset),
                    _ => None,
                })
                .collect();
            if rd == 0 {
                assert!(stores.is_empty(), "x0 destination must never be stored to");
            } else {
                assert_eq!(stores, vec![int_reg_offset(rd)]);
            }
        }
    }

    #[test]
    fn word_form_ops_always_sign_extend_through_i64extendi32s() {
        for op in [AluOp::Add, AluOp::Sub, AluOp::Sll, AluOp::Srl, AluOp::Sra] {
            let insts = vec![Inst {
                addr: 0x1000,
                len: 4,
                op: Op::AluW { op, rd: Reg::new(6), rs1: Reg::new(5), rs2: Reg::new(7) },
            }];
            let block = block_with(insts, Terminator::Halt);
            let translated = translate_block(&block);
            let extend_pos = translated
                .body
                .iter()
                .position(|i| matches!(i, WasmInst::I64ExtendI32S))
                .unwrap_or_else(|| panic!("{op:?} word-form must sign-extend through I64ExtendI32S"));
            let store_pos = translated
                .body
                .iter()
                .position(|i| matches!(i, WasmInst::I64Store { .. }))
                .expect("word-form op must store its result");
            assert!(extend_pos < store_pos, "sign extension must happen before the store");
        }
    }

    #[test]
    fn conditional_branch_uses_select_then_return() {
        let insts = vec![Inst {
            addr: 0x2000,
            len: 4,
            op: Op::Branch { op: rv2wasm_decode::BranchOp::Lt, rs1: Reg::new(10), rs2: Reg::new(11), imm: 8 },
        }];
        let block = block_with(insts, Terminator::Cond { taken: 0x2008, fallthrough: 0x2004 });
        let translated = translate_block(&block);
        assert_eq!(translated.body.last(), Some(&WasmInst::Return));
        assert!(translated.body.contains(&WasmInst::Select));
    }
}
