//! A structured, stack-machine Wasm instruction IR. One [`WasmInst`] maps to
//! exactly one `wasm_encoder::Instruction` at emission time; the translator
//! never needs `wasm-encoder` types directly, so block codegen stays
//! decoupled from the encoder's borrow-heavy API (grounded in the
//! `WasmInst`/`emit_instruction` split used by the reference AOT emitter in
//! the example pack).

#[derive(Clone, Debug, PartialEq)]
pub enum WasmInst {
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),

    I32Const(i32),
    I64Const(i64),
    F32Const(f32),
    F64Const(f64),

    I32Load { offset: u32 },
    I64Load { offset: u32 },
    I64Load8S { offset: u32 },
    I64Load8U { offset: u32 },
    I64Load16S { offset: u32 },
    I64Load16U { offset: u32 },
    I64Load32S { offset: u32 },
    I64Load32U { offset: u32 },
    F32Load { offset: u32 },
    F64Load { offset: u32 },

    I32Store { offset: u32 },
    I64Store { offset: u32 },
    I64Store8 { offset: u32 },
    I64Store16 { offset: u32 },
    I64Store32 { offset: u32 },
    F32Store { offset: u32 },
    F64Store { offset: u32 },

    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GeS,
    I32GeU,

    I64Add,
    I64Sub,
    I64Mul,
    I64DivS,
    I64DivU,
    I64RemS,
    I64RemU,
    I64And,
    I64Or,
    I64Xor,
    I64Shl,
    I64ShrS,
    I64ShrU,
    I64Eq,
    I64Ne,
    I64LtS,
    I64LtU,
    I64GeS,
    I64GeU,

    I32WrapI64,
    I64ExtendI32S,
    I64ExtendI32U,

    I32TruncSatF32S,
    I32TruncSatF32U,
    I32TruncSatF64S,
    I32TruncSatF64U,
    I64TruncSatF32S,
    I64TruncSatF32U,
    I64TruncSatF64S,
    I64TruncSatF64U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F32DemoteF64,
    F64PromoteF32,

    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,

    F32Add,
    F32Sub,
    F32Mul,
    F32Div,
    F32Sqrt,
    F32Min,
    F32Max,
    F32Neg,
    F32Eq,
    F32Lt,
    F32Le,

    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Sqrt,
    F64Min,
    F64Max,
    F64Neg,
    F64Eq,
    F64Lt,
    F64Le,

    Select,
    Drop,
    Return,
    Unreachable,

    /// Opens an `if` whose taken/not-taken arms both leave one value of the
    /// given result type; used only where a Wasm instruction under one arm
    /// would trap given the other arm's inputs (RV64M's division-by-zero
    /// and signed-overflow special cases — §4.4), since `select` evaluates
    /// both arms unconditionally and traps before it gets to choose.
    If { i64_result: bool },
    Else,
    /// Closes an `If`/`Else`. Never closes the function body itself; the
    /// emitter appends that terminating `end` on its own.
    End,
}

/// One translated basic block: its start address (the dispatch key), the
/// straight-line body ending in exactly one [`WasmInst::Return`], and the
/// number of `i64` scratch locals the body references (§4.4, §9).
#[derive(Clone, Debug)]
pub struct TranslatedBlock {
    pub addr: u64,
    pub body: Vec<WasmInst>,
}

/// Fixed scratch-local layout shared by every translated block (§9's
/// resolved Open Question: a small fixed set of locals, never whole
/// register promotion). Local 0 is always the `state_ptr` parameter.
pub const SCRATCH_I64_COUNT: u32 = 6;
pub const SCRATCH_I32_COUNT: u32 = 1;
/// First scratch-local index after the `state_ptr` parameter.
pub const SCRATCH_I64_BASE: u32 = 1;
/// Index of the single i32 scratch local, used for guest-memory effective
/// addresses (loads, stores, AMO, indirect-jump targets).
pub const SCRATCH_ADDR: u32 = SCRATCH_I64_BASE + SCRATCH_I64_COUNT;
