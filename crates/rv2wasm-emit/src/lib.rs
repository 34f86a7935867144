//! Assembles a slice of [`TranslatedBlock`]s into one validated WebAssembly
//! module: linear memory (machine-state region + identity-mapped guest RAM),
//! one function per block, and a dispatcher loop that drives them by PC
//! (§4.5).
//!
//! The dispatcher's PC→function lookup is a flat `i32` array in linear
//! memory, keyed by half-word offset from the lowest block address, read
//! through a `br_table` over nested blocks — the same O(1) shape as the
//! reference AOT emitter this crate is grounded on (`other_examples`'
//! friscy-rv2wasm `wasm_builder.rs`), widened from that reference's
//! byte-sized (255-entry-capped) table to `i32` entries so the function
//! count isn't bounded by a byte (see DESIGN.md).

use wasm_encoder::{
    BlockType, CodeSection, ConstExpr, DataSection, EntityType, ExportKind, ExportSection,
    Function, FunctionSection, GlobalSection, GlobalType, ImportSection, Instruction, MemArg,
    MemorySection, MemoryType, Module, TypeSection, ValType,
};

use rv2wasm_elf::ElfImage;
use rv2wasm_translate::ir::{SCRATCH_I32_COUNT, SCRATCH_I64_COUNT};
use rv2wasm_translate::{TranslatedBlock, WasmInst};
use rv2wasm_types::{TranslateOptions, HALT_SENTINEL, STATE_SIZE, SYSCALL_BIT};

const WASM_PAGE_SIZE: u64 = 65_536;
/// Base address of the machine-state region within linear memory. Guest RAM
/// is identity-mapped at its ELF virtual addresses, which for every
/// statically-linked RV64 binary this translator targets sit well above
/// [`STATE_SIZE`] (§3).
const STATE_BASE: u32 = 0;

/// Failure modes raised while assembling or validating the emitted module
/// (§7). An internal code-generation bug must surface here, before any
/// bytes reach the driver's output file.
#[derive(thiserror::Error, Debug)]
pub enum EmitError {
    #[error("translated module has no basic blocks to emit")]
    NoBlocks,
    #[error("generated module failed validation: {0}")]
    Validation(#[from] wasmparser::BinaryReaderError),
}

/// Assembles `blocks` (in the order the CFG builder enumerated them) plus
/// `image`'s loadable segments into one Wasm module, validating it with
/// `wasmparser` before returning its bytes.
pub fn emit(image: &ElfImage, blocks: &[TranslatedBlock], options: &TranslateOptions) -> Result<Vec<u8>, EmitError> {
    if blocks.is_empty() {
        return Err(EmitError::NoBlocks);
    }

    let mut dispatch = DispatchTable::build(blocks);
    let guest_max = image.all_segments().iter().map(|s| s.end()).max().unwrap_or(0);
    dispatch.table_base = align_up(guest_max.max(STATE_SIZE as u64), 4) as u32;
    let memory_top = dispatch.table_base as u64 + dispatch.table_bytes.len() as u64;
    let memory_pages = (align_up(memory_top, WASM_PAGE_SIZE) / WASM_PAGE_SIZE).max(1);

    let mut module = Module::new();

    // --- Types: 0 = block fn (i32)->i32, 1 = dispatcher/syscall (i32,i32)->i32.
    let mut types = TypeSection::new();
    types.function([ValType::I32], [ValType::I32]);
    types.function([ValType::I32, ValType::I32], [ValType::I32]);
    module.section(&types);
    const BLOCK_FUNC_TYPE: u32 = 0;
    const DISPATCH_FUNC_TYPE: u32 = 1;

    // --- Import: the host's syscall handler, function index 0.
    let mut imports = ImportSection::new();
    imports.import("host", "syscall", EntityType::Function(DISPATCH_FUNC_TYPE));
    module.section(&imports);
    const SYSCALL_FUNC_INDEX: u32 = 0;

    // --- Functions: dispatcher (index 1), then one per block (2..).
    let mut functions = FunctionSection::new();
    functions.function(DISPATCH_FUNC_TYPE);
    for _ in blocks {
        functions.function(BLOCK_FUNC_TYPE);
    }
    module.section(&functions);
    const DISPATCHER_FUNC_INDEX: u32 = 1;
    const FIRST_BLOCK_FUNC_INDEX: u32 = 2;

    // --- Memory: big enough for the state region, every loadable segment
    // and the dispatch table; growable (the host may grow it further for
    // guest heap/stack).
    let mut memories = MemorySection::new();
    memories.memory(MemoryType { minimum: memory_pages, maximum: None, memory64: false, shared: false });
    module.section(&memories);

    // --- Globals: `entry_pc` and `state_base`, both immutable i32 constants
    // telling the host where to start and where the register file lives.
    let mut globals = GlobalSection::new();
    globals.global(
        GlobalType { val_type: ValType::I32, mutable: false, shared: false },
        &ConstExpr::i32_const(image.entry as i32),
    );
    globals.global(
        GlobalType { val_type: ValType::I32, mutable: false, shared: false },
        &ConstExpr::i32_const(STATE_BASE as i32),
    );
    module.section(&globals);
    const ENTRY_PC_GLOBAL: u32 = 0;
    const STATE_BASE_GLOBAL: u32 = 1;

    // --- Exports (§6.2).
    let mut exports = ExportSection::new();
    exports.export("run", ExportKind::Func, DISPATCHER_FUNC_INDEX);
    exports.export("memory", ExportKind::Memory, 0);
    exports.export("entry_pc", ExportKind::Global, ENTRY_PC_GLOBAL);
    exports.export("state_base", ExportKind::Global, STATE_BASE_GLOBAL);
    if options.debug {
        for (i, block) in blocks.iter().enumerate() {
            exports.export(&format!("block_{:x}", block.addr), ExportKind::Func, FIRST_BLOCK_FUNC_INDEX + i as u32);
        }
    }
    module.section(&exports);

    // --- Code.
    let mut code = CodeSection::new();
    code.function(&build_dispatcher(&dispatch, SYSCALL_FUNC_INDEX, FIRST_BLOCK_FUNC_INDEX));
    for block in blocks {
        code.function(&build_block_function(block));
    }
    module.section(&code);

    // --- Data: guest RAM contents from every loadable segment, then the
    // dispatch table.
    let mut data = DataSection::new();
    for seg in image.all_segments() {
        if seg.data.is_empty() {
            continue;
        }
        data.active(0, &ConstExpr::i32_const(seg.vaddr as i32), seg.data.iter().copied());
    }
    if !dispatch.table_bytes.is_empty() {
        data.active(0, &ConstExpr::i32_const(dispatch.table_base as i32), dispatch.table_bytes.iter().copied());
    }
    module.section(&data);

    let bytes = module.finish();
    validate(&bytes)?;

    log::info!(
        "emitted module: {} block function(s), {} memory page(s)",
        blocks.len(),
        memory_pages
    );

    Ok(bytes)
}

fn align_up(v: u64, align: u64) -> u64 {
    (v + align - 1) / align * align
}

fn validate(bytes: &[u8]) -> Result<(), wasmparser::BinaryReaderError> {
    wasmparser::Validator::new().validate_all(bytes).map(|_| ())
}

/// The flat PC→function-index lookup backing the dispatcher's `br_table`.
/// `table_bytes[i]` is the little-endian `i32` function index (relative to
/// `first_block_func_index`, i.e. the `br_table` case number) for the block
/// starting at `min_addr + i*2`, or `-1` if no block starts there.
struct DispatchTable {
    min_addr: u32,
    max_addr: u32,
    table_base: u32,
    table_bytes: Vec<u8>,
    num_blocks: u32,
}

impl DispatchTable {
    fn build(blocks: &[TranslatedBlock]) -> DispatchTable {
        let min_addr = blocks.iter().map(|b| b.addr).min().unwrap() as u32;
        let max_addr = blocks.iter().map(|b| b.addr).max().unwrap() as u32;
        let slots = ((max_addr - min_addr) / 2) as usize + 1;
        let mut table = vec![-1i32; slots];
        for (i, block) in blocks.iter().enumerate() {
            let slot = ((block.addr as u32 - min_addr) / 2) as usize;
            table[slot] = i as i32;
        }
        let table_bytes: Vec<u8> = table.iter().flat_map(|v| v.to_le_bytes()).collect();
        // `table_base` is set by the caller once the guest's high-water
        // mark is known, placing the table past every loadable segment so
        // ordinary loads/stores never alias it.
        DispatchTable { min_addr, max_addr, table_base: 0, table_bytes, num_blocks: blocks.len() as u32 }
    }
}

/// Builds the `run(state_ptr: i32, start_pc: i32) -> i32` dispatcher: a loop
/// that checks the halt sentinel, then the syscall bit (in that order —
/// `HALT_SENTINEL` also has its high bit set, per
/// [`rv2wasm_types::decode_dispatch`]), then looks up and calls the block
/// function for the current PC via `br_table`. An out-of-range PC, or one
/// with no block starting there, lands on the `br_table`'s default case and
/// halts — the same graceful outcome as an explicit guest halt (§7).
fn build_dispatcher(dispatch: &DispatchTable, syscall_func_index: u32, first_block_func_index: u32) -> Function {
    // Locals beyond params (0=state_ptr, 1=start_pc): local 2 = pc.
    let mut f = Function::new([(1, ValType::I32)]);
    const PC: u32 = 2;

    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalSet(PC));

    f.instruction(&Instruction::Loop(BlockType::Empty));

    // Halt check.
    f.instruction(&Instruction::LocalGet(PC));
    f.instruction(&Instruction::I32Const(HALT_SENTINEL));
    f.instruction(&Instruction::I32Eq);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::I32Const(HALT_SENTINEL));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);

    // Syscall check: high bit set (and not the all-ones halt sentinel,
    // already excluded above).
    f.instruction(&Instruction::LocalGet(PC));
    f.instruction(&Instruction::I32Const(SYSCALL_BIT as i32));
    f.instruction(&Instruction::I32And);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::LocalGet(PC));
    f.instruction(&Instruction::I32Const(!SYSCALL_BIT as i32));
    f.instruction(&Instruction::I32And);
    f.instruction(&Instruction::Call(syscall_func_index));
    f.instruction(&Instruction::LocalSet(PC));
    f.instruction(&Instruction::Br(1));
    f.instruction(&Instruction::End);

    let n = dispatch.num_blocks;
    if n == 0 {
        f.instruction(&Instruction::I32Const(HALT_SENTINEL));
        f.instruction(&Instruction::Return);
    } else {
        // Nesting, innermost first: case_0, case_1, ..., case_{n-1}, default.
        f.instruction(&Instruction::Block(BlockType::Empty)); // default
        for _ in 0..n {
            f.instruction(&Instruction::Block(BlockType::Empty));
        }

        // index = out-of-range(pc) ? -1 (guaranteed to miss every case,
        // landing on the default) : dispatch_table[(pc - min_addr) / 2]
        f.instruction(&Instruction::LocalGet(PC));
        f.instruction(&Instruction::I32Const(dispatch.min_addr as i32));
        f.instruction(&Instruction::I32LtS);
        f.instruction(&Instruction::LocalGet(PC));
        f.instruction(&Instruction::I32Const(dispatch.max_addr as i32));
        f.instruction(&Instruction::I32GtS);
        f.instruction(&Instruction::I32Or);
        f.instruction(&Instruction::If(BlockType::Result(ValType::I32)));
        f.instruction(&Instruction::I32Const(-1));
        f.instruction(&Instruction::Else);
        f.instruction(&Instruction::LocalGet(PC));
        f.instruction(&Instruction::I32Const(dispatch.min_addr as i32));
        f.instruction(&Instruction::I32Sub);
        f.instruction(&Instruction::I32Const(1));
        f.instruction(&Instruction::I32ShrU);
        f.instruction(&Instruction::I32Const(4));
        f.instruction(&Instruction::I32Mul);
        f.instruction(&Instruction::I32Const(dispatch.table_base as i32));
        f.instruction(&Instruction::I32Add);
        f.instruction(&Instruction::I32Load(MemArg { offset: 0, align: 2, memory_index: 0 }));
        f.instruction(&Instruction::End);

        let labels: Vec<u32> = (0..n).collect();
        f.instruction(&Instruction::BrTable(labels.as_slice().into(), n));

        for i in 0..n {
            f.instruction(&Instruction::End); // closes case_i
            f.instruction(&Instruction::LocalGet(0));
            f.instruction(&Instruction::Call(first_block_func_index + i));
            f.instruction(&Instruction::LocalSet(PC));
            f.instruction(&Instruction::Br(n - i));
        }
        f.instruction(&Instruction::End); // closes default

        f.instruction(&Instruction::I32Const(HALT_SENTINEL));
        f.instruction(&Instruction::Return);
    }

    f.instruction(&Instruction::End); // closes loop
    f.instruction(&Instruction::Unreachable);
    f.instruction(&Instruction::End); // end function

    f
}

fn build_block_function(block: &TranslatedBlock) -> Function {
    let mut f = Function::new([(SCRATCH_I64_COUNT, ValType::I64), (SCRATCH_I32_COUNT, ValType::I32)]);
    for inst in &block.body {
        emit_instruction(&mut f, inst);
    }
    f.instruction(&Instruction::End);
    f
}

fn emit_instruction(f: &mut Function, inst: &WasmInst) {
    use WasmInst as W;
    match inst {
        W::LocalGet(i) => f.instruction(&Instruction::LocalGet(*i)),
        W::LocalSet(i) => f.instruction(&Instruction::LocalSet(*i)),
        W::LocalTee(i) => f.instruction(&Instruction::LocalTee(*i)),

        W::I32Const(v) => f.instruction(&Instruction::I32Const(*v)),
        W::I64Const(v) => f.instruction(&Instruction::I64Const(*v)),
        W::F32Const(v) => f.instruction(&Instruction::F32Const(wasm_encoder::Ieee32::from(*v))),
        W::F64Const(v) => f.instruction(&Instruction::F64Const(wasm_encoder::Ieee64::from(*v))),

        W::I32Load { offset } => f.instruction(&Instruction::I32Load(mem(*offset, 2))),
        W::I64Load { offset } => f.instruction(&Instruction::I64Load(mem(*offset, 3))),
        W::I64Load8S { offset } => f.instruction(&Instruction::I64Load8S(mem(*offset, 0))),
        W::I64Load8U { offset } => f.instruction(&Instruction::I64Load8U(mem(*offset, 0))),
        W::I64Load16S { offset } => f.instruction(&Instruction::I64Load16S(mem(*offset, 1))),
        W::I64Load16U { offset } => f.instruction(&Instruction::I64Load16U(mem(*offset, 1))),
        W::I64Load32S { offset } => f.instruction(&Instruction::I64Load32S(mem(*offset, 2))),
        W::I64Load32U { offset } => f.instruction(&Instruction::I64Load32U(mem(*offset, 2))),
        W::F32Load { offset } => f.instruction(&Instruction::F32Load(mem(*offset, 2))),
        W::F64Load { offset } => f.instruction(&Instruction::F64Load(mem(*offset, 3))),

        W::I32Store { offset } => f.instruction(&Instruction::I32Store(mem(*offset, 2))),
        W::I64Store { offset } => f.instruction(&Instruction::I64Store(mem(*offset, 3))),
        W::I64Store8 { offset } => f.instruction(&Instruction::I64Store8(mem(*offset, 0))),
        W::I64Store16 { offset } => f.instruction(&Instruction::I64Store16(mem(*offset, 1))),
        W::I64Store32 { offset } => f.instruction(&Instruction::I64Store32(mem(*offset, 2))),
        W::F32Store { offset } => f.instruction(&Instruction::F32Store(mem(*offset, 2))),
        W::F64Store { offset } => f.instruction(&Instruction::F64Store(mem(*offset, 3))),

        W::I32Add => f.instruction(&Instruction::I32Add),
        W::I32Sub => f.instruction(&Instruction::I32Sub),
        W::I32Mul => f.instruction(&Instruction::I32Mul),
        W::I32DivS => f.instruction(&Instruction::I32DivS),
        W::I32DivU => f.instruction(&Instruction::I32DivU),
        W::I32RemS => f.instruction(&Instruction::I32RemS),
        W::I32RemU => f.instruction(&Instruction::I32RemU),
        W::I32And => f.instruction(&Instruction::I32And),
        W::I32Or => f.instruction(&Instruction::I32Or),
        W::I32Xor => f.instruction(&Instruction::I32Xor),
        W::I32Shl => f.instruction(&Instruction::I32Shl),
        W::I32ShrS => f.instruction(&Instruction::I32ShrS),
        W::I32ShrU => f.instruction(&Instruction::I32ShrU),
        W::I32Eq => f.instruction(&Instruction::I32Eq),
        W::I32Ne => f.instruction(&Instruction::I32Ne),
        W::I32LtS => f.instruction(&Instruction::I32LtS),
        W::I32LtU => f.instruction(&Instruction::I32LtU),
        W::I32GeS => f.instruction(&Instruction::I32GeS),
        W::I32GeU => f.instruction(&Instruction::I32GeU),

        W::I64Add => f.instruction(&Instruction::I64Add),
        W::I64Sub => f.instruction(&Instruction::I64Sub),
        W::I64Mul => f.instruction(&Instruction::I64Mul),
        W::I64DivS => f.instruction(&Instruction::I64DivS),
        W::I64DivU => f.instruction(&Instruction::I64DivU),
        W::I64RemS => f.instruction(&Instruction::I64RemS),
        W::I64RemU => f.instruction(&Instruction::I64RemU),
        W::I64And => f.instruction(&Instruction::I64And),
        W::I64Or => f.instruction(&Instruction::I64Or),
        W::I64Xor => f.instruction(&Instruction::I64Xor),
        W::I64Shl => f.instruction(&Instruction::I64Shl),
        W::I64ShrS => f.instruction(&Instruction::I64ShrS),
        W::I64ShrU => f.instruction(&Instruction::I64ShrU),
        W::I64Eq => f.instruction(&Instruction::I64Eq),
        W::I64Ne => f.instruction(&Instruction::I64Ne),
        W::I64LtS => f.instruction(&Instruction::I64LtS),
        W::I64LtU => f.instruction(&Instruction::I64LtU),
        W::I64GeS => f.instruction(&Instruction::I64GeS),
        W::I64GeU => f.instruction(&Instruction::I64GeU),

        W::I32WrapI64 => f.instruction(&Instruction::I32WrapI64),
        W::I64ExtendI32S => f.instruction(&Instruction::I64ExtendI32S),
        W::I64ExtendI32U => f.instruction(&Instruction::I64ExtendI32U),

        W::I32TruncSatF32S => f.instruction(&Instruction::I32TruncSatF32S),
        W::I32TruncSatF32U => f.instruction(&Instruction::I32TruncSatF32U),
        W::I32TruncSatF64S => f.instruction(&Instruction::I32TruncSatF64S),
        W::I32TruncSatF64U => f.instruction(&Instruction::I32TruncSatF64U),
        W::I64TruncSatF32S => f.instruction(&Instruction::I64TruncSatF32S),
        W::I64TruncSatF32U => f.instruction(&Instruction::I64TruncSatF32U),
        W::I64TruncSatF64S => f.instruction(&Instruction::I64TruncSatF64S),
        W::I64TruncSatF64U => f.instruction(&Instruction::I64TruncSatF64U),
        W::F32ConvertI32S => f.instruction(&Instruction::F32ConvertI32S),
        W::F32ConvertI32U => f.instruction(&Instruction::F32ConvertI32U),
        W::F32ConvertI64S => f.instruction(&Instruction::F32ConvertI64S),
        W::F32ConvertI64U => f.instruction(&Instruction::F32ConvertI64U),
        W::F64ConvertI32S => f.instruction(&Instruction::F64ConvertI32S),
        W::F64ConvertI32U => f.instruction(&Instruction::F64ConvertI32U),
        W::F64ConvertI64S => f.instruction(&Instruction::F64ConvertI64S),
        W::F64ConvertI64U => f.instruction(&Instruction::F64ConvertI64U),
        W::F32DemoteF64 => f.instruction(&Instruction::F32DemoteF64),
        W::F64PromoteF32 => f.instruction(&Instruction::F64PromoteF32),

        W::I32ReinterpretF32 => f.instruction(&Instruction::I32ReinterpretF32),
        W::I64ReinterpretF64 => f.instruction(&Instruction::I64ReinterpretF64),
        W::F32ReinterpretI32 => f.instruction(&Instruction::F32ReinterpretI32),
        W::F64ReinterpretI64 => f.instruction(&Instruction::F64ReinterpretI64),

        W::F32Add => f.instruction(&Instruction::F32Add),
        W::F32Sub => f.instruction(&Instruction::F32Sub),
        W::F32Mul => f.instruction(&Instruction::F32Mul),
        W::F32Div => f.instruction(&Instruction::F32Div),
        W::F32Sqrt => f.instruction(&Instruction::F32Sqrt),
        W::F32Min => f.instruction(&Instruction::F32Min),
        W::F32Max => f.instruction(&Instruction::F32Max),
        W::F32Neg => f.instruction(&Instruction::F32Neg),
        W::F32Eq => f.instruction(&Instruction::F32Eq),
        W::F32Lt => f.instruction(&Instruction::F32Lt),
        W::F32Le => f.instruction(&Instruction::F32Le),

        W::F64Add => f.instruction(&Instruction::F64Add),
        W::F64Sub => f.instruction(&Instruction::F64Sub),
        W::F64Mul => f.instruction(&Instruction::F64Mul),
        W::F64Div => f.instruction(&Instruction::F64Div),
        W::F64Sqrt => f.instruction(&Instruction::F64Sqrt),
        W::F64Min => f.instruction(&Instruction::F64Min),
        W::F64Max => f.instruction(&Instruction::F64Max),
        W::F64Neg => f.instruction(&Instruction::F64Neg),
        W::F64Eq => f.instruction(&Instruction::F64Eq),
        W::F64Lt => f.instruction(&Instruction::F64Lt),
        W::F64Le => f.instruction(&Instruction::F64Le),

        W::Select => f.instruction(&Instruction::Select),
        W::Drop => f.instruction(&Instruction::Drop),
        W::Return => f.instruction(&Instruction::Return),
        W::Unreachable => f.instruction(&Instruction::Unreachable),

        W::If { i64_result } => {
            let ty = if *i64_result { ValType::I64 } else { ValType::I32 };
            f.instruction(&Instruction::If(BlockType::Result(ty)))
        }
        W::Else => f.instruction(&Instruction::Else),
        W::End => f.instruction(&Instruction::End),
    };
}

fn mem(offset: u32, align: u32) -> MemArg {
    MemArg { offset: offset as u64, align, memory_index: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv2wasm_translate::ir::{SCRATCH_ADDR, SCRATCH_I64_BASE, SCRATCH_I64_COUNT};

    fn halting_block(addr: u64) -> TranslatedBlock {
        TranslatedBlock { addr, body: vec![WasmInst::I32Const(HALT_SENTINEL), WasmInst::Return] }
    }

    #[test]
    fn empty_block_list_is_rejected() {
        let image = rv2wasm_elf::test_support::image_with_code(vec![0u8; 4], 0x1000);
        let err = emit(&image, &[], &TranslateOptions::default()).unwrap_err();
        assert!(matches!(err, EmitError::NoBlocks));
    }

    #[test]
    fn single_block_module_validates() {
        let image = rv2wasm_elf::test_support::image_with_code(vec![0u8; 4], 0x1000);
        let blocks = vec![halting_block(0x1000)];
        let bytes = emit(&image, &blocks, &TranslateOptions::default()).unwrap();
        assert!(wasmparser::Validator::new().validate_all(&bytes).is_ok());
    }

    #[test]
    fn debug_mode_exports_named_block_functions() {
        let image = rv2wasm_elf::test_support::image_with_code(vec![0u8; 4], 0x1000);
        let blocks = vec![halting_block(0x1000)];
        let options = TranslateOptions { debug: true, ..TranslateOptions::default() };
        let bytes = emit(&image, &blocks, &options).unwrap();
        let parser = wasmparser::Parser::new(0);
        let mut saw_debug_export = false;
        for payload in parser.parse_all(&bytes) {
            if let wasmparser::Payload::ExportSection(reader) = payload.unwrap() {
                for export in reader {
                    if export.unwrap().name == "block_1000" {
                        saw_debug_export = true;
                    }
                }
            }
        }
        assert!(saw_debug_export);
    }

    #[test]
    fn dispatch_table_maps_each_block_start_to_its_case_index() {
        let blocks = vec![halting_block(0x1000), halting_block(0x1008)];
        let dispatch = DispatchTable::build(&blocks);
        assert_eq!(dispatch.min_addr, 0x1000);
        assert_eq!(dispatch.max_addr, 0x1008);
        assert_eq!(dispatch.num_blocks, 2);
        // Slot 0 -> block 0, slot 4 (0x1008 is 8 bytes / 2 past min_addr) -> block 1.
        let slot0 = i32::from_le_bytes(dispatch.table_bytes[0..4].try_into().unwrap());
        let slot4 = i32::from_le_bytes(dispatch.table_bytes[16..20].try_into().unwrap());
        assert_eq!(slot0, 0);
        assert_eq!(slot4, 1);
    }

    #[test]
    fn scratch_locals_are_declared_with_the_shared_layout() {
        // Touches every scratch local the shared layout declares (all six
        // i64 slots plus the i32 address slot) in one block. If the function
        // didn't declare exactly that layout, `wasmparser` would reject
        // either an out-of-range local index or an index/type mismatch.
        let body = (0..SCRATCH_I64_COUNT)
            .flat_map(|i| {
                [
                    WasmInst::LocalGet(0),
                    WasmInst::LocalGet(SCRATCH_I64_BASE + i),
                    WasmInst::I64Store { offset: 0 },
                ]
            })
            .chain([
                WasmInst::LocalGet(0),
                WasmInst::LocalGet(SCRATCH_ADDR),
                WasmInst::I32Store { offset: 0 },
            ])
            .chain([WasmInst::I32Const(HALT_SENTINEL), WasmInst::Return])
            .collect();
        let image = rv2wasm_elf::test_support::image_with_code(vec![0u8; 4], 0x1000);
        let blocks = vec![TranslatedBlock { addr: 0x1000, body }];
        let bytes = emit(&image, &blocks, &TranslateOptions::default()).unwrap();
        assert!(wasmparser::Validator::new().validate_all(&bytes).is_ok());
    }
}
