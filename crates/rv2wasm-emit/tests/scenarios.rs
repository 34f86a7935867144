//! End-to-end scenarios: hand-encoded RV64 instruction streams run through
//! the whole pipeline (ELF image -> CFG -> translate -> emit), then
//! actually executed with `wasmtime` so the resulting register state can be
//! read back out of linear memory. `wasmparser` validation (exercised in
//! `src/lib.rs`'s own tests) only proves the module is well-formed; these
//! tests prove the dispatcher and block functions actually behave as the
//! instruction streams intend.
//!
//! No assembler is available in this workspace, so every word below is
//! hand-encoded from the RV64I/M base and ABI register numbers
//! (t0..t3 = x5..x7,x28; a0,a1,a7 = x10,x11,x17).

use std::cell::Cell;
use std::rc::Rc;

use rv2wasm_elf::Symbol;
use rv2wasm_types::{int_reg_offset, TranslateOptions};
use wasmtime::{Engine, Instance, Linker, Module, Store};

fn addi(rd: u8, rs1: u8, imm: i32) -> u32 {
    ((imm as u32 & 0xfff) << 20) | ((rs1 as u32) << 15) | ((rd as u32) << 7) | 0x13
}

fn lui(rd: u8, imm20: u32) -> u32 {
    (imm20 << 12) | ((rd as u32) << 7) | 0x37
}

fn auipc(rd: u8, imm20: u32) -> u32 {
    (imm20 << 12) | ((rd as u32) << 7) | 0x17
}

fn addw(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0, rs2, rs1, 0, rd, 0x3b)
}

fn slli(rd: u8, rs1: u8, shamt: u32) -> u32 {
    ((shamt & 0x3f) << 20) | ((rs1 as u32) << 15) | (0b001 << 12) | ((rd as u32) << 7) | 0x13
}

fn jalr(rd: u8, rs1: u8, imm: i32) -> u32 {
    ((imm as u32 & 0xfff) << 20) | ((rs1 as u32) << 15) | ((rd as u32) << 7) | 0x67
}

fn r_type(f7: u32, rs2: u8, rs1: u8, f3: u32, rd: u8, opcode: u32) -> u32 {
    (f7 << 25) | ((rs2 as u32) << 20) | ((rs1 as u32) << 15) | (f3 << 12) | ((rd as u32) << 7) | opcode
}

fn div(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0b0000001, rs2, rs1, 0b100, rd, 0b0110011)
}

fn rem(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0b0000001, rs2, rs1, 0b110, rd, 0b0110011)
}

fn blt(rs1: u8, rs2: u8, imm: i32) -> u32 {
    let imm = imm as u32 & 0x1fff;
    let b12 = (imm >> 12) & 1;
    let b11 = (imm >> 11) & 1;
    let b10_5 = (imm >> 5) & 0x3f;
    let b4_1 = (imm >> 1) & 0xf;
    (b12 << 31) | (b10_5 << 25) | ((rs2 as u32) << 20) | ((rs1 as u32) << 15) | (0b100 << 12) | (b4_1 << 8) | (b11 << 7) | 0b1100011
}

fn srli(rd: u8, rs1: u8, shamt: u32) -> u32 {
    ((shamt & 0x3f) << 20) | ((rs1 as u32) << 15) | (0b101 << 12) | ((rd as u32) << 7) | 0x13
}

fn add(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0, rs2, rs1, 0, rd, 0b0110011)
}

fn mulhu(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0b0000001, rs2, rs1, 0b011, rd, 0b0110011)
}

fn mulh(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0b0000001, rs2, rs1, 0b001, rd, 0b0110011)
}

fn mulhsu(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0b0000001, rs2, rs1, 0b010, rd, 0b0110011)
}

/// Loads a 64-bit `value` into `rd`, clobbering `tmp`. Only values whose two
/// 32-bit halves each end in 12 zero bits are supported (`lui`'s only way to
/// reach every bit of a 64-bit register without an assembler): the high half
/// is built with `lui`+`slli(,32)`, since shifting left by 32 discards
/// whatever `lui`'s 32-bit sign extension left above bit 31; the low half
/// needs the same `slli(,32)` followed by `srli(,32)` to zero-extend it
/// before the two halves are added together.
fn load_imm64(rd: u8, tmp: u8, value: u64) -> Vec<u32> {
    assert_eq!(value & 0xfff, 0, "low 12 bits of each half must be zero for this loader");
    let hi20 = (value >> 44) as u32 & 0xfffff;
    let lo20 = (value >> 12) as u32 & 0xfffff;
    vec![
        lui(rd, hi20),
        slli(rd, rd, 32),
        lui(tmp, lo20),
        slli(tmp, tmp, 32),
        srli(tmp, tmp, 32),
        add(rd, rd, tmp),
    ]
}

fn ecall() -> u32 {
    0x73
}

fn ebreak() -> u32 {
    (1 << 20) | 0x73
}

fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Runs `words` (loaded at `vaddr`, entry point `vaddr`) through the full
/// pipeline, registering `extra_symbols` as additional CFG leaders (used to
/// force a block boundary that no direct branch/jump target would create on
/// its own, e.g. an indirect-jump destination).
fn emit_module(words: &[u32], vaddr: u64, extra_symbols: &[(&str, u64)]) -> Vec<u8> {
    let mut image = rv2wasm_elf::test_support::image_with_code(words_to_bytes(words), vaddr);
    for (name, address) in extra_symbols {
        image.symbols.push(Symbol { name: name.to_string(), address: *address, size: 0 });
    }
    let graph = rv2wasm_cfg::build(&image).expect("building control-flow graph");
    let blocks: Vec<_> = graph.blocks().iter().map(rv2wasm_translate::translate_block).collect();
    rv2wasm_emit::emit(&image, &blocks, &TranslateOptions::default()).expect("emitting wasm module")
}

/// Instantiates `bytes`, wiring up the `host.syscall` import with a stub
/// that always halts — real syscall emulation is an external collaborator's
/// job, not this translator's (§1 Non-goal); the one scenario that invokes a
/// syscall (an `exit`) only needs the halt itself to be observed.
fn instantiate(bytes: &[u8]) -> (Store<()>, Instance) {
    let engine = Engine::default();
    let module = Module::new(&engine, bytes).expect("module should validate");
    let mut linker = Linker::new(&engine);
    linker.func_wrap("host", "syscall", |_state_ptr: i32, _pc: i32| -> i32 { -1 }).unwrap();
    let mut store = Store::new(&engine, ());
    let instance = linker.instantiate(&mut store, &module).expect("instantiation should succeed");
    (store, instance)
}

/// Like `instantiate`, but the stub records the `pc` it was actually called
/// with instead of ignoring it — for asserting the dispatcher strips the
/// dispatch table's syscall sentinel bit before the call (§4.5/§6.2), rather
/// than handing the host the raw, still-tagged table value.
fn instantiate_recording_syscall_pc(bytes: &[u8]) -> (Store<()>, Instance, Rc<Cell<i32>>) {
    let seen = Rc::new(Cell::new(0));
    let seen_in_closure = Rc::clone(&seen);
    let engine = Engine::default();
    let module = Module::new(&engine, bytes).expect("module should validate");
    let mut linker = Linker::new(&engine);
    linker
        .func_wrap("host", "syscall", move |_state_ptr: i32, pc: i32| -> i32 {
            seen_in_closure.set(pc);
            -1
        })
        .unwrap();
    let mut store = Store::new(&engine, ());
    let instance = linker.instantiate(&mut store, &module).expect("instantiation should succeed");
    (store, instance, seen)
}

fn run(store: &mut Store<()>, instance: &Instance, entry_pc: i32) -> i32 {
    let run = instance.get_typed_func::<(i32, i32), i32>(&mut *store, "run").unwrap();
    run.call(&mut *store, (0, entry_pc)).unwrap()
}

fn read_int_reg(store: &mut Store<()>, instance: &Instance, reg: u8) -> i64 {
    let memory = instance.get_memory(&mut *store, "memory").unwrap();
    let off = int_reg_offset(reg) as usize;
    i64::from_le_bytes(memory.data(&store)[off..off + 8].try_into().unwrap())
}

/// S1: `addi a0,x0,42; addi a7,x0,93; ecall` halts on the exit syscall with
/// `a0` untouched by the handoff. A trailing `ebreak` extends the segment
/// past the `ecall`'s fallthrough address so the CFG builder's pass-two
/// decode of that (unreachable, given the always-halting stub) leader never
/// reads past the end of the segment.
#[test]
fn s1_syscall_preserves_a0() {
    let words = [addi(10, 0, 42), addi(17, 0, 93), ecall(), ebreak()];
    let bytes = emit_module(&words, 0x1000, &[]);
    let (mut store, instance) = instantiate(&bytes);
    let halt = run(&mut store, &instance, 0x1000);
    assert_eq!(halt, -1);
    assert_eq!(read_int_reg(&mut store, &instance, 10), 42);
}

/// The dispatcher must mask the syscall sentinel bit off the dispatch-table
/// value before calling `host.syscall`: the `ecall` is the third instruction
/// (`0x1000 + 2*4 = 0x1008`), so the host must see that clean address, not
/// the tagged, negative table entry the block function actually returned.
#[test]
fn host_syscall_receives_the_clean_pc_with_the_sentinel_bit_masked_off() {
    let words = [addi(10, 0, 42), addi(17, 0, 93), ecall(), ebreak()];
    let bytes = emit_module(&words, 0x1000, &[]);
    let (mut store, instance, seen_pc) = instantiate_recording_syscall_pc(&bytes);
    let halt = run(&mut store, &instance, 0x1000);
    assert_eq!(halt, -1);
    assert_eq!(seen_pc.get(), 0x1008);
}

/// S2: a counting loop, `addi a0,x0,0; addi a1,x0,10; loop: addi
/// a0,a0,1; blt a0,a1,loop; ebreak`. The two leading `addi`s share a
/// fallthrough boundary with the loop body (itself a branch target), so the
/// CFG builder splits them into their own block with no real terminating
/// instruction — exercising the synthetic-`Jmp` fallthrough path.
#[test]
fn s2_loop_counts_up_to_ten() {
    let words = [
        addi(10, 0, 0),
        addi(11, 0, 10),
        addi(10, 10, 1),
        blt(10, 11, -4),
        ebreak(),
    ];
    let bytes = emit_module(&words, 0x1000, &[]);
    let (mut store, instance) = instantiate(&bytes);
    let halt = run(&mut store, &instance, 0x1000);
    assert_eq!(halt, -1);
    assert_eq!(read_int_reg(&mut store, &instance, 10), 10);
}

/// S3: `lui t0,0x80000; addw t1,t0,x0; ebreak`. `LUI` sign-extends its
/// 32-bit result to 64 bits, and the word-form `addw` truncates, adds in
/// 32 bits, then sign-extends again — both ending up at the same all-ones
/// high half.
#[test]
fn s3_word_form_add_sign_extends() {
    let words = [lui(5, 0x80000), addw(6, 5, 0), ebreak()];
    let bytes = emit_module(&words, 0x1000, &[]);
    let (mut store, instance) = instantiate(&bytes);
    let halt = run(&mut store, &instance, 0x1000);
    assert_eq!(halt, -1);
    let t1 = read_int_reg(&mut store, &instance, 6);
    assert_eq!(t1, -2147483648i64);
    assert_eq!((t1 as u64) >> 32, 0xffff_ffff);
}

/// S4: division and remainder by zero. RISC-V defines both rather than
/// trapping: the quotient is all-ones, the remainder is the dividend
/// unchanged.
#[test]
fn s4_division_by_zero_follows_riscv_not_wasm_trap_semantics() {
    let words = [addi(5, 0, 7), addi(6, 0, 0), div(7, 5, 6), rem(28, 5, 6), ebreak()];
    let bytes = emit_module(&words, 0x1000, &[]);
    let (mut store, instance) = instantiate(&bytes);
    let halt = run(&mut store, &instance, 0x1000);
    assert_eq!(halt, -1);
    assert_eq!(read_int_reg(&mut store, &instance, 7), -1);
    assert_eq!(read_int_reg(&mut store, &instance, 28), 7);
}

/// S5: signed division overflow (`i64::MIN / -1`). RISC-V leaves the
/// quotient as the unchanged dividend rather than the Wasm `i64.div_s`
/// trap that a literal translation would hit.
#[test]
fn s5_division_overflow_leaves_dividend_unchanged() {
    let words = [lui(5, 0x80000), slli(5, 5, 32), addi(6, 0, -1), div(7, 5, 6), ebreak()];
    let bytes = emit_module(&words, 0x1000, &[]);
    let (mut store, instance) = instantiate(&bytes);
    let halt = run(&mut store, &instance, 0x1000);
    assert_eq!(halt, -1);
    let t0 = read_int_reg(&mut store, &instance, 5);
    assert_eq!(t0, i64::MIN);
    assert_eq!(read_int_reg(&mut store, &instance, 7), t0);
}

/// S6: an indirect jump computed at run time (`auipc`+`addi` building a
/// target address in `t0`, then `jalr x0,0(t0)`). The target address has no
/// direct predecessor edge the CFG builder can see statically, so a symbol
/// is registered there to force it into its own dispatchable block — the
/// same way a real ELF's symbol table would mark a function entry point the
/// CFG builder couldn't otherwise discover from straight-line decode.
#[test]
fn s6_indirect_jump_resolves_through_the_dispatcher() {
    let words = [auipc(5, 0), addi(5, 5, 0xc), jalr(0, 5, 0), ebreak()];
    let bytes = emit_module(&words, 0x1000, &[("second_function", 0x100c)]);
    let (mut store, instance) = instantiate(&bytes);
    let halt = run(&mut store, &instance, 0x1000);
    assert_eq!(halt, -1);
    assert_eq!(read_int_reg(&mut store, &instance, 5), 0x100c);
}

/// Determinism: translating the same ELF image twice, all the way through to
/// the final Wasm bytes, must produce byte-identical modules.
#[test]
fn translating_the_same_image_twice_yields_byte_identical_modules() {
    let words = [
        addi(10, 0, 0),
        addi(11, 0, 10),
        addi(10, 10, 1),
        blt(10, 11, -4),
        ebreak(),
    ];
    let first = emit_module(&words, 0x1000, &[]);
    let second = emit_module(&words, 0x1000, &[]);
    assert_eq!(first, second);
}

/// Dispatcher closure: the dispatch table must route an `entry_pc` straight
/// into *that* block's own function, not the segment's first block. Entering
/// directly at the loop body (skipping the `a0=0,a1=10` setup block) with an
/// all-zero initial state means `a1` is still `0`, so the loop body runs
/// exactly once (`a0` goes from `0` to `1`) before `blt` sees `1 < 0` as false
/// and falls through to the halt.
#[test]
fn dispatcher_routes_entry_pc_to_the_matching_block_function() {
    let words = [
        addi(10, 0, 0),
        addi(11, 0, 10),
        addi(10, 10, 1),
        blt(10, 11, -4),
        ebreak(),
    ];
    let bytes = emit_module(&words, 0x1000, &[]);
    let (mut store, instance) = instantiate(&bytes);
    let halt = run(&mut store, &instance, 0x1008);
    assert_eq!(halt, -1);
    assert_eq!(read_int_reg(&mut store, &instance, 10), 1);
}

/// MULHU's high word comes from four 32x32 partial products whose carries
/// must be propagated into each other, not just summed: both operands here
/// are positive enough (as signed values) that a version which dropped those
/// carries would still land one past the correct low bits, not wildly off,
/// so this pins the exact value rather than just "not obviously broken".
#[test]
fn mulhu_computes_the_exact_high_word_including_cross_term_carries() {
    let a: u64 = 0x52e6b000f2a74000;
    let b: u64 = 0x269e000065132000;
    let mut words = load_imm64(5, 6, a);
    words.extend(load_imm64(7, 28, b));
    words.push(mulhu(29, 5, 7));
    words.push(ebreak());
    let bytes = emit_module(&words, 0x1000, &[]);
    let (mut store, instance) = instantiate(&bytes);
    let halt = run(&mut store, &instance, 0x1000);
    assert_eq!(halt, -1);
    assert_eq!(read_int_reg(&mut store, &instance, 29) as u64, 0xc816880e555cba5);
}

/// MULH with both operands negative applies both sign corrections on top of
/// the exact unsigned high word, landing on a value with no bits in common
/// with MULHU's result on the same bit patterns — proof the correction runs
/// against the carry-correct base rather than masking the same bug.
#[test]
fn mulh_applies_sign_correction_on_top_of_the_exact_unsigned_high_word() {
    let a: u64 = 0x86ee60009097a000;
    let b: u64 = 0xcf30c000f5e77000;
    let mut words = load_imm64(5, 6, a);
    words.extend(load_imm64(7, 28, b));
    words.push(mulhu(29, 5, 7));
    words.push(mulh(30, 5, 7));
    words.push(ebreak());
    let bytes = emit_module(&words, 0x1000, &[]);
    let (mut store, instance) = instantiate(&bytes);
    let halt = run(&mut store, &instance, 0x1000);
    assert_eq!(halt, -1);
    assert_eq!(read_int_reg(&mut store, &instance, 29) as u64, 0x6d347185bea24141);
    assert_eq!(read_int_reg(&mut store, &instance, 30) as u64, 0x1715518438233141);
}

/// MULHSU treats only `rs1` as signed, so on the same negative/negative bit
/// patterns as the MULH case above it must apply just one correction term
/// and land on a third distinct value, neither MULHU's nor MULH's.
#[test]
fn mulhsu_treats_only_the_first_operand_as_signed() {
    let a: u64 = 0x86ee60009097a000;
    let b: u64 = 0xcf30c000f5e77000;
    let mut words = load_imm64(5, 6, a);
    words.extend(load_imm64(7, 28, b));
    words.push(mulhsu(31, 5, 7));
    words.push(ebreak());
    let bytes = emit_module(&words, 0x1000, &[]);
    let (mut store, instance) = instantiate(&bytes);
    let halt = run(&mut store, &instance, 0x1000);
    assert_eq!(halt, -1);
    assert_eq!(read_int_reg(&mut store, &instance, 31) as u64, 0x9e03b184c8bad141);
}
