//! Builds the per-module block graph: basic-block leaders and boundaries,
//! terminators and successor edges, over every executable segment of a
//! loaded ELF (§4.3).
//!
//! The builder runs two passes per segment: first a linear decode collecting
//! leader addresses (branch/jump targets, symbol entry points, the segment
//! base), then a second linear decode from each leader accumulating
//! operations up to its terminator.

use std::collections::BTreeMap;

use rv2wasm_decode::{DecodeError, Inst, Op};
use rv2wasm_elf::ElfImage;
use rv2wasm_types::BlockIndex;

/// The kind of control transfer a block ends with, and where control goes
/// next (§4.3's terminator table).
#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
    /// Conditional branch: `taken` on true, `fallthrough` on false.
    Cond { taken: u64, fallthrough: u64 },
    /// Unconditional direct jump (link discarded).
    Jmp { target: u64 },
    /// Direct jump that writes a link register. The return site is not a CFG
    /// successor edge — the callee's own terminator returns to the dispatcher.
    Call { target: u64 },
    /// Indirect jump (including `ret`); target is resolved at run time by
    /// the dispatcher.
    IJmp,
    /// System call; execution resumes at `fallthrough` once the host
    /// services it.
    Syscall { fallthrough: u64 },
    /// Illegal encoding or an instruction stream with no live successor.
    Halt,
}

/// A maximal straight-line run of operations ending at a control transfer.
#[derive(Clone, Debug)]
pub struct Block {
    pub index: BlockIndex,
    pub start: u64,
    pub end: u64,
    pub insts: Vec<Inst>,
    pub terminator: Terminator,
}

/// The full set of basic blocks reachable by linear decode from every
/// segment base and every direct control-transfer target, keyed by start
/// address and enumerated in ascending-address order (§3, §4.3).
#[derive(Clone, Debug, Default)]
pub struct BlockGraph {
    blocks: Vec<Block>,
    index_of: BTreeMap<u64, BlockIndex>,
}

impl BlockGraph {
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, index: BlockIndex) -> &Block {
        &self.blocks[index.index() as usize]
    }

    pub fn block_at(&self, addr: u64) -> Option<&Block> {
        self.index_of.get(&addr).map(|&i| self.block(i))
    }

    pub fn index_at(&self, addr: u64) -> Option<BlockIndex> {
        self.index_of.get(&addr).copied()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Failure modes raised while assembling the block graph (§7).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CfgError {
    #[error("no executable segment produced any basic block")]
    NoBlocks,
    #[error("leader {leader:#x} falls inside an instruction starting at {containing_start:#x}")]
    LeaderInsideInstruction { leader: u64, containing_start: u64 },
    #[error("decode error while building block at {addr:#x}: {source}")]
    Decode {
        addr: u64,
        #[source]
        source: DecodeError,
    },
}

struct SegmentView<'a> {
    base: u64,
    data: &'a [u8],
}

impl<'a> SegmentView<'a> {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.base + self.data.len() as u64
    }

    fn bytes_at(&self, addr: u64) -> &'a [u8] {
        let offset = (addr - self.base) as usize;
        &self.data[offset..]
    }
}

fn decode_at(views: &[SegmentView<'_>], addr: u64) -> Result<Inst, CfgError> {
    let view = views
        .iter()
        .find(|v| v.contains(addr))
        .expect("leader address must lie within a known executable segment");
    rv2wasm_decode::decode(view.bytes_at(addr), addr).map_err(|source| CfgError::Decode { addr, source })
}

/// Direct successor addresses of a terminating instruction, used to seed the
/// leader set in pass one. `None` for indirect/halting terminators.
fn direct_successors(inst: &Inst) -> Vec<u64> {
    let next = inst.addr + inst.len as u64;
    match inst.op {
        Op::Branch { imm, .. } => {
            vec![(inst.addr as i64 + imm) as u64, next]
        }
        Op::Jal { imm, .. } => vec![(inst.addr as i64 + imm) as u64],
        Op::Ecall => vec![next],
        _ => Vec::new(),
    }
}

fn terminator_for(inst: &Inst) -> Terminator {
    let next = inst.addr + inst.len as u64;
    match inst.op {
        Op::Branch { imm, .. } => {
            Terminator::Cond { taken: (inst.addr as i64 + imm) as u64, fallthrough: next }
        }
        Op::Jal { rd, imm } => {
            let target = (inst.addr as i64 + imm) as u64;
            if rd.is_zero() {
                Terminator::Jmp { target }
            } else {
                Terminator::Call { target }
            }
        }
        Op::Jalr { .. } => Terminator::IJmp,
        Op::Ecall => Terminator::Syscall { fallthrough: next },
        Op::Ebreak | Op::Illegal { .. } => Terminator::Halt,
        _ => unreachable!("terminator_for called on a non-terminator op"),
    }
}

/// Builds the block graph over every executable segment of `image`,
/// seeding leaders from segment bases, the ELF entry point, named symbols
/// and every direct control-transfer target discovered in pass one.
pub fn build(image: &ElfImage) -> Result<BlockGraph, CfgError> {
    let segments: Vec<Segment> = image
        .segments_for_code()
        .map(|s| Segment { vaddr: s.vaddr, data: s.data.clone() })
        .collect();
    let views: Vec<SegmentView<'_>> = segments
        .iter()
        .map(|s| SegmentView { base: s.vaddr, data: &s.data })
        .collect();

    let in_code = |addr: u64| views.iter().any(|v| v.contains(addr));

    let mut leaders: BTreeMap<u64, ()> = BTreeMap::new();
    for view in &views {
        leaders.insert(view.base, ());
    }
    if in_code(image.entry) {
        leaders.insert(image.entry, ());
    }
    for sym in &image.symbols {
        if in_code(sym.address) {
            leaders.insert(sym.address, ());
        }
    }

    // Pass one: linear decode each segment, recording every terminator's
    // direct successors as additional leaders.
    for view in &views {
        let mut addr = view.base;
        let end = view.base + view.data.len() as u64;
        while addr < end {
            let inst = match decode_at(&views, addr) {
                Ok(inst) => inst,
                Err(_) => {
                    // Illegal encodings are handled per-block in pass two;
                    // pass one just needs to keep stepping forward.
                    addr += 2;
                    continue;
                }
            };
            if inst.op.is_terminator() {
                for succ in direct_successors(&inst) {
                    if in_code(succ) {
                        leaders.insert(succ, ());
                    }
                }
            }
            addr += inst.len as u64;
        }
    }

    let leader_addrs: Vec<u64> = leaders.keys().copied().collect();

    // Pass two: from each leader, decode until a terminator.
    let mut blocks = Vec::with_capacity(leader_addrs.len());
    let mut index_of = BTreeMap::new();
    for (i, &start) in leader_addrs.iter().enumerate() {
        let block_index = BlockIndex::new(i as u32);
        index_of.insert(start, block_index);

        let mut insts = Vec::new();
        let mut addr = start;
        let segment_end = views
            .iter()
            .find(|v| v.contains(start))
            .map(|v| v.base + v.data.len() as u64)
            .expect("leader address must lie within a known executable segment");

        let terminator = loop {
            if addr >= segment_end {
                break Terminator::Halt;
            }
            // A later leader inside this run means an earlier terminator
            // was mis-scanned in pass one only if it's not itself the start
            // of the loop; this can legitimately happen when two blocks
            // share a fallthrough boundary, so we simply stop here and let
            // the next leader own the remaining bytes.
            if addr != start && leaders.contains_key(&addr) {
                break Terminator::Jmp { target: addr };
            }
            match decode_at(&views, addr) {
                Ok(inst) => {
                    let is_term = inst.op.is_terminator();
                    let len = inst.len as u64;
                    if let Some((&leader, ())) = leaders.range(addr + 1..addr + len).next() {
                        return Err(CfgError::LeaderInsideInstruction { leader, containing_start: addr });
                    }
                    let term = if is_term { Some(terminator_for(&inst)) } else { None };
                    insts.push(inst);
                    addr += len;
                    if let Some(term) = term {
                        break term;
                    }
                }
                Err(CfgError::Decode { addr: fault_addr, source }) => {
                    let (reason, raw) = match source {
                        DecodeError::UnknownEncoding { raw, .. } => ("unknown encoding", raw),
                        DecodeError::Reserved { raw, reason, .. } => (reason, raw),
                        DecodeError::Truncated { .. } => ("truncated instruction stream", 0),
                    };
                    insts.push(Inst { addr: fault_addr, len: 2, op: Op::Illegal { reason, raw } });
                    break Terminator::Halt;
                }
                Err(_) => break Terminator::Halt,
            }
        };

        let end = addr;
        blocks.push(Block { index: block_index, start, end, insts, terminator });
    }

    if blocks.is_empty() {
        return Err(CfgError::NoBlocks);
    }

    log::info!(
        "built block graph: {} segment(s), {} block(s)",
        segments.len(),
        blocks.len()
    );

    Ok(BlockGraph { blocks, index_of })
}

struct Segment {
    vaddr: u64,
    data: Vec<u8>,
}
