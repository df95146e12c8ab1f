//! # Stack Walking
//!
//! Reconstructs the faulting thread's call stack by following the
//! frame-pointer chain:
//!
//! - **x86-64**: `[rbp]` holds the caller's `rbp`, `[rbp + 8]` the return address
//! - **AArch64**: `[x29]` holds the caller's `x29`, `[x29 + 8]` the saved `x30`
//!
//! Every read goes through [`MemoryAccess`], so a corrupted chain ends the
//! walk instead of faulting. The walk stops when:
//!
//! - a frame record cannot be read
//! - the next program counter is zero
//! - the chain does not move strictly toward higher addresses (this catches
//!   self-referential and cyclic frame records)
//! - the frame limit is reached

use tracing::trace;

use crate::memory::MemoryAccess;
use crate::symbols::ResolutionChain;
use crate::types::{Address, Architecture, Registers, ResolvedFrame};

/// Upper bound on frames collected from one stack
pub const MAX_FRAMES: usize = 1024;

/// Frame-pointer stack walker over a register snapshot
pub struct StackWalker<'a, M>
{
    architecture: Architecture,
    memory: &'a M,
    max_frames: usize,
}

impl<'a, M: MemoryAccess> StackWalker<'a, M>
{
    pub fn new(architecture: Architecture, memory: &'a M) -> Self
    {
        Self {
            architecture,
            memory,
            max_frames: MAX_FRAMES,
        }
    }

    /// Limit the number of frames (clamped to `1..=MAX_FRAMES`)
    #[must_use]
    pub fn with_max_frames(mut self, max_frames: usize) -> Self
    {
        self.max_frames = max_frames.clamp(1, MAX_FRAMES);
        self
    }

    /// Program counters of the stack, innermost first
    pub fn program_counters(&self, regs: &Registers) -> Vec<Address>
    {
        let mut pcs = Vec::new();
        if regs.pc.is_zero() {
            return pcs;
        }
        pcs.push(regs.pc);

        if !self.architecture.supports_frame_walk() {
            return pcs;
        }

        let mut fp = regs.fp;
        while pcs.len() < self.max_frames && !fp.is_zero() {
            let Ok(saved_fp) = self.memory.read_u64(fp) else {
                trace!(%fp, "frame record unreadable");
                break;
            };
            let Some(Ok(return_address)) = fp.checked_add(8).map(|slot| self.memory.read_u64(slot)) else {
                trace!(%fp, "return address unreadable");
                break;
            };

            if return_address == 0 {
                break;
            }
            let saved_fp = Address::new(saved_fp);
            if !saved_fp.is_zero() && saved_fp <= fp {
                trace!(%fp, %saved_fp, "frame chain does not advance");
                break;
            }

            pcs.push(Address::new(return_address));
            fp = saved_fp;
        }

        pcs
    }

    /// Walk the stack and resolve every frame through `chain`
    pub fn walk(&self, regs: &Registers, chain: &mut ResolutionChain<'_>) -> Vec<ResolvedFrame>
    {
        self.program_counters(regs)
            .into_iter()
            .enumerate()
            .map(|(index, pc)| ResolvedFrame::new(index, pc, chain.describe(pc)))
            .collect()
    }
}

#[cfg(test)]
mod tests
{
    use std::collections::HashMap;

    use super::*;
    use crate::error::{CrashError, Result};

    #[derive(Default)]
    struct FakeMemory
    {
        words: HashMap<u64, u64>,
    }

    impl FakeMemory
    {
        fn frame(mut self, fp: u64, saved_fp: u64, return_address: u64) -> Self
        {
            self.words.insert(fp, saved_fp);
            self.words.insert(fp + 8, return_address);
            self
        }
    }

    impl MemoryAccess for FakeMemory
    {
        fn read_u64(&self, address: Address) -> Result<u64>
        {
            self.words
                .get(&address.value())
                .copied()
                .ok_or(CrashError::Memory { address })
        }
    }

    fn regs(pc: u64, fp: u64) -> Registers
    {
        Registers {
            pc: Address::new(pc),
            sp: Address::new(fp - 0x40),
            fp: Address::new(fp),
            lr: Address::ZERO,
        }
    }

    #[test]
    fn test_walks_chain_until_null_frame()
    {
        let memory = FakeMemory::default()
            .frame(0x7000, 0x7100, 0x40_1000)
            .frame(0x7100, 0x7200, 0x40_2000)
            .frame(0x7200, 0, 0x40_3000);
        let walker = StackWalker::new(Architecture::X86_64, &memory);
        let pcs = walker.program_counters(&regs(0x40_0000, 0x7000));
        assert_eq!(
            pcs,
            vec![
                Address::new(0x40_0000),
                Address::new(0x40_1000),
                Address::new(0x40_2000),
                Address::new(0x40_3000),
            ]
        );
    }

    #[test]
    fn test_self_referential_frame_yields_one_frame()
    {
        let memory = FakeMemory::default().frame(0x7000, 0x7000, 0x40_1000);
        let walker = StackWalker::new(Architecture::X86_64, &memory);
        let pcs = walker.program_counters(&regs(0x40_0000, 0x7000));
        assert_eq!(pcs, vec![Address::new(0x40_0000)]);
    }

    #[test]
    fn test_backwards_chain_terminates()
    {
        let memory = FakeMemory::default()
            .frame(0x7000, 0x7100, 0x40_1000)
            .frame(0x7100, 0x7000, 0x40_2000);
        let walker = StackWalker::new(Architecture::Arm64, &memory);
        let pcs = walker.program_counters(&regs(0x40_0000, 0x7000));
        assert_eq!(pcs.len(), 2);
    }

    #[test]
    fn test_unreadable_frame_ends_walk_early()
    {
        let memory = FakeMemory::default().frame(0x7000, 0xdead_0000, 0x40_1000);
        let walker = StackWalker::new(Architecture::X86_64, &memory);
        let pcs = walker.program_counters(&regs(0x40_0000, 0x7000));
        assert_eq!(pcs, vec![Address::new(0x40_0000), Address::new(0x40_1000)]);
    }

    #[test]
    fn test_zero_return_address_is_terminal()
    {
        let memory = FakeMemory::default().frame(0x7000, 0x7100, 0);
        let walker = StackWalker::new(Architecture::X86_64, &memory);
        assert_eq!(walker.program_counters(&regs(0x40_0000, 0x7000)).len(), 1);
    }

    #[test]
    fn test_zero_pc_yields_no_frames()
    {
        let memory = FakeMemory::default();
        let walker = StackWalker::new(Architecture::X86_64, &memory);
        assert!(walker.program_counters(&regs(0, 0x7000)).is_empty());
    }

    #[test]
    fn test_frame_limit()
    {
        let mut memory = FakeMemory::default();
        for i in 0..10u64 {
            memory = memory.frame(0x7000 + i * 0x100, 0x7000 + (i + 1) * 0x100, 0x40_0000 + i);
        }
        let walker = StackWalker::new(Architecture::X86_64, &memory).with_max_frames(3);
        assert_eq!(walker.program_counters(&regs(0x40_0000, 0x7000)).len(), 3);
    }

    #[test]
    fn test_unknown_architecture_reports_only_pc()
    {
        let memory = FakeMemory::default().frame(0x7000, 0x7100, 0x40_1000);
        let walker = StackWalker::new(Architecture::Unknown("riscv64"), &memory);
        assert_eq!(walker.program_counters(&regs(0x40_0000, 0x7000)).len(), 1);
    }

    #[test]
    fn test_walk_resolves_every_frame()
    {
        let memory = FakeMemory::default().frame(0x7000, 0, 0x40_1000);
        let walker = StackWalker::new(Architecture::X86_64, &memory);
        let mut chain = ResolutionChain::new(None, None);
        let frames = walker.walk(&regs(0x40_0000, 0x7000), &mut chain);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].to_string(), "  #0: 0x400000");
        assert_eq!(frames[1].to_string(), "  #1: 0x401000");
    }
}
