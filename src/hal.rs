/* ╔═════════════════════════════════════════════════════════════════════════╗
   ║ Module: hal                                                             ║
   ╟─────────────────────────────────────────────────────────────────────────╢
   ║ Interfaces consumed from the platform and the hardware:                 ║
   ║   - PhysicalMemory   boot memory map, early allocations and all         ║
   ║                      physical/kernel-virtual address translation        ║
   ║   - Cpu              per-unit translation cache (TLB) and local         ║
   ║                      interrupt masking                                  ║
   ║ The memory subsystem never turns a physical address into a pointer      ║
   ║ itself; every byte access goes through PhysicalMemory.                  ║
   ╟─────────────────────────────────────────────────────────────────────────╢
   ║ Author: Fabian Ruhland, Univ. Duesseldorf, 27.1.2026                    ║
   ╚═════════════════════════════════════════════════════════════════════════╝
*/
use crate::memory::address::{PhysAddr, PhysFrame, VirtAddr};

/// Access to physical memory, provided by the platform/boot layer.
pub trait PhysicalMemory: Send + Sync {
    /// Return the physical range `[lo, hi)` still available for management.
    fn extent(&self) -> (PhysAddr, PhysAddr);

    /// Bump-allocate `frame_count` frames from the start of the available
    /// range. Only valid before the frame table exists; the stolen frames are
    /// no longer part of the range reported by `extent`.
    fn steal_frames(&self, frame_count: usize) -> PhysFrame;

    /// Fill the given `frame` with zeroes.
    fn zero_frame(&self, frame: PhysFrame);

    /// Copy the contents of frame `from` into frame `to`.
    fn copy_frame(&self, from: PhysFrame, to: PhysFrame);

    /// Read bytes starting at the physical address `from`.
    fn read(&self, from: PhysAddr, into: &mut [u8]);

    /// Write `bytes` starting at the physical address `to`.
    fn write(&self, to: PhysAddr, bytes: &[u8]);
}

/// One entry of the hardware translation cache.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TlbEntry {
    pub page: VirtAddr,
    pub frame: PhysAddr,
    pub valid: bool,
    pub writable: bool,
}

impl TlbEntry {
    pub const INVALID: TlbEntry = TlbEntry {
        page: VirtAddr::zero(),
        frame: PhysAddr::zero(),
        valid: false,
        writable: false,
    };
}

/// The translation cache and interrupt state of the local execution unit.
pub trait Cpu {
    /// Number of slots in the translation cache.
    const TLB_SLOTS: usize;

    fn tlb_read(&self, slot: usize) -> TlbEntry;

    fn tlb_write(&mut self, slot: usize, entry: TlbEntry);

    /// Write `entry` into a slot chosen by the hardware's random-replacement
    /// facility.
    fn tlb_write_random(&mut self, entry: TlbEntry);

    /// Invalidate every slot of the translation cache.
    fn tlb_invalidate_all(&mut self);

    /// Run `body` with interrupts masked on the local unit. This is not a
    /// lock; other units keep running.
    fn without_interrupts<R>(&mut self, body: impl FnOnce(&mut Self) -> R) -> R
    where
        Self: Sized;
}
