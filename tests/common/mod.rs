#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use sos_kernel::hal::{Cpu, PhysicalMemory, TlbEntry};
use sos_kernel::memory::address::{PhysAddr, PhysFrame};
use sos_kernel::memory::frames::PageFrameAllocator;
use sos_kernel::memory::PAGE_SIZE;

pub const RAM_BASE: usize = 0x0040_0000;

/// Physical memory for the tests: a plain byte buffer together with the
/// early-boot bump cursor the platform would provide.
pub struct TestRam {
    base: usize,
    inner: Mutex<TestRamInner>,
}

struct TestRamInner {
    cursor: usize,
    bytes: Vec<u8>,
}

impl TestRam {
    pub fn new(base: usize, size: usize) -> Self {
        Self {
            base,
            inner: Mutex::new(TestRamInner {
                cursor: base,
                bytes: vec![0; size],
            }),
        }
    }

    fn offset(&self, address: usize, len: usize, inner: &TestRamInner) -> usize {
        let offset = address - self.base;
        assert!(offset + len <= inner.bytes.len(), "access outside test RAM");
        offset
    }
}

impl PhysicalMemory for TestRam {
    fn extent(&self) -> (PhysAddr, PhysAddr) {
        let inner = self.inner.lock().unwrap();
        (
            PhysAddr::new(inner.cursor),
            PhysAddr::new(self.base + inner.bytes.len()),
        )
    }

    fn steal_frames(&self, frame_count: usize) -> PhysFrame {
        let mut inner = self.inner.lock().unwrap();
        let start = (inner.cursor + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
        inner.cursor = start + frame_count * PAGE_SIZE;
        assert!(
            inner.cursor <= self.base + inner.bytes.len(),
            "early allocation outside test RAM"
        );
        PhysFrame::from_start_address(PhysAddr::new(start)).unwrap()
    }

    fn zero_frame(&self, frame: PhysFrame) {
        let mut inner = self.inner.lock().unwrap();
        let offset = self.offset(frame.start_address().as_usize(), PAGE_SIZE, &inner);
        inner.bytes[offset..offset + PAGE_SIZE].fill(0);
    }

    fn copy_frame(&self, from: PhysFrame, to: PhysFrame) {
        let mut inner = self.inner.lock().unwrap();
        let from_offset = self.offset(from.start_address().as_usize(), PAGE_SIZE, &inner);
        let to_offset = self.offset(to.start_address().as_usize(), PAGE_SIZE, &inner);
        inner
            .bytes
            .copy_within(from_offset..from_offset + PAGE_SIZE, to_offset);
    }

    fn read(&self, from: PhysAddr, into: &mut [u8]) {
        let inner = self.inner.lock().unwrap();
        let offset = self.offset(from.as_usize(), into.len(), &inner);
        into.copy_from_slice(&inner.bytes[offset..offset + into.len()]);
    }

    fn write(&self, to: PhysAddr, bytes: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        let offset = self.offset(to.as_usize(), bytes.len(), &inner);
        inner.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

/// Translation cache and interrupt state of one test CPU. Panics when the
/// cache is touched with interrupts enabled, so every test also checks the
/// critical section.
pub struct TestCpu {
    pub slots: [TlbEntry; 64],
    pub writes: usize,
    pub random_writes: usize,
    pub invalidations: usize,
    masked: bool,
    seed: u64,
}

impl TestCpu {
    pub fn new() -> Self {
        Self {
            slots: [TlbEntry::INVALID; 64],
            writes: 0,
            random_writes: 0,
            invalidations: 0,
            masked: false,
            seed: 0x2545_f491_4f6c_dd1d,
        }
    }
}

impl Cpu for TestCpu {
    const TLB_SLOTS: usize = 64;

    fn tlb_read(&self, slot: usize) -> TlbEntry {
        self.slots[slot]
    }

    fn tlb_write(&mut self, slot: usize, entry: TlbEntry) {
        assert!(self.masked, "TLB written with interrupts enabled");
        self.slots[slot] = entry;
        self.writes += 1;
    }

    fn tlb_write_random(&mut self, entry: TlbEntry) {
        assert!(self.masked, "TLB written with interrupts enabled");
        self.seed = self
            .seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let slot = (self.seed >> 33) as usize % Self::TLB_SLOTS;
        self.slots[slot] = entry;
        self.random_writes += 1;
    }

    fn tlb_invalidate_all(&mut self) {
        assert!(self.masked, "TLB invalidated with interrupts enabled");
        self.slots = [TlbEntry::INVALID; 64];
        self.invalidations += 1;
    }

    fn without_interrupts<R>(&mut self, body: impl FnOnce(&mut Self) -> R) -> R {
        self.masked = true;
        let result = body(self);
        self.masked = false;
        result
    }
}

/// Fresh RAM of `frame_count` frames with a bootstrapped frame allocator.
pub fn boot_allocator(frame_count: usize) -> Arc<PageFrameAllocator> {
    let ram = Arc::new(TestRam::new(RAM_BASE, frame_count * PAGE_SIZE));
    let allocator = Arc::new(PageFrameAllocator::new(ram));
    allocator.bootstrap();
    allocator
}
