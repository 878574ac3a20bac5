/* ╔═════════════════════════════════════════════════════════════════════════╗
   ║ Module: frames                                                          ║
   ╟─────────────────────────────────────────────────────────────────────────╢
   ║ Page frame allocator backed by a boot-time frame table.                 ║
   ║   - bootstrap      build the frame table from the boot memory map       ║
   ║   - alloc          alloc a run of contiguous frames                     ║
   ║   - free           return a previously allocated run                    ║
   ║   - free_frames    number of frames currently available                 ║
   ║   - total_frames   number of frames managed by the table                ║
   ║   - phys_limit     highest physical address managed by the table        ║
   ║   - dump           get a dump of the available frame runs               ║
   ╟─────────────────────────────────────────────────────────────────────────╢
   ║ Author: Fabian Ruhland, Univ. Duesseldorf, 27.1.2026                    ║
   ╚═════════════════════════════════════════════════════════════════════════╝
*/
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::{Debug, Formatter};
use core::mem;
use log::{info, warn};
use spin::Mutex;

use crate::hal::PhysicalMemory;
use crate::memory::address::{PhysAddr, PhysFrame};
use crate::memory::{MemoryError, PAGE_SIZE};

/// Entry in the frame table.
/// Describes the availability of exactly one physical frame; the run length
/// is only set on the first frame of an allocation.
pub struct FrameTableEntry {
    base: PhysAddr,
    available: bool,
    run_length: usize,
}

/// Handle for a run of contiguous frames returned by [`PageFrameAllocator::alloc`].
/// Releasing a run means handing the block back to [`PageFrameAllocator::free`];
/// the handle cannot be cloned, so a run cannot be freed twice.
#[must_use]
pub struct FrameBlock {
    start: PhysFrame,
    frame_count: usize,
}

impl FrameBlock {
    /// First frame of the run.
    pub fn start(&self) -> PhysFrame {
        self.start
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }
}

impl Debug for FrameBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "FrameBlock: [0x{:x}], Frame count: [{}]",
            self.start.start_address().as_usize(),
            self.frame_count
        )
    }
}

struct FrameTable {
    bootstrapped: bool,
    base: PhysAddr,
    first_usable: usize,
    entries: Vec<FrameTableEntry>,
}

impl FrameTable {
    const fn empty() -> Self {
        Self {
            bootstrapped: false,
            base: PhysAddr::zero(),
            first_usable: 0,
            entries: Vec::new(),
        }
    }

    /// Table index of the entry describing `frame`, or None if the frame
    /// lies outside the managed range.
    fn index_of(&self, frame: PhysFrame) -> Option<usize> {
        if !self.bootstrapped {
            return None;
        }

        let address = frame.start_address().as_usize();
        if address < self.base.as_usize() {
            return None;
        }

        let index = (address - self.base.as_usize()) / PAGE_SIZE;
        if index >= self.entries.len() {
            return None;
        }

        Some(index)
    }

    /// First-fit scan for a run of `frame_count` available frames, starting
    /// at the first frame past the table's own reservation. When the probe
    /// meets an unavailable frame mid-run, the scan resumes just past it.
    fn find_first_fit(&self, frame_count: usize) -> Option<usize> {
        let mut index = self.first_usable;
        while index + frame_count <= self.entries.len() {
            match (0..frame_count).find(|offset| !self.entries[index + offset].available) {
                Some(offset) => index = index + offset + 1,
                None => return Some(index),
            }
        }

        None
    }
}

/// Allocator over all physical frames, built once at boot and passed by
/// handle to every owner of physical memory.
pub struct PageFrameAllocator {
    ram: Arc<dyn PhysicalMemory>,
    table: Mutex<FrameTable>,
}

impl PageFrameAllocator {
    pub fn new(ram: Arc<dyn PhysicalMemory>) -> Self {
        Self {
            ram,
            table: Mutex::new(FrameTable::empty()),
        }
    }

    /// The platform memory behind this allocator. All physical byte access
    /// (zeroing, copying, loading) goes through this handle.
    pub fn memory(&self) -> &Arc<dyn PhysicalMemory> {
        &self.ram
    }

    /// Build the frame table from the boot memory map. The table describes
    /// every frame of the available range including the frames its own
    /// storage occupies, which are reserved up front and never handed out.
    /// Must run exactly once.
    pub fn bootstrap(&self) {
        let mut table = self.table.lock();
        assert!(!table.bootstrapped, "frames: bootstrap may only run once");

        let (lo, hi) = self.ram.extent();
        let base = lo.align_up(PAGE_SIZE);
        let frame_count = (hi.as_usize() - base.as_usize()) / PAGE_SIZE;

        let table_bytes = frame_count * mem::size_of::<FrameTableEntry>();
        let first_usable = (base + table_bytes).align_up(PAGE_SIZE).as_usize() / PAGE_SIZE
            - base.as_usize() / PAGE_SIZE;

        let mut entries = Vec::with_capacity(frame_count);
        for index in 0..frame_count {
            entries.push(FrameTableEntry {
                base: base + index * PAGE_SIZE,
                available: index >= first_usable,
                run_length: 0,
            });
        }

        *table = FrameTable {
            bootstrapped: true,
            base,
            first_usable,
            entries,
        };

        info!(
            "frames: managing [0x{:x} - 0x{:x}], {} frames ({} reserved for the frame table)",
            base.as_usize(),
            base.as_usize() + frame_count * PAGE_SIZE,
            frame_count,
            first_usable
        );
    }

    /// Allocate `frame_count` contiguous frames.
    /// Before the frame table exists, allocations are taken from the
    /// platform's early boot allocator instead. Returns None when no run of
    /// the requested length is available; nothing is marked in that case.
    pub fn alloc(&self, frame_count: usize) -> Option<FrameBlock> {
        assert!(frame_count > 0, "frames: empty allocation");

        let mut table = self.table.lock();
        if !table.bootstrapped {
            // The frame table does not exist yet -> hand out boot memory directly
            let start = self.ram.steal_frames(frame_count);
            return Some(FrameBlock { start, frame_count });
        }

        match table.find_first_fit(frame_count) {
            Some(index) => {
                for entry in &mut table.entries[index..index + frame_count] {
                    entry.available = false;
                }
                table.entries[index].run_length = frame_count;

                let start = PhysFrame::containing_address(table.entries[index].base);
                Some(FrameBlock { start, frame_count })
            }
            None => {
                warn!("frames: no run of {} available frames", frame_count);
                None
            }
        }
    }

    /// Return a run of frames to the table.
    /// Runs handed out by the early boot allocator have no table entry and
    /// are reported as unmanaged instead of being dropped silently.
    pub fn free(&self, block: FrameBlock) -> Result<(), MemoryError> {
        let mut table = self.table.lock();
        let index = match table.index_of(block.start) {
            Some(index) => index,
            None => return Err(MemoryError::UnmanagedFrames),
        };

        let run_length = table.entries[index].run_length;
        if run_length == 0 {
            return Err(MemoryError::NotAllocated);
        }

        for entry in &mut table.entries[index..index + run_length] {
            entry.available = true;
        }
        table.entries[index].run_length = 0;

        Ok(())
    }

    /// Number of frames currently available for allocation.
    pub fn free_frames(&self) -> usize {
        let table = self.table.lock();
        table.entries.iter().filter(|entry| entry.available).count()
    }

    /// Number of frames managed by the table.
    pub fn total_frames(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Get the highest physical address managed by the table.
    pub fn phys_limit(&self) -> PhysAddr {
        let table = self.table.lock();
        table.base + table.entries.len() * PAGE_SIZE
    }

    /// Get a dump of the available frame runs.
    pub fn dump(&self) -> String {
        format!("{:?}", self)
    }
}

impl Debug for PageFrameAllocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let table = self.table.lock();
        let mut available: usize = 0;

        let mut index = 0;
        while index < table.entries.len() {
            if !table.entries[index].available {
                index += 1;
                continue;
            }

            let start = index;
            while index < table.entries.len() && table.entries[index].available {
                index += 1;
            }

            writeln!(
                f,
                "Block: [0x{:x} - 0x{:x}], Frame count: [{}]",
                table.entries[start].base.as_usize(),
                table.entries[start].base.as_usize() + (index - start) * PAGE_SIZE,
                index - start
            )?;
            available += index - start;
        }

        writeln!(f, "Available memory: [{} KiB]", available * PAGE_SIZE / 1024)?;
        write!(
            f,
            "Physical limit: [0x{:0>16x}]",
            table.base.as_usize() + table.entries.len() * PAGE_SIZE
        )
    }
}
