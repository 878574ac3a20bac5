/* ╔═════════════════════════════════════════════════════════════════════════╗
   ║ Module: vmm                                                             ║
   ╟─────────────────────────────────────────────────────────────────────────╢
   ║ Virtual memory management of a process address space: up to two         ║
   ║ general areas plus the fixed user stack, each backed one frame per      ║
   ║ page before the program runs.                                           ║
   ║                                                                         ║
   ║ VirtualAddressSpace                                                     ║
   ║   - new              create an empty address space                      ║
   ║   - define_area      add a general area (at most two)                   ║
   ║   - define_stack     get the fixed top-of-stack address                 ║
   ║   - prepare_load     back and zero every page                           ║
   ║   - complete_load    record that the program image is loaded            ║
   ║   - from_other       duplicate an address space page by page            ║
   ║   - translate        translate a virtual address to a physical address  ║
   ║   - activate         invalidate the local translation cache             ║
   ║   - deactivate       nothing, the next activate does the invalidation   ║
   ╟─────────────────────────────────────────────────────────────────────────╢
   ║ Author: Fabian Ruhland and Michael Schoettner                           ║
   ║         Univ. Duesseldorf, 09.02.2026                                   ║
   ╚═════════════════════════════════════════════════════════════════════════╝
*/
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::iter;
use log::warn;

use crate::consts::{MAX_USER_AREAS, USER_STACK_BOTTOM, USER_STACK_PAGES, USER_STACK_TOP};
use crate::hal::Cpu;
use crate::memory::address::{Page, PhysAddr, VirtAddr};
use crate::memory::frames::PageFrameAllocator;
use crate::memory::vma::{Permissions, VirtualMemoryArea};
use crate::memory::{MemoryError, PAGE_SIZE};

/// All data related to the virtual address space of a process.
#[derive(Debug)]
pub struct VirtualAddressSpace {
    frames: Arc<PageFrameAllocator>,
    /// General areas in definition order; the first one holds the program
    /// code in practice, but nothing here depends on that.
    areas: Vec<VirtualMemoryArea>,
    stack: VirtualMemoryArea,
    image_loaded: bool,
}

impl VirtualAddressSpace {
    pub fn new(frames: Arc<PageFrameAllocator>) -> Self {
        let stack_start = Page::containing_address(VirtAddr::new(USER_STACK_BOTTOM));
        let stack = VirtualMemoryArea::window(
            stack_start,
            USER_STACK_PAGES,
            Permissions::READ | Permissions::WRITE,
        );

        Self {
            frames,
            areas: Vec::with_capacity(MAX_USER_AREAS),
            stack,
            image_loaded: false,
        }
    }

    /// Add a general area starting at `start` with the given `size` in
    /// bytes. Unaligned definitions are widened to whole pages. The area is
    /// defined but not yet backed by physical memory.
    pub fn define_area(
        &mut self,
        start: VirtAddr,
        size: usize,
        permissions: Permissions,
    ) -> Result<(), MemoryError> {
        if self.areas.len() >= MAX_USER_AREAS {
            warn!("vmm: support for more than {} areas is not available", MAX_USER_AREAS);
            return Err(MemoryError::TooManyAreas);
        }

        self.areas
            .push(VirtualMemoryArea::from_address(start, size, permissions));
        Ok(())
    }

    /// Get the fixed top-of-stack address. Stack size and location are
    /// architecture constants.
    pub fn define_stack(&self) -> VirtAddr {
        VirtAddr::new(USER_STACK_TOP)
    }

    /// Allocate one zeroed frame for every page of both general areas and
    /// the stack. Each page gets its own single-frame allocation; zeroing
    /// happens outside the allocator lock.
    pub fn prepare_load(&mut self) -> Result<(), MemoryError> {
        let frames = Arc::clone(&self.frames);
        for area in self.areas.iter_mut().chain(iter::once(&mut self.stack)) {
            Self::back_area(&frames, area)?;
        }

        Ok(())
    }

    /// Record that the program image has been loaded. From here on, faults
    /// on the first area install read-only mappings.
    pub fn complete_load(&mut self) {
        self.image_loaded = true;
    }

    pub fn image_loaded(&self) -> bool {
        self.image_loaded
    }

    /// Duplicate `other` into a fresh address space: same area layout,
    /// freshly allocated backing, and a copy of every page's bytes. On
    /// allocation failure the partially built space is dropped again,
    /// releasing whatever it already owned.
    pub fn from_other(other: &VirtualAddressSpace) -> Result<Self, MemoryError> {
        let mut space = VirtualAddressSpace::new(Arc::clone(&other.frames));
        for area in &other.areas {
            space.areas.push(VirtualMemoryArea::from_address(
                area.start(),
                area.page_count() * PAGE_SIZE,
                area.permissions(),
            ));
        }
        space.prepare_load()?;
        space.image_loaded = other.image_loaded;

        let ram = space.frames.memory();
        let sources = other.areas.iter().chain(iter::once(&other.stack));
        let targets = space.areas.iter().chain(iter::once(&space.stack));
        for (from, to) in sources.zip(targets) {
            for index in 0..from.page_count() {
                // Pages the source never backed stay zeroed in the copy
                if let (Some(source), Some(target)) = (from.frame_at(index), to.frame_at(index)) {
                    ram.copy_frame(source, target);
                }
            }
        }

        Ok(space)
    }

    /// Translate a virtual address to a physical address.
    pub fn translate(&self, address: VirtAddr) -> Option<PhysAddr> {
        let page = Page::containing_address(address);
        let frame = self
            .areas
            .iter()
            .chain(iter::once(&self.stack))
            .find_map(|area| area.frame_for(page))?;

        Some(frame.start_address() + address.page_offset())
    }

    pub fn areas(&self) -> &[VirtualMemoryArea] {
        &self.areas
    }

    pub fn stack_area(&self) -> &VirtualMemoryArea {
        &self.stack
    }

    /// Invalidate every entry of the local translation cache, forcing fresh
    /// resolution through this address space's tables.
    pub fn activate<C: Cpu>(&self, cpu: &mut C) {
        cpu.without_interrupts(|cpu| cpu.tlb_invalidate_all());
    }

    pub fn deactivate(&self) {
        // nothing, the next activate invalidates the cache
    }

    fn back_area(
        frames: &PageFrameAllocator,
        area: &mut VirtualMemoryArea,
    ) -> Result<(), MemoryError> {
        if area.pages.len() < area.page_count() {
            let page_count = area.page_count();
            area.pages.resize_with(page_count, || None);
        }

        for slot in area.pages.iter_mut() {
            let block = frames.alloc(1).ok_or(MemoryError::OutOfFrames)?;
            frames.memory().zero_frame(block.start());
            *slot = Some(block);
        }

        Ok(())
    }
}

impl Drop for VirtualAddressSpace {
    fn drop(&mut self) {
        // Every frame goes back to the allocator individually; the page-table
        // storage itself is freed when the Vecs drop
        let frames = Arc::clone(&self.frames);
        for area in self.areas.iter_mut().chain(iter::once(&mut self.stack)) {
            for slot in area.pages.iter_mut() {
                if let Some(block) = slot.take() {
                    if let Err(error) = frames.free(block) {
                        warn!("vmm: leaking frames on release ({})", error);
                    }
                }
            }
        }
    }
}
