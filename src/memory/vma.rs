/* ╔═════════════════════════════════════════════════════════════════════════╗
   ║ Module: vma                                                             ║
   ╟─────────────────────────────────────────────────────────────────────────╢
   ║ A virtual memory area: one contiguous range of pages within an address  ║
   ║ space, together with the flat page table backing it.                    ║
   ╟─────────────────────────────────────────────────────────────────────────╢
   ║ Author: Fabian Ruhland and Michael Schoettner                           ║
   ║         Univ. Duesseldorf, 09.02.2026                                   ║
   ╚═════════════════════════════════════════════════════════════════════════╝
*/
use alloc::vec::Vec;
use bitflags::bitflags;
use core::fmt;

use crate::memory::address::{Page, PhysFrame, VirtAddr};
use crate::memory::frames::FrameBlock;
use crate::memory::PAGE_SIZE;

bitflags! {
    /// Access permissions declared when an area is defined. They are recorded
    /// as given; enforcement is limited to the fault resolver's read-only
    /// handling of loaded code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u8 {
        const READ = 1;
        const WRITE = 2;
        const EXECUTE = 4;
    }
}

pub struct VirtualMemoryArea {
    start: Page,
    page_count: usize,
    permissions: Permissions,
    /// Flat page table: one slot per page, filled during load preparation
    /// and stable afterwards.
    pub(crate) pages: Vec<Option<FrameBlock>>,
}

impl VirtualMemoryArea {
    /// Create a new VirtualMemoryArea from a virtual `start` address and
    /// `size` in bytes. The base is aligned down and the size widened over
    /// the cut-off head, then rounded up to page granularity. The page table
    /// is sized to the page count but left unbacked.
    pub fn from_address(start: VirtAddr, size: usize, permissions: Permissions) -> Self {
        let size = size + start.page_offset();
        let start = Page::containing_address(start);

        let mut page_count = size / PAGE_SIZE;
        if size % PAGE_SIZE != 0 {
            page_count += 1;
        }

        let mut pages = Vec::new();
        pages.resize_with(page_count, || None);

        Self {
            start,
            page_count,
            permissions,
            pages,
        }
    }

    /// Describe a fixed window of `page_count` pages starting at `start`
    /// without allocating page-table storage yet.
    pub(crate) fn window(start: Page, page_count: usize, permissions: Permissions) -> Self {
        Self {
            start,
            page_count,
            permissions,
            pages: Vec::new(),
        }
    }

    pub fn start(&self) -> VirtAddr {
        self.start.start_address()
    }

    pub fn end(&self) -> VirtAddr {
        self.start.start_address() + self.page_count * PAGE_SIZE
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn contains(&self, page: Page) -> bool {
        page.start_address() >= self.start() && page.start_address() < self.end()
    }

    /// Backing frame of the page at the given table `index`, if populated.
    pub fn frame_at(&self, index: usize) -> Option<PhysFrame> {
        self.pages.get(index)?.as_ref().map(|block| block.start())
    }

    /// Backing frame of `page`, if the page belongs to this area and has
    /// been populated.
    pub fn frame_for(&self, page: Page) -> Option<PhysFrame> {
        if !self.contains(page) {
            return None;
        }

        let index = (page.start_address().as_usize() - self.start().as_usize()) / PAGE_SIZE;
        self.frame_at(index)
    }
}

impl fmt::Debug for VirtualMemoryArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VMA [0x{:x}; 0x{:x}], #pages: {}, permissions: {:?}",
            self.start().as_usize(),
            self.end().as_usize(),
            self.page_count,
            self.permissions
        )
    }
}
