/* ╔═════════════════════════════════════════════════════════════════════════╗
   ║ Module: fault                                                           ║
   ╟─────────────────────────────────────────────────────────────────────────╢
   ║ Page-fault resolution. Every backing frame is established before a      ║
   ║ program runs, so resolving a fault is a single table lookup followed    ║
   ║ by programming the local translation cache.                             ║
   ║   - resolve_page_fault   classify a fault and install the mapping       ║
   ║   - tlb_shootdown        fatal stub, cross-unit invalidation is         ║
   ║                          not supported                                  ║
   ║   - tlb_shootdown_all    fatal stub, see above                          ║
   ╟─────────────────────────────────────────────────────────────────────────╢
   ║ Author: Michael Schoettner, Univ. Duesseldorf, 15.2.2026                ║
   ╚═════════════════════════════════════════════════════════════════════════╝
*/
use core::fmt;
use log::debug;
use num_enum::TryFromPrimitive;

use crate::hal::{Cpu, TlbEntry};
use crate::memory::address::{Page, PhysFrame, VirtAddr};
use crate::memory::vmm::VirtualAddressSpace;

/// Access kind reported by the trap layer. The discriminants match the
/// hardware trap codes; an unknown code fails the conversion and never
/// reaches the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum FaultKind {
    Read = 0,
    Write = 1,
    /// Write through a mapping that was installed read-only.
    ReadOnly = 2,
}

/// Outcomes the trap layer turns into termination of the faulting context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultError {
    /// Write to a read-only mapping; always fatal to the faulting thread.
    ReadOnlyViolation,
    /// No current process or no current address space. Failing here keeps
    /// early-boot faults from looping forever.
    NoAddressSpace,
    /// The address lies outside every known area, or its page was never
    /// backed.
    BadAddress,
}

impl fmt::Display for FaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultError::ReadOnlyViolation => write!(f, "write to a read-only mapping"),
            FaultError::NoAddressSpace => write!(f, "no current address space"),
            FaultError::BadAddress => write!(f, "address outside the address space"),
        }
    }
}

/// A cross-unit invalidation request. Never serviced; see [`tlb_shootdown`].
pub struct TlbShootdown {
    pub page: Page,
}

/// Resolve a page fault at `address` against the current address space and
/// install the mapping into the local translation cache. Never allocates;
/// either the mapping is installed or the fault is fatal to its context.
pub fn resolve_page_fault<C: Cpu>(
    cpu: &mut C,
    space: Option<&VirtualAddressSpace>,
    kind: FaultKind,
    address: VirtAddr,
) -> Result<(), FaultError> {
    debug!("fault: {:?} at 0x{:x}", kind, address.as_usize());

    match kind {
        // A write through a read-only mapping ends the faulting thread
        FaultKind::ReadOnly => return Err(FaultError::ReadOnlyViolation),
        FaultKind::Read | FaultKind::Write => {}
    }

    let space = space.ok_or(FaultError::NoAddressSpace)?;
    let page = Page::containing_address(address);
    let (frame, read_only) = locate(space, page)?;

    let entry = TlbEntry {
        page: page.start_address(),
        frame: frame.start_address(),
        valid: true,
        writable: !read_only,
    };

    cpu.without_interrupts(|cpu| {
        for slot in 0..C::TLB_SLOTS {
            if cpu.tlb_read(slot).valid {
                continue;
            }

            cpu.tlb_write(slot, entry);
            return;
        }

        // Every slot is valid -> let the hardware pick one
        cpu.tlb_write_random(entry);
    });

    debug!(
        "fault: 0x{:x} -> 0x{:x}",
        page.start_address().as_usize(),
        frame.start_address().as_usize()
    );
    Ok(())
}

/// Classify `page` against the two general areas and the stack window and
/// look up its backing frame. Mappings for the first area turn read-only
/// once the program image is loaded; everything else stays writable no
/// matter what permissions were declared.
fn locate(space: &VirtualAddressSpace, page: Page) -> Result<(PhysFrame, bool), FaultError> {
    for (index, area) in space.areas().iter().enumerate() {
        if area.contains(page) {
            let frame = area.frame_for(page).ok_or(FaultError::BadAddress)?;
            return Ok((frame, index == 0 && space.image_loaded()));
        }
    }

    let stack = space.stack_area();
    if stack.contains(page) {
        let frame = stack.frame_for(page).ok_or(FaultError::BadAddress)?;
        return Ok((frame, false));
    }

    Err(FaultError::BadAddress)
}

/// Cross-unit invalidation is not supported: there is one translation cache
/// per activation and caches are never shared across units. Reaching this is
/// a kernel bug.
pub fn tlb_shootdown(_request: &TlbShootdown) -> ! {
    panic!("fault: tried to do a tlb shootdown");
}

pub fn tlb_shootdown_all() -> ! {
    panic!("fault: tried to do a tlb shootdown");
}
