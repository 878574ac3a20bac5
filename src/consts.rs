use crate::memory::PAGE_SIZE;

// User stacks grow downwards from this address; the kernel half of the
// address space begins here
pub const USER_STACK_TOP: usize = 0x8000_0000;

// Every user stack is backed by the same fixed number of pages
pub const USER_STACK_PAGES: usize = 12;

// Lowest address belonging to the stack window
pub const USER_STACK_BOTTOM: usize = USER_STACK_TOP - USER_STACK_PAGES * PAGE_SIZE;

// An address space supports two general areas (code and data in practice)
pub const MAX_USER_AREAS: usize = 2;
