#![no_std]

extern crate alloc;

pub mod consts;
pub mod hal;
pub mod memory;
