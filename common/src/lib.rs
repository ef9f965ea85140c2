#![no_std]

extern crate alloc;

pub mod frame;
pub mod line;
pub mod physical;
