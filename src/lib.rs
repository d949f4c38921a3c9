#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod pac;

pub mod rcc;

pub mod interrupt;
pub mod ucpd;

mod peripheral;
pub use peripheral::*;
pub mod peripherals;
