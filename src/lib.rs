//! Cycle-accurate Zilog Z80 CPU core.
//!
//! Owns the register file and the pipeline that sequences a decoded
//! instruction's machine states one T-state per [`cpu::Z80::clock`] call.
//! Memory and I/O are not owned: every `clock()` call borrows a [`bus::Bus`]
//! and [`bus::IoBus`] implementation from the embedding application.

mod alu;
mod bus;
mod cpu;
mod error;
mod flags;
mod interrupt;
mod microcode;
mod registers;

pub use bus::{AckBytes, Bus, IoBus, SimpleBus};
pub use cpu::Z80;
pub use error::{DecodeKey, Z80Error};
pub use flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
pub use registers::{Registers, ResetState};

#[cfg(feature = "test-utils")]
pub use microcode::MicroOp;
