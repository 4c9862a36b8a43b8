//! Error taxonomy surfaced by the register file and the opcode decoder.

use core::fmt;

/// A decode key: either a bare opcode or a prefixed one.
///
/// Mirrors the opcode table's key shape (§4.4): unprefixed bytes decode on
/// their own, CB/DD/ED/FD bytes decode as a pair, DD-CB/FD-CB as a triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeKey {
    Byte(u8),
    Prefixed(u8, u8),
    DoublePrefixed(u8, u8, u8),
}

impl fmt::Display for DecodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte(b) => write!(f, "{b:#04X}"),
            Self::Prefixed(p, b) => write!(f, "{p:#04X} {b:#04X}"),
            Self::DoublePrefixed(p1, p2, b) => write!(f, "{p1:#04X} {p2:#04X} {b:#04X}"),
        }
    }
}

/// Errors the core can surface. Nothing is retried internally (§7); every
/// failure is returned synchronously from the `clock()` call that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Z80Error {
    /// Decode entry missing for this key.
    UnrecognisedInstruction { key: DecodeKey },
    /// Pipeline emptied with no fetch or interrupt-acknowledge to inject.
    CpuStalled,
    /// Reading or writing a register name that does not exist.
    InvalidRegisterAccess { name: &'static str },
    /// Writing a value wider than the target register.
    OutOfRangeValue { name: &'static str, value: u32, width: u32 },
}

impl fmt::Display for Z80Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognisedInstruction { key } => {
                write!(f, "unrecognised instruction at decode key {key}")
            }
            Self::CpuStalled => write!(f, "CPU stalled: pipeline empty with no next state"),
            Self::InvalidRegisterAccess { name } => write!(f, "no such register: {name}"),
            Self::OutOfRangeValue { name, value, width } => write!(
                f,
                "value {value:#X} does not fit in {width}-bit register {name}"
            ),
        }
    }
}

impl std::error::Error for Z80Error {}
