//! Error types for decoding and emulation.

use thiserror::Error;

use crate::decode::instruction::{Mnemonic, Operands};

/// Errors surfaced while turning a byte stream into instructions.
///
/// The decoder stops at the first failure; everything decoded before it is
/// still valid.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The opcode byte matched none of the known bit patterns.
    #[error("unsupported opcode byte 0x{0:02X}")]
    UnsupportedOpcode(u8),

    /// The shared immediate-to-r/m group carried a reg subfield that names
    /// no supported instruction (only 000=add, 101=sub, 111=cmp exist).
    #[error("immediate group reg subfield 0b{0:03b} names no supported instruction")]
    BadArithmeticSubopcode(u8),

    /// An instruction starting at `offset` needs more bytes than the
    /// stream holds.
    #[error("instruction at byte offset {offset} runs past the end of the stream")]
    Truncated { offset: usize },
}

/// Errors surfaced while executing a decoded program.
///
/// The emulator stops at the first failure, leaving registers, flags and
/// memory in the state reached so far.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EmulateError {
    /// An effective address fell outside the emulated memory.
    #[error("effective address {0} is outside emulated memory")]
    MemoryOutOfRange(i64),

    /// The instruction decodes fine but has no interpreter path.
    #[error("'{0}' is decoded but not simulated")]
    UnsupportedAtRuntime(Mnemonic),

    /// The operand shape has no interpreter path (segment <-> memory moves).
    #[error("{0:?} operands are not simulated")]
    UnsupportedOperands(Operands),
}
