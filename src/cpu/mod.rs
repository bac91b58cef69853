//! CPU emulation: the register file, flag derivation, and the interpreter.

pub(crate) mod alu;
pub mod exec;
pub mod state;

pub use exec::Emulator;
pub use state::{Cpu, Flags, Reg};
