//! EMU86 - Intel 8086 machine-code decoder, re-assembler, and interpreter
//!
//! Given a flat stream of 16-bit real-mode machine code, this crate can:
//! - decode it into a structured instruction list,
//! - render that list back as NASM-compatible assembly, reconstructing
//!   jump labels from short relative displacements,
//! - execute it against an emulated CPU with a linear 1 MiB memory.
//!
//! ```no_run
//! use emu86::cpu::Emulator;
//! use emu86::decode::DecodingContext;
//! use emu86::encode::render_listing;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bytes = std::fs::read("program.bin")?;
//!
//!     let mut ctx = DecodingContext::default();
//!     ctx.decode(&bytes)?;
//!     print!("{}", render_listing(&ctx));
//!
//!     let mut emu = Emulator::new(ctx.instructions);
//!     emu.run()?;
//!     Ok(())
//! }
//! ```

pub mod cpu;
pub mod decode;
pub mod encode;
pub mod error;
pub mod memory;

pub use cpu::{Cpu, Emulator, Flags, Reg};
pub use decode::DecodingContext;
pub use encode::ImmediateStyle;
pub use error::{DecodeError, EmulateError};
pub use memory::Memory;
