//! The interpreter: instruction fetch, operand resolution, and execution.
//!
//! The emulator owns the decoded instruction list for the lifetime of one
//! run. Instructions are not refetched from memory, so stores cannot
//! modify the running program.

use tracing::{debug, trace};

use crate::cpu::alu;
use crate::cpu::state::{Cpu, Flags, Reg};
use crate::decode::instruction::{AddressingMode, Instruction, Mnemonic, Operands};
use crate::error::EmulateError;
use crate::memory::{Memory, MEMORY_SIZE};

/// Where an instruction's result lands.
#[derive(Debug, Clone, Copy)]
enum Target {
    /// General-purpose register by 3-bit encoding; the destination width
    /// selects the word or half-register accessor.
    Gp(u8),
    /// Segment register by 2-bit encoding.
    Seg(u8),
    /// Memory address.
    Mem(usize),
}

#[derive(Debug, Clone, Copy)]
struct Dest {
    target: Target,
    word: bool,
}

/// A resolved source value.
///
/// For byte-wide operations `low` already holds the operand byte
/// (half-registers are resolved here, not downstream). A byte-wide source
/// against a word destination is an immediate to be sign-extended.
#[derive(Debug, Clone, Copy)]
struct Source {
    low: u8,
    high: u8,
    word: bool,
}

impl Source {
    fn from_word(value: u16) -> Self {
        let [low, high] = value.to_le_bytes();
        Self {
            low,
            high,
            word: true,
        }
    }
}

/// Executes a decoded program against a fresh CPU and memory.
pub struct Emulator {
    pub cpu: Cpu,
    pub mem: Memory,
    instructions: Vec<Instruction>,
    /// Start byte offset of each instruction, for IP-indexed fetch.
    starts: Vec<u16>,
}

impl Emulator {
    /// Build an emulator around a decoded program. Registers and memory
    /// start zeroed; IP starts at the first instruction.
    pub fn new(instructions: Vec<Instruction>) -> Self {
        let mut starts = Vec::with_capacity(instructions.len());
        let mut offset: u16 = 0;
        for inst in &instructions {
            starts.push(offset);
            offset = offset.wrapping_add(inst.byte_count as u16);
        }
        Self {
            cpu: Cpu::new(),
            mem: Memory::new(),
            instructions,
            starts,
        }
    }

    /// Run until IP no longer lands on an instruction start.
    pub fn run(&mut self) -> Result<(), EmulateError> {
        while self.step()? {}
        debug!(
            ip = self.cpu.read(Reg::Ip),
            flags = %self.cpu.flags(),
            "program halted"
        );
        Ok(())
    }

    /// Execute one instruction. `Ok(false)` means the program has halted.
    pub fn step(&mut self) -> Result<bool, EmulateError> {
        let ip = self.cpu.read(Reg::Ip);
        let Some(inst) = self.fetch(ip) else {
            return Ok(false);
        };
        trace!(ip, mnemonic = %inst.mnemonic, "executing");
        self.execute(&inst)?;
        Ok(true)
    }

    fn fetch(&self, ip: u16) -> Option<Instruction> {
        let idx = self.starts.binary_search(&ip).ok()?;
        Some(self.instructions[idx])
    }

    fn execute(&mut self, inst: &Instruction) -> Result<(), EmulateError> {
        // Taken branches add the signed relative displacement on top of
        // the instruction's own length.
        let mut delta: i32 = 0;
        let rel = inst.data[0] as i8 as i32;

        match inst.mnemonic {
            Mnemonic::Mov => {
                let (dest, src) = self.resolve(inst)?;
                let value = if dest.word {
                    u16::from_le_bytes([src.low, src.high])
                } else {
                    src.low as u16
                };
                self.write_dest(dest, value);
            }
            Mnemonic::Add | Mnemonic::Sub | Mnemonic::Cmp => {
                let (dest, src) = self.resolve(inst)?;
                self.arithmetic(inst.mnemonic, dest, src);
            }

            Mnemonic::Je => {
                if self.cpu.flag(Flags::ZERO) {
                    delta = rel;
                }
            }
            Mnemonic::Jne => {
                if !self.cpu.flag(Flags::ZERO) {
                    delta = rel;
                }
            }
            Mnemonic::Jp => {
                if self.cpu.flag(Flags::PARITY) {
                    delta = rel;
                }
            }
            Mnemonic::Jb => {
                if self.cpu.flag(Flags::CARRY) {
                    delta = rel;
                }
            }
            Mnemonic::Loop => {
                // Decrementing CX must not touch any flag.
                let cx = self.cpu.read(Reg::Cx).wrapping_sub(1);
                self.cpu.write(Reg::Cx, cx);
                if cx != 0 {
                    delta = rel;
                }
            }
            Mnemonic::Loopne => {
                let cx = self.cpu.read(Reg::Cx).wrapping_sub(1);
                self.cpu.write(Reg::Cx, cx);
                if cx != 0 && !self.cpu.flag(Flags::ZERO) {
                    delta = rel;
                }
            }

            other => return Err(EmulateError::UnsupportedAtRuntime(other)),
        }

        let ip = self.cpu.read(Reg::Ip);
        let next_ip = (ip as i32 + inst.byte_count as i32 + delta) as u16;
        self.cpu.write(Reg::Ip, next_ip);
        Ok(())
    }

    /// Map an instruction's operand class onto a destination handle and a
    /// source value. Pure with respect to CPU and memory state.
    fn resolve(&self, inst: &Instruction) -> Result<(Dest, Source), EmulateError> {
        let word = inst.w == 1;
        // An 8-bit immediate with s=1 stays a byte and is sign-extended at
        // the point of use.
        let data_word = inst.s == 0 && inst.w == 1;

        match inst.operands {
            Operands::RegisterImmediate => Ok((
                Dest {
                    target: Target::Gp(inst.rm),
                    word,
                },
                Source {
                    low: inst.data[0],
                    high: inst.data[1],
                    word: data_word,
                },
            )),
            Operands::RegisterRegister => Ok((
                Dest {
                    target: Target::Gp(inst.rm),
                    word,
                },
                self.register_source(inst.reg, word),
            )),
            Operands::Register16SegReg => Ok((
                Dest {
                    target: Target::Seg(inst.reg),
                    word: true,
                },
                Source::from_word(self.cpu.read_reg16(inst.rm)),
            )),
            Operands::SegRegRegister16 => Ok((
                Dest {
                    target: Target::Gp(inst.rm),
                    word: true,
                },
                Source::from_word(self.cpu.read_seg(inst.reg)),
            )),

            Operands::MemoryRegister => {
                let addr = self.effective_address(inst)?;
                Ok((
                    Dest {
                        target: Target::Gp(inst.reg),
                        word,
                    },
                    Source {
                        low: self.mem.read_u8(addr),
                        high: self.mem.read_u8(addr + 1),
                        word: data_word,
                    },
                ))
            }
            Operands::RegisterMemory => {
                let addr = self.effective_address(inst)?;
                Ok((
                    Dest {
                        target: Target::Mem(addr),
                        word,
                    },
                    self.register_source(inst.reg, word),
                ))
            }
            Operands::MemoryImmediate => {
                let addr = self.effective_address(inst)?;
                Ok((
                    Dest {
                        target: Target::Mem(addr),
                        word,
                    },
                    Source {
                        low: inst.data[0],
                        high: inst.data[1],
                        word: data_word,
                    },
                ))
            }

            Operands::AccumulatorImmediate => Ok((
                Dest {
                    target: Target::Gp(0b000),
                    word,
                },
                Source {
                    low: inst.data[0],
                    high: inst.data[1],
                    word,
                },
            )),
            Operands::MemoryAccumulator => {
                let addr = self.absolute_address(inst)?;
                Ok((
                    Dest {
                        target: Target::Gp(0b000),
                        word,
                    },
                    Source {
                        low: self.mem.read_u8(addr),
                        high: self.mem.read_u8(addr + 1),
                        word,
                    },
                ))
            }
            Operands::AccumulatorMemory => {
                let addr = self.absolute_address(inst)?;
                Ok((
                    Dest {
                        target: Target::Mem(addr),
                        word,
                    },
                    self.register_source(0b000, word),
                ))
            }

            Operands::ShortLabel | Operands::SegRegMemory16 | Operands::MemorySegReg
            | Operands::None => Err(EmulateError::UnsupportedOperands(inst.operands)),
        }
    }

    /// A general-purpose register as a source, honoring byte encoding.
    fn register_source(&self, reg: u8, word: bool) -> Source {
        if word {
            Source::from_word(self.cpu.read_reg16(reg))
        } else {
            Source {
                low: self.cpu.read_reg8(reg),
                high: 0,
                word: false,
            }
        }
    }

    fn arithmetic(&mut self, mnemonic: Mnemonic, dest: Dest, src: Source) {
        let flags = if dest.word {
            let lhs = self.read_dest(dest);
            let rhs = if src.word {
                u16::from_le_bytes([src.low, src.high])
            } else {
                src.low as i8 as i16 as u16
            };
            let (value, flags) = match mnemonic {
                Mnemonic::Add => alu::add16(lhs, rhs),
                _ => alu::sub16(lhs, rhs),
            };
            if mnemonic != Mnemonic::Cmp {
                self.write_dest(dest, value);
            }
            flags
        } else {
            let lhs = self.read_dest(dest) as u8;
            let (value, flags) = match mnemonic {
                Mnemonic::Add => alu::add8(lhs, src.low),
                _ => alu::sub8(lhs, src.low),
            };
            if mnemonic != Mnemonic::Cmp {
                self.write_dest(dest, value as u16);
            }
            flags
        };
        self.cpu.set_flags(flags);
    }

    fn read_dest(&self, dest: Dest) -> u16 {
        match (dest.target, dest.word) {
            (Target::Gp(reg), true) => self.cpu.read_reg16(reg),
            (Target::Gp(reg), false) => self.cpu.read_reg8(reg) as u16,
            (Target::Seg(seg), _) => self.cpu.read_seg(seg),
            (Target::Mem(addr), true) => self.mem.read_u16(addr),
            (Target::Mem(addr), false) => self.mem.read_u8(addr) as u16,
        }
    }

    fn write_dest(&mut self, dest: Dest, value: u16) {
        match (dest.target, dest.word) {
            (Target::Gp(reg), true) => self.cpu.write_reg16(reg, value),
            (Target::Gp(reg), false) => self.cpu.write_reg8(reg, value as u8),
            (Target::Seg(seg), _) => self.cpu.write_seg(seg, value),
            (Target::Mem(addr), true) => self.mem.write_u16(addr, value),
            (Target::Mem(addr), false) => self.mem.write_u8(addr, value as u8),
        }
    }

    /// Effective address from the mod/rm fields and displacement.
    ///
    /// Index registers contribute as signed 16-bit values; the direct case
    /// takes the displacement as an unsigned literal.
    fn effective_address(&self, inst: &Instruction) -> Result<usize, EmulateError> {
        let addr: i32 = if inst.is_direct_address() {
            u16::from_le_bytes(inst.disp) as i32
        } else {
            let base = match inst.rm & 0b111 {
                0b000 => self.index(Reg::Bx) + self.index(Reg::Si),
                0b001 => self.index(Reg::Bx) + self.index(Reg::Di),
                0b010 => self.index(Reg::Bp) + self.index(Reg::Si),
                0b011 => self.index(Reg::Bp) + self.index(Reg::Di),
                0b100 => self.index(Reg::Si),
                0b101 => self.index(Reg::Di),
                0b110 => self.index(Reg::Bp),
                _ => self.index(Reg::Bx),
            };
            let disp = match inst.mode {
                Some(AddressingMode::MemoryDisp8) => inst.disp[0] as i8 as i32,
                Some(AddressingMode::MemoryDisp16) => i16::from_le_bytes(inst.disp) as i32,
                _ => 0,
            };
            base + disp
        };
        check_address(addr as i64)
    }

    /// Memory<->accumulator forms address memory absolutely through the
    /// data bytes; no base register and no displacement are involved.
    fn absolute_address(&self, inst: &Instruction) -> Result<usize, EmulateError> {
        check_address(u16::from_le_bytes(inst.data) as i64)
    }

    #[inline(always)]
    fn index(&self, reg: Reg) -> i32 {
        self.cpu.read(reg) as i16 as i32
    }
}

/// A word access at `addr` must fit below the end of memory.
fn check_address(addr: i64) -> Result<usize, EmulateError> {
    if addr < 0 || addr >= (MEMORY_SIZE - 1) as i64 {
        return Err(EmulateError::MemoryOutOfRange(addr));
    }
    Ok(addr as usize)
}
