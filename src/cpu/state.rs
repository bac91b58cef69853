//! CPU state and register management.
//!
//! All sixteen-bit storage is canonical: the 8-bit registers AL..BH are
//! halves of AX/CX/DX/BX and are only reached through the byte accessors,
//! never modeled as separate cells.

use std::fmt;

use bitflags::bitflags;

/// The fourteen architectural registers, in canonical order.
///
/// The first eight follow the w=1 register encoding, the next four the
/// segment-register encoding, then the instruction pointer and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    Ax,
    Cx,
    Dx,
    Bx,
    Sp,
    Bp,
    Si,
    Di,
    Es,
    Cs,
    Ss,
    Ds,
    Ip,
    Flags,
}

impl Reg {
    /// Number of architectural registers.
    pub const COUNT: usize = 14;

    /// General-purpose register named by a 3-bit w=1 encoding.
    #[inline(always)]
    pub fn gp(index: u8) -> Reg {
        match index & 0b111 {
            0b000 => Reg::Ax,
            0b001 => Reg::Cx,
            0b010 => Reg::Dx,
            0b011 => Reg::Bx,
            0b100 => Reg::Sp,
            0b101 => Reg::Bp,
            0b110 => Reg::Si,
            _ => Reg::Di,
        }
    }

    /// Segment register named by a 2-bit encoding.
    #[inline(always)]
    pub fn seg(index: u8) -> Reg {
        match index & 0b11 {
            0b00 => Reg::Es,
            0b01 => Reg::Cs,
            0b10 => Reg::Ss,
            _ => Reg::Ds,
        }
    }
}

bitflags! {
    /// The six condition bits of FLAGS. Every other bit stays zero.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u16 {
        /// Carry out of (borrow into) the most significant bit.
        const CARRY = 0x0001;
        /// Even number of set bits in the result's low byte.
        const PARITY = 0x0004;
        /// Carry out of (borrow into) bit 3.
        const AUX_CARRY = 0x0010;
        /// Result was zero.
        const ZERO = 0x0040;
        /// Result's top bit was set.
        const SIGN = 0x0080;
        /// Signed overflow.
        const OVERFLOW = 0x0800;
    }
}

impl fmt::Display for Flags {
    /// Compact letter form, e.g. `PZ` for parity+zero.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (bit, letter) in [
            (Flags::CARRY, 'C'),
            (Flags::PARITY, 'P'),
            (Flags::AUX_CARRY, 'A'),
            (Flags::ZERO, 'Z'),
            (Flags::SIGN, 'S'),
            (Flags::OVERFLOW, 'O'),
        ] {
            if self.contains(bit) {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

/// The emulated CPU register file.
pub struct Cpu {
    regs: [u16; Reg::COUNT],
}

impl Cpu {
    /// All registers zeroed, IP at the start of the program.
    pub fn new() -> Self {
        Self {
            regs: [0; Reg::COUNT],
        }
    }

    /// Read a register.
    #[inline(always)]
    pub fn read(&self, reg: Reg) -> u16 {
        self.regs[reg as usize]
    }

    /// Write a register.
    #[inline(always)]
    pub fn write(&mut self, reg: Reg, value: u16) {
        self.regs[reg as usize] = value;
    }

    // === Encoded register access ===

    /// Read a 16-bit register by its 3-bit encoding
    /// (0=AX 1=CX 2=DX 3=BX 4=SP 5=BP 6=SI 7=DI).
    #[inline(always)]
    pub fn read_reg16(&self, reg: u8) -> u16 {
        self.read(Reg::gp(reg))
    }

    /// Write a 16-bit register by its 3-bit encoding.
    #[inline(always)]
    pub fn write_reg16(&mut self, reg: u8, value: u16) {
        self.write(Reg::gp(reg), value);
    }

    /// Read an 8-bit register by its 3-bit encoding
    /// (0=AL 1=CL 2=DL 3=BL 4=AH 5=CH 6=DH 7=BH).
    #[inline(always)]
    pub fn read_reg8(&self, reg: u8) -> u8 {
        let word = self.read(Reg::gp(reg & 0b11));
        if reg & 0b100 == 0 {
            word as u8
        } else {
            (word >> 8) as u8
        }
    }

    /// Write an 8-bit register by its 3-bit encoding.
    #[inline(always)]
    pub fn write_reg8(&mut self, reg: u8, value: u8) {
        let target = Reg::gp(reg & 0b11);
        let word = self.read(target);
        let next = if reg & 0b100 == 0 {
            (word & 0xFF00) | value as u16
        } else {
            (word & 0x00FF) | ((value as u16) << 8)
        };
        self.write(target, next);
    }

    /// Read a segment register by its 2-bit encoding (0=ES 1=CS 2=SS 3=DS).
    #[inline(always)]
    pub fn read_seg(&self, seg: u8) -> u16 {
        self.read(Reg::seg(seg))
    }

    /// Write a segment register by its 2-bit encoding.
    #[inline(always)]
    pub fn write_seg(&mut self, seg: u8, value: u16) {
        self.write(Reg::seg(seg), value);
    }

    // === Flags ===

    /// Current flag bits.
    #[inline(always)]
    pub fn flags(&self) -> Flags {
        Flags::from_bits_truncate(self.read(Reg::Flags))
    }

    /// Replace the flag bits.
    #[inline(always)]
    pub fn set_flags(&mut self, flags: Flags) {
        self.write(Reg::Flags, flags.bits());
    }

    /// Check one flag.
    #[inline(always)]
    pub fn flag(&self, flag: Flags) -> bool {
        self.flags().contains(flag)
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
