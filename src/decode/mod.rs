//! Instruction stream decoding.
//!
//! Decoding is a two-layer table lookup: the first byte classifies into an
//! [`Opcode`], the opcode selects a field layout describing where each
//! logical bit field lives, and a small amount of per-opcode logic maps
//! the extracted fields onto a [`Mnemonic`] and an operand class. Short
//! jumps additionally record their absolute target offsets so the
//! re-assembler can synthesize labels.

pub mod instruction;
pub mod opcode;

pub use instruction::{AddressingMode, Instruction, Mnemonic, Operands};
pub use opcode::Opcode;

use tracing::{debug, trace};

use crate::encode::ImmediateStyle;
use crate::error::DecodeError;
use opcode::{classify, layout, DataWidth, FieldSpec};

/// One reconstructed branch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpLabel {
    /// Absolute byte offset the branch lands on. May point outside the
    /// stream or between instructions; such a label simply never gets a
    /// label line of its own.
    pub byte_offset: i64,
    /// Dense label number, assigned in decode order.
    pub index: usize,
}

/// Accumulated result of decoding one byte stream.
#[derive(Debug, Default)]
pub struct DecodingContext {
    /// Rendering policy for immediates and displacements.
    pub style: ImmediateStyle,
    /// Instructions in stream order.
    pub instructions: Vec<Instruction>,
    /// Branch targets, coalesced by offset.
    pub labels: Vec<JumpLabel>,
}

impl DecodingContext {
    /// A fresh context with an explicit immediate-format policy.
    pub fn with_style(style: ImmediateStyle) -> Self {
        Self {
            style,
            ..Self::default()
        }
    }

    /// Decode `bytes` to exhaustion, appending to this context.
    ///
    /// Stops at the first failure; instructions decoded before it remain
    /// valid.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        let mut at = 0usize;
        while at < bytes.len() {
            let inst = self.decode_one(bytes, at)?;
            trace!(
                offset = at,
                mnemonic = %inst.mnemonic,
                bytes = inst.byte_count,
                "decoded instruction"
            );
            at += inst.byte_count as usize;
            self.instructions.push(inst);
        }
        debug!(
            instructions = self.instructions.len(),
            labels = self.labels.len(),
            "decoded stream"
        );
        Ok(())
    }

    /// Find the label landing on `byte_offset`.
    pub fn label_at(&self, byte_offset: i64) -> Option<&JumpLabel> {
        self.labels.iter().find(|l| l.byte_offset == byte_offset)
    }

    fn decode_one(&mut self, bytes: &[u8], at: usize) -> Result<Instruction, DecodeError> {
        let opcode = classify(bytes[at])?;
        let fl = layout(opcode);

        // All bit fields live within the fixed leading bytes; bound-check
        // once against the widest one.
        let fixed = [fl.d, fl.s, fl.w, fl.mode, fl.reg, fl.rm]
            .iter()
            .filter(|spec| spec.present())
            .map(|spec| spec.byte as usize)
            .max()
            .unwrap_or(0);
        if at + fixed >= bytes.len() {
            return Err(DecodeError::Truncated { offset: at });
        }

        let field = |spec: FieldSpec| (bytes[at + spec.byte as usize] & spec.mask) >> spec.shift;
        let d = if fl.d.present() { field(fl.d) } else { 0 };
        let s = if fl.s.present() { field(fl.s) } else { 0 };
        let w = if fl.w.present() { field(fl.w) } else { 0 };
        let reg = if fl.reg.present() { field(fl.reg) } else { 0 };
        let rm = if fl.rm.present() { field(fl.rm) } else { 0 };
        let mode = if fl.mode.present() {
            Some(match field(fl.mode) {
                0b00 => AddressingMode::MemoryNoDisp,
                0b01 => AddressingMode::MemoryDisp8,
                0b10 => AddressingMode::MemoryDisp16,
                _ => AddressingMode::RegisterDirect,
            })
        } else {
            None
        };

        let is_direct = mode == Some(AddressingMode::MemoryNoDisp) && rm == 0b110;
        let is_reg_direct = mode == Some(AddressingMode::RegisterDirect);
        let is_memory = mode.is_some() && !is_reg_direct;

        // Index of the last byte consumed so far; displacement and data
        // bytes extend it.
        let mut cursor = at + fixed;

        let mut disp = [0u8; 2];
        if fl.has_disp {
            if mode == Some(AddressingMode::MemoryDisp8) {
                disp[0] = take(bytes, cursor + 1, at)?;
                cursor += 1;
            } else if mode == Some(AddressingMode::MemoryDisp16) || is_direct {
                disp[0] = take(bytes, cursor + 1, at)?;
                disp[1] = take(bytes, cursor + 2, at)?;
                cursor += 2;
            }
        }

        let mut data = [0u8; 2];
        if fl.has_data {
            let data_is_word = match fl.data_width {
                DataWidth::Byte => false,
                DataWidth::Word => true,
                DataWidth::FromFlags => s == 0 && w == 1,
            };
            data[0] = take(bytes, cursor + 1, at)?;
            cursor += 1;
            if data_is_word {
                data[1] = take(bytes, cursor + 1, at)?;
                cursor += 1;
            }
        }

        let byte_count = (cursor - at + 1) as u8;

        let rm_class = |d: u8| {
            if is_reg_direct {
                Operands::RegisterRegister
            } else if d == 1 {
                Operands::MemoryRegister
            } else {
                Operands::RegisterMemory
            }
        };
        let imm_class = || {
            if is_memory {
                Operands::MemoryImmediate
            } else {
                Operands::RegisterImmediate
            }
        };

        let mut rm = rm;
        let (mnemonic, operands) = match opcode {
            Opcode::MovImmToReg => {
                // The register lives in the reg field here; the rest of
                // the pipeline names register-immediate targets by rm.
                rm = reg;
                (Mnemonic::Mov, Operands::RegisterImmediate)
            }
            Opcode::MovRegOrMemToOrFromReg => (Mnemonic::Mov, rm_class(d)),
            Opcode::MovMemToAcc => (Mnemonic::Mov, Operands::MemoryAccumulator),
            Opcode::MovAccToMem => (Mnemonic::Mov, Operands::AccumulatorMemory),
            Opcode::MovImmToRegOrMem => (Mnemonic::Mov, imm_class()),
            Opcode::MovRegOrMemToSegReg => {
                let class = if is_reg_direct {
                    Operands::Register16SegReg
                } else {
                    Operands::MemorySegReg
                };
                (Mnemonic::Mov, class)
            }
            Opcode::MovSegRegToRegOrMem => {
                let class = if is_reg_direct {
                    Operands::SegRegRegister16
                } else {
                    Operands::SegRegMemory16
                };
                (Mnemonic::Mov, class)
            }

            // The shared group deduces the instruction from the reg field.
            Opcode::ImmToRegOrMem => match reg {
                0b000 => (Mnemonic::Add, imm_class()),
                0b101 => (Mnemonic::Sub, imm_class()),
                0b111 => (Mnemonic::Cmp, imm_class()),
                other => return Err(DecodeError::BadArithmeticSubopcode(other)),
            },

            Opcode::AddRegOrMemWithReg => (Mnemonic::Add, rm_class(d)),
            Opcode::AddImmToAcc => (Mnemonic::Add, Operands::AccumulatorImmediate),
            Opcode::SubRegOrMemWithReg => (Mnemonic::Sub, rm_class(d)),
            Opcode::SubImmFromAcc => (Mnemonic::Sub, Operands::AccumulatorImmediate),
            Opcode::CmpRegOrMemWithReg => (Mnemonic::Cmp, rm_class(d)),
            Opcode::CmpImmWithAcc => (Mnemonic::Cmp, Operands::AccumulatorImmediate),

            Opcode::Je => (Mnemonic::Je, Operands::ShortLabel),
            Opcode::Jl => (Mnemonic::Jl, Operands::ShortLabel),
            Opcode::Jle => (Mnemonic::Jle, Operands::ShortLabel),
            Opcode::Jb => (Mnemonic::Jb, Operands::ShortLabel),
            Opcode::Jbe => (Mnemonic::Jbe, Operands::ShortLabel),
            Opcode::Jp => (Mnemonic::Jp, Operands::ShortLabel),
            Opcode::Jo => (Mnemonic::Jo, Operands::ShortLabel),
            Opcode::Js => (Mnemonic::Js, Operands::ShortLabel),
            Opcode::Jne => (Mnemonic::Jne, Operands::ShortLabel),
            Opcode::Jnl => (Mnemonic::Jnl, Operands::ShortLabel),
            Opcode::Jnle => (Mnemonic::Jnle, Operands::ShortLabel),
            Opcode::Jnb => (Mnemonic::Jnb, Operands::ShortLabel),
            Opcode::Jnbe => (Mnemonic::Jnbe, Operands::ShortLabel),
            Opcode::Jnp => (Mnemonic::Jnp, Operands::ShortLabel),
            Opcode::Jno => (Mnemonic::Jno, Operands::ShortLabel),
            Opcode::Jns => (Mnemonic::Jns, Operands::ShortLabel),
            Opcode::Loop => (Mnemonic::Loop, Operands::ShortLabel),
            Opcode::Loope => (Mnemonic::Loope, Operands::ShortLabel),
            Opcode::Loopne => (Mnemonic::Loopne, Operands::ShortLabel),
            Opcode::Jcxz => (Mnemonic::Jcxz, Operands::ShortLabel),
        };

        let inst = Instruction {
            opcode,
            d,
            s,
            w,
            mode,
            reg,
            rm,
            disp,
            data,
            mnemonic,
            byte_count,
            operands,
        };

        if operands == Operands::ShortLabel {
            self.record_label(at, &inst);
        }

        Ok(inst)
    }

    /// Remember the target of a short jump, coalescing by byte offset.
    fn record_label(&mut self, at: usize, inst: &Instruction) {
        let target = at as i64 + inst.byte_count as i64 + (inst.data[0] as i8) as i64;
        if self.label_at(target).is_none() {
            let index = self.labels.len();
            self.labels.push(JumpLabel {
                byte_offset: target,
                index,
            });
        }
    }
}

fn take(bytes: &[u8], idx: usize, at: usize) -> Result<u8, DecodeError> {
    bytes
        .get(idx)
        .copied()
        .ok_or(DecodeError::Truncated { offset: at })
}
