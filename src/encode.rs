//! NASM-compatible listing output.
//!
//! The listing opens with `bits 16`, then prints one instruction per line
//! with reconstructed `label_<n>:` lines inserted before their target
//! instructions. A final pass past the last instruction emits any label
//! that lands on the byte just after the program.

use std::fmt::Write;

use crate::decode::{DecodingContext, Instruction, Operands};

/// How immediates and displacements are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImmediateStyle {
    /// Same rendering as `Signed`.
    #[default]
    Default,
    /// Signed decimal; 8-bit if the high byte is zero, 16-bit otherwise.
    Signed,
    /// Unsigned decimal 0..65535.
    Unsigned,
    /// `0x` plus exactly four uppercase hex digits.
    Hex,
}

//                                      000      001      010      011      100   101   110   111
const REG8: [&str; 8] = ["al", "cl", "dl", "bl", "ah", "ch", "dh", "bh"]; // w = 0
const REG16: [&str; 8] = ["ax", "cx", "dx", "bx", "sp", "bp", "si", "di"]; // w = 1
const EA_BASE: [&str; 8] = [
    "bx + si", "bx + di", "bp + si", "bp + di", "si", "di", "bp", "bx",
];
const SEGREG: [&str; 4] = ["es", "cs", "ss", "ds"];

/// Render the whole decoded program as NASM source.
pub fn render_listing(ctx: &DecodingContext) -> String {
    let mut out = String::from("bits 16\n\n");
    let mut byte_idx: i64 = 0;

    // One extra iteration past the end prints a label that targets the
    // byte just after the last instruction.
    for i in 0..=ctx.instructions.len() {
        if let Some(label) = ctx.label_at(byte_idx) {
            let _ = write!(out, "label_{}:", label.index);
            if i != ctx.instructions.len() {
                out.push('\n');
            }
        }
        let Some(inst) = ctx.instructions.get(i) else {
            break;
        };
        byte_idx += inst.byte_count as i64;
        push_instruction(&mut out, ctx, inst, byte_idx);
        out.push('\n');
    }

    out
}

/// Append one instruction. `end_offset` is the byte offset just past it,
/// which is what short-jump displacements are relative to.
fn push_instruction(out: &mut String, ctx: &DecodingContext, inst: &Instruction, end_offset: i64) {
    if inst.operands == Operands::ShortLabel {
        out.push_str(inst.mnemonic.text());
        out.push(' ');
        let target = end_offset + (inst.data[0] as i8) as i64;
        match ctx.label_at(target) {
            Some(label) => {
                let _ = write!(out, "label_{}", label.index);
            }
            None => out.push_str("(failed to decode label)"),
        }
        return;
    }
    push_basic(out, inst, ctx.style);
}

fn push_basic(out: &mut String, inst: &Instruction, style: ImmediateStyle) {
    out.push_str(inst.mnemonic.text());
    out.push(' ');

    let word = inst.w == 1;
    match inst.operands {
        Operands::MemoryAccumulator | Operands::AccumulatorMemory => {
            // The absolute address lives in the data bytes; d picks which
            // side is the destination.
            if inst.d == 1 {
                push_direct_address(out, style, inst.data);
                out.push_str(", ");
                push_reg(out, 0b000, word, false);
            } else {
                push_reg(out, 0b000, word, false);
                out.push_str(", ");
                push_direct_address(out, style, inst.data);
            }
        }
        Operands::AccumulatorImmediate => {
            push_reg(out, 0b000, word, false);
            out.push_str(", ");
            push_imm(out, style, false, inst.data[0], inst.data[1]);
        }

        Operands::MemoryImmediate => {
            out.push_str(if word { "word " } else { "byte " });
            push_rm(out, style, inst);
            out.push_str(", ");
            push_imm(out, style, false, inst.data[0], inst.data[1]);
        }
        Operands::MemoryRegister => {
            push_reg(out, inst.reg, word, false);
            out.push_str(", ");
            push_rm(out, style, inst);
        }

        Operands::RegisterRegister => {
            push_reg(out, inst.rm, word, false);
            out.push_str(", ");
            push_reg(out, inst.reg, word, false);
        }
        Operands::RegisterMemory => {
            push_rm(out, style, inst);
            out.push_str(", ");
            push_reg(out, inst.reg, word, false);
        }
        Operands::RegisterImmediate => {
            push_reg(out, inst.rm, word, false);
            out.push_str(", ");
            push_imm(out, style, false, inst.data[0], inst.data[1]);
        }

        Operands::SegRegRegister16 => {
            push_reg(out, inst.rm, true, false);
            out.push_str(", ");
            push_reg(out, inst.reg, true, true);
        }
        Operands::Register16SegReg => {
            push_reg(out, inst.reg, true, true);
            out.push_str(", ");
            push_reg(out, inst.rm, true, false);
        }
        Operands::SegRegMemory16 => {
            push_rm(out, style, inst);
            out.push_str(", ");
            push_reg(out, inst.reg, true, true);
        }
        Operands::MemorySegReg => {
            push_reg(out, inst.reg, true, true);
            out.push_str(", ");
            push_rm(out, style, inst);
        }

        Operands::ShortLabel | Operands::None => out.push_str("(encoding failed)"),
    }
}

fn push_reg(out: &mut String, reg: u8, word: bool, segment: bool) {
    if segment {
        out.push_str(SEGREG[(reg & 0b11) as usize]);
    } else if word {
        out.push_str(REG16[(reg & 0b111) as usize]);
    } else {
        out.push_str(REG8[(reg & 0b111) as usize]);
    }
}

/// The r/m operand: a direct address, an effective-address expression, or
/// a plain register.
fn push_rm(out: &mut String, style: ImmediateStyle, inst: &Instruction) {
    if inst.is_direct_address() {
        push_direct_address(out, style, inst.disp);
    } else if inst.is_memory_mode() {
        out.push('[');
        out.push_str(EA_BASE[(inst.rm & 0b111) as usize]);
        if inst.disp[0] != 0 || inst.disp[1] != 0 {
            out.push(' ');
            push_imm(out, style, true, inst.disp[0], inst.disp[1]);
        }
        out.push(']');
    } else {
        push_reg(out, inst.rm, inst.w == 1, false);
    }
}

fn push_direct_address(out: &mut String, style: ImmediateStyle, bytes: [u8; 2]) {
    out.push('[');
    push_imm(out, style, false, bytes[0], bytes[1]);
    out.push(']');
}

/// Append an immediate or displacement under the selected style.
///
/// `explicit_sign` is set for displacements inside an effective address,
/// where the sign is spelled ` + ` / ` - ` between terms.
fn push_imm(out: &mut String, style: ImmediateStyle, explicit_sign: bool, low: u8, high: u8) {
    let combined = u16::from_le_bytes([low, high]);
    match style {
        ImmediateStyle::Unsigned => {
            if explicit_sign {
                out.push_str("+ ");
            }
            let _ = write!(out, "{combined}");
        }
        ImmediateStyle::Hex => {
            if explicit_sign {
                out.push_str("+ ");
            }
            let _ = write!(out, "0x{combined:04X}");
        }
        ImmediateStyle::Default | ImmediateStyle::Signed => {
            let value: i32 = if high != 0 {
                combined as i16 as i32
            } else {
                low as i8 as i32
            };
            if value < 0 {
                out.push_str(if explicit_sign { "- " } else { "-" });
            } else if explicit_sign {
                out.push_str("+ ");
            }
            let _ = write!(out, "{}", value.abs());
        }
    }
}
