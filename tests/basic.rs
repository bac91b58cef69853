//! Data transfer tests: register loads, register-to-register moves,
//! half-register aliasing and segment moves.

use emu86::cpu::{Emulator, Flags, Reg};
use emu86::decode::instruction::Operands;
use emu86::decode::DecodingContext;
use emu86::error::EmulateError;

fn run_program(bytes: &[u8]) -> Emulator {
    let mut ctx = DecodingContext::default();
    ctx.decode(bytes).expect("program decodes");
    let mut emu = Emulator::new(ctx.instructions);
    emu.run().expect("program runs");
    emu
}

#[test]
fn immediate_register_loads() {
    // mov ax, 1 .. mov di, 8
    #[rustfmt::skip]
    let program = [
        0xB8, 0x01, 0x00, 0xBB, 0x02, 0x00, 0xB9, 0x03, 0x00, 0xBA, 0x04, 0x00,
        0xBC, 0x05, 0x00, 0xBD, 0x06, 0x00, 0xBE, 0x07, 0x00, 0xBF, 0x08, 0x00,
    ];
    let emu = run_program(&program);

    assert_eq!(emu.cpu.read(Reg::Ax), 1);
    assert_eq!(emu.cpu.read(Reg::Bx), 2);
    assert_eq!(emu.cpu.read(Reg::Cx), 3);
    assert_eq!(emu.cpu.read(Reg::Dx), 4);
    assert_eq!(emu.cpu.read(Reg::Sp), 5);
    assert_eq!(emu.cpu.read(Reg::Bp), 6);
    assert_eq!(emu.cpu.read(Reg::Si), 7);
    assert_eq!(emu.cpu.read(Reg::Di), 8);

    assert_eq!(emu.cpu.read(Reg::Es), 0);
    assert_eq!(emu.cpu.read(Reg::Cs), 0);
    assert_eq!(emu.cpu.read(Reg::Ss), 0);
    assert_eq!(emu.cpu.read(Reg::Ds), 0);

    assert_eq!(emu.cpu.read(Reg::Ip), program.len() as u16);
    assert_eq!(emu.cpu.flags(), Flags::empty());
}

#[test]
fn register_to_register_moves() {
    // mov ax..dx, 1..4; shuffle through sp/bp/si/di and back.
    #[rustfmt::skip]
    let program = [
        0xB8, 0x01, 0x00, 0xBB, 0x02, 0x00, 0xB9, 0x03, 0x00, 0xBA, 0x04, 0x00,
        0x89, 0xC4, 0x89, 0xDD, 0x89, 0xCE, 0x89, 0xD7,
        0x89, 0xE2, 0x89, 0xE9, 0x89, 0xF3, 0x89, 0xF8,
    ];
    let emu = run_program(&program);

    assert_eq!(emu.cpu.read(Reg::Ax), 4);
    assert_eq!(emu.cpu.read(Reg::Bx), 3);
    assert_eq!(emu.cpu.read(Reg::Cx), 2);
    assert_eq!(emu.cpu.read(Reg::Dx), 1);
    assert_eq!(emu.cpu.read(Reg::Sp), 1);
    assert_eq!(emu.cpu.read(Reg::Bp), 2);
    assert_eq!(emu.cpu.read(Reg::Si), 3);
    assert_eq!(emu.cpu.read(Reg::Di), 4);

    assert_eq!(emu.cpu.read(Reg::Ip), program.len() as u16);
    assert_eq!(emu.cpu.flags(), Flags::empty());
}

#[test]
fn half_register_and_segment_moves() {
    // Word loads, segment transfers in both directions, then byte moves
    // into each half, exercising the low/high aliasing.
    //
    // mov ax, 0x2222 / mov bx, 0x4444 / mov cx, 0x6666 / mov dx, 0x8888
    // mov ss, ax / mov ds, bx / mov es, cx
    // mov al, 0x11 / mov bh, 0x33 / mov cl, 0x55 / mov dh, 0x77
    // mov ah, bl / mov cl, dh
    // mov ss, ax / mov ds, bx / mov es, cx
    // mov sp, ss / mov bp, ds / mov si, es / mov di, dx
    #[rustfmt::skip]
    let program = [
        0xB8, 0x22, 0x22, 0xBB, 0x44, 0x44, 0xB9, 0x66, 0x66, 0xBA, 0x88, 0x88,
        0x8E, 0xD0, 0x8E, 0xDB, 0x8E, 0xC1,
        0xB0, 0x11, 0xB7, 0x33, 0xB1, 0x55, 0xB6, 0x77,
        0x88, 0xDC, 0x88, 0xF1,
        0x8E, 0xD0, 0x8E, 0xDB, 0x8E, 0xC1,
        0x8C, 0xD4, 0x8C, 0xDD, 0x8C, 0xC6, 0x89, 0xD7,
    ];
    let emu = run_program(&program);

    assert_eq!(emu.cpu.read(Reg::Ax), 0x4411);
    assert_eq!(emu.cpu.read(Reg::Bx), 0x3344);
    assert_eq!(emu.cpu.read(Reg::Cx), 0x6677);
    assert_eq!(emu.cpu.read(Reg::Dx), 0x7788);
    assert_eq!(emu.cpu.read(Reg::Sp), 0x4411);
    assert_eq!(emu.cpu.read(Reg::Bp), 0x3344);
    assert_eq!(emu.cpu.read(Reg::Si), 0x6677);
    assert_eq!(emu.cpu.read(Reg::Di), 0x7788);

    assert_eq!(emu.cpu.read(Reg::Es), 0x6677);
    assert_eq!(emu.cpu.read(Reg::Ss), 0x4411);
    assert_eq!(emu.cpu.read(Reg::Ds), 0x3344);
    assert_eq!(emu.cpu.read(Reg::Cs), 0);

    assert_eq!(emu.cpu.read(Reg::Ip), program.len() as u16);
    assert_eq!(emu.cpu.flags(), Flags::empty());
}

#[test]
fn segment_memory_moves_are_rejected_at_runtime() {
    // mov es, [0x1000]: decodes fine but has no interpreter path.
    let mut ctx = DecodingContext::default();
    ctx.decode(&[0x8E, 0x06, 0x00, 0x10]).unwrap();
    assert_eq!(ctx.instructions[0].operands, Operands::MemorySegReg);

    let mut emu = Emulator::new(ctx.instructions);
    assert_eq!(
        emu.run().unwrap_err(),
        EmulateError::UnsupportedOperands(Operands::MemorySegReg)
    );
    // Rejected before any state change.
    assert_eq!(emu.cpu.read(Reg::Ip), 0);
    assert_eq!(emu.cpu.read(Reg::Es), 0);

    // mov [bp + 2], es: the other direction, through a displacement mode.
    let mut ctx = DecodingContext::default();
    ctx.decode(&[0x8C, 0x46, 0x02]).unwrap();
    assert_eq!(ctx.instructions[0].operands, Operands::SegRegMemory16);

    let mut emu = Emulator::new(ctx.instructions);
    assert_eq!(
        emu.run().unwrap_err(),
        EmulateError::UnsupportedOperands(Operands::SegRegMemory16)
    );
}

#[test]
fn step_executes_one_instruction_at_a_time() {
    // mov ax, 1; mov bx, 2
    let mut ctx = DecodingContext::default();
    ctx.decode(&[0xB8, 0x01, 0x00, 0xBB, 0x02, 0x00]).unwrap();
    let mut emu = Emulator::new(ctx.instructions);

    assert!(emu.step().unwrap());
    assert_eq!(emu.cpu.read(Reg::Ax), 1);
    assert_eq!(emu.cpu.read(Reg::Bx), 0);
    assert_eq!(emu.cpu.read(Reg::Ip), 3);

    assert!(emu.step().unwrap());
    assert_eq!(emu.cpu.read(Reg::Bx), 2);
    assert_eq!(emu.cpu.read(Reg::Ip), 6);

    // Nothing at IP=6: the program has halted.
    assert!(!emu.step().unwrap());
    assert_eq!(emu.cpu.read(Reg::Ip), 6);
}
