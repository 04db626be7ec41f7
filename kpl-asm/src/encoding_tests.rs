use crate::*;

use quickcheck_macros::quickcheck;
use strum::IntoEnumIterator;

#[test]
fn opcode_ids_are_assigned_in_declaration_order() {
    for (id, opcode) in Opcode::iter().enumerate() {
        assert_eq!(id as u8, opcode as u8);
        assert_eq!(Some(opcode), Opcode::from_u8(id as u8));
        assert_eq!(Ok(opcode), Opcode::try_from(id as u8));
    }

    assert_eq!(Opcode::COUNT, Opcode::iter().count());
    assert_eq!(Opcode::NOP as u8, 0x00);
    assert_eq!(Opcode::ADD as u8, 0x11);
    assert_eq!(Opcode::JP as u8, 0x2a);
    assert_eq!(Opcode::RETURN as u8, 0x2f);
}

#[test]
fn unassigned_opcode_ids_are_rejected() {
    for id in Opcode::COUNT as u8..=u8::MAX {
        assert_eq!(None, Opcode::from_u8(id));
        assert_eq!(Err(InvalidOpcode(id)), Opcode::try_from(id));
    }
}

#[test]
fn operand_fields_pack_into_their_slots() {
    let instruction = Instruction::new(Opcode::ADD)
        .with_a(0xab)
        .with_b(0xcd)
        .with_c_const(0xef);

    assert_eq!(Opcode::ADD as u8, instruction.op());
    assert_eq!(0xab, instruction.a());
    assert_eq!(0xcd, instruction.b());
    assert!(!instruction.kb());
    assert_eq!(0xef, instruction.c());
    assert!(instruction.kc());

    let raw = u32::from(instruction);
    assert_eq!(Opcode::ADD as u32, raw & 0x3f);
    assert_eq!(0xab, (raw >> 6) & 0xff);
    assert_eq!(0, (raw >> 14) & 0x1);
    assert_eq!(0xcd, (raw >> 15) & 0xff);
    assert_eq!(1, (raw >> 23) & 0x1);
    assert_eq!(0xef, (raw >> 24) & 0xff);
}

#[test]
fn wide_views_overlay_the_operand_bits() {
    let instruction = Instruction::new(Opcode::JP).with_ax(0x2aa_aaaa);
    assert_eq!(0x2aa_aaaa, instruction.ax());

    let instruction = Instruction::new(Opcode::LOAD_K).with_bx(0x2aaaa);
    assert_eq!(0x2aaaa, instruction.bx());
    assert_eq!(0, instruction.a());
}

#[quickcheck]
fn raw_field_decode_encode_is_lossless(raw: u32) -> bool {
    let instruction = Instruction::from(raw);

    let rebuilt = ((instruction.c() as u32) << 24)
        | ((instruction.kc() as u32) << 23)
        | ((instruction.b() as u32) << 15)
        | ((instruction.kb() as u32) << 14)
        | ((instruction.a() as u32) << 6)
        | instruction.op() as u32;

    rebuilt == raw
}

#[quickcheck]
fn byte_encoding_is_little_endian_and_lossless(raw: u32) -> bool {
    let instruction = Instruction::from(raw);

    instruction.to_bytes() == raw.to_le_bytes()
        && Instruction::from_bytes(instruction.to_bytes()) == instruction
}

#[quickcheck]
fn sbx_round_trips_within_range(value: i32) -> bool {
    let clamped = value.clamp(-131071, 131071);
    let instruction = Instruction::new(Opcode::LOAD_INT).with_sbx(clamped);

    instruction.sbx() == clamped
}

#[quickcheck]
fn sax_round_trips_within_range(value: i32) -> bool {
    let clamped = value.clamp(-0x1ff_ffff, 0x1ff_ffff);
    let instruction = Instruction::new(Opcode::NOP).with_sax(clamped);

    instruction.sax() == clamped
}

#[test]
fn sbx_saturates_at_its_magnitude_range() {
    let max = Instruction::new(Opcode::LOAD_INT).with_sbx(i32::MAX);
    assert_eq!(131071, max.sbx());

    let min = Instruction::new(Opcode::LOAD_INT).with_sbx(i32::MIN);
    assert_eq!(-131071, min.sbx());
}

#[test]
fn signed_byte_fields_use_offset_sign_magnitude() {
    let instruction = Instruction::new(Opcode::NOP).with_sb(-1).with_sc(-256);
    assert_eq!(-1, instruction.sb());
    assert_eq!(0, instruction.b());
    assert!(instruction.kb());
    assert_eq!(-256, instruction.sc());
    assert_eq!(255, instruction.c());

    let instruction = Instruction::new(Opcode::NOP).with_sb(17).with_sc(255);
    assert_eq!(17, instruction.sb());
    assert!(!instruction.kb());
    assert_eq!(255, instruction.sc());
}

#[test]
fn constant_selectors_survive_the_signed_view() {
    // A constant index encodes like a negative operand; the k-bit is the
    // sign bit.
    let instruction = Instruction::new(Opcode::ADD).with_b_const(3);
    assert!(instruction.kb());
    assert_eq!(3, instruction.b());
    assert_eq!(-4, instruction.sb());
}

#[test]
fn instructions_collect_into_a_byte_stream() {
    let code = [
        Instruction::new(Opcode::NOP),
        Instruction::new(Opcode::RETURN).with_a(1),
    ];

    let bytes: Vec<u8> = code.iter().copied().collect();
    assert_eq!(Instruction::LEN * code.len(), bytes.len());
    assert_eq!(&bytes[..4], &code[0].to_bytes());
    assert_eq!(&bytes[4..], &code[1].to_bytes());
}
