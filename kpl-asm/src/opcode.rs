use core::fmt;

/// Opcode set of the KPL virtual machine.
///
/// The discriminants are the wire ids: they are assigned in declaration
/// order starting from zero and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
#[allow(non_camel_case_types)]
pub enum Opcode {
    /// Does nothing.
    NOP = 0x00,
    /// `R(A) ← R(B)`
    MOVE = 0x01,
    /// `R(A) ← K(Bx)` materialized as a value.
    LOAD_K = 0x02,
    /// `R(A) ← B ≠ 0`; skips the next instruction when `C ≠ 0`.
    LOAD_BOOL = 0x03,
    /// `R(A..=B) ← null`
    LOAD_NULL = 0x04,
    /// `R(A) ← integer(sBx)`
    LOAD_INT = 0x05,
    /// `R(A) ← globals[RK(B)]`
    GET_GLOBAL = 0x06,
    /// `R(A) ← locals[RK(B)]` of the running function.
    GET_LOCAL = 0x07,
    /// `R(A) ← RK(B).property(RK(C))`
    GET_PROP = 0x08,
    /// `globals[RK(B)] ← RK(C)`
    SET_GLOBAL = 0x09,
    /// `locals[RK(B)] ← RK(C)` of the running function.
    SET_LOCAL = 0x0a,
    /// `R(A).property(RK(B)) ← RK(C)`
    SET_PROP = 0x0b,
    /// `R(A) ← array of length RK(B)`
    NEW_ARRAY = 0x0c,
    /// `R(A) ← empty list`
    NEW_LIST = 0x0d,
    /// `R(A) ← object`, with class `RK(B)` when `C ≠ 0`.
    NEW_OBJECT = 0x0e,
    /// Appends `R(B..=C)` to the array or list in `R(A)`.
    SET_AL = 0x0f,
    /// `R(A) ← self`
    SELF = 0x10,
    /// `R(A) ← RK(B) + RK(C)`
    ADD = 0x11,
    /// `R(A) ← RK(B) − RK(C)`
    SUB = 0x12,
    /// `R(A) ← RK(B) × RK(C)`
    MUL = 0x13,
    /// `R(A) ← RK(B) ÷ RK(C)` (float division).
    DIV = 0x14,
    /// `R(A) ← RK(B) ÷ RK(C)` truncated to an integer.
    IDIV = 0x15,
    /// `R(A) ← RK(B) mod RK(C)`
    MOD = 0x16,
    /// Skips the next instruction when `RK(B) = RK(C)`.
    EQ = 0x17,
    /// Skips the next instruction when `RK(B) ≠ RK(C)`.
    NE = 0x18,
    /// Skips the next instruction when `RK(B) > RK(C)`.
    GR = 0x19,
    /// Skips the next instruction when `RK(B) < RK(C)`.
    LS = 0x1a,
    /// Skips the next instruction when `RK(B) ≥ RK(C)`.
    GE = 0x1b,
    /// Skips the next instruction when `RK(B) ≤ RK(C)`.
    LE = 0x1c,
    /// `R(A) ← RK(B) << RK(C)`
    SHL = 0x1d,
    /// `R(A) ← RK(B) >> RK(C)`
    SHR = 0x1e,
    /// `R(A) ← RK(B) & RK(C)`
    BAND = 0x1f,
    /// `R(A) ← RK(B) | RK(C)`
    BOR = 0x20,
    /// `R(A) ← RK(B) ^ RK(C)`
    XOR = 0x21,
    /// `R(A) ← ~RK(B)`
    BNOT = 0x22,
    /// `R(A) ← not RK(B)` (logical negation of truthiness).
    NOT = 0x23,
    /// `R(A) ← −RK(B)`
    NEG = 0x24,
    /// `R(A) ← length of RK(B)`
    LEN = 0x25,
    /// `R(A) ← RK(C) ∈ RK(B)`
    IN = 0x26,
    /// `R(A) ← RK(B) instanceof RK(C)`
    INSTANCEOF = 0x27,
    /// `R(A) ← RK(B)[RK(C)]`
    GET = 0x28,
    /// `R(A)[RK(B)] ← RK(C)`
    SET = 0x29,
    /// `pc ← Ax` (absolute jump).
    JP = 0x2a,
    /// Skips the next instruction when `truthiness(RK(B)) = (C ≠ 0)`.
    TEST = 0x2b,
    /// As [`Opcode::TEST`], but stores `RK(B)` into `R(A)` when not skipping.
    TEST_SET = 0x2c,
    /// Calls `R(A)` with `B` arguments drawn from `R(A+1)..`.
    CALL = 0x2d,
    /// Invokes property `RK(B)` of `R(A)` with `C` arguments and `R(A)` as
    /// `self`.
    INVOKE = 0x2e,
    /// Returns `RK(B)` (when `A ≠ 0`) to the caller and pops the frame.
    RETURN = 0x2f,
}

impl Opcode {
    /// Total number of assigned opcode ids.
    pub const COUNT: usize = 0x30;

    /// Maps a raw opcode id back to its [`Opcode`], if assigned.
    pub const fn from_u8(id: u8) -> Option<Self> {
        use Opcode::*;

        match id {
            0x00 => Some(NOP),
            0x01 => Some(MOVE),
            0x02 => Some(LOAD_K),
            0x03 => Some(LOAD_BOOL),
            0x04 => Some(LOAD_NULL),
            0x05 => Some(LOAD_INT),
            0x06 => Some(GET_GLOBAL),
            0x07 => Some(GET_LOCAL),
            0x08 => Some(GET_PROP),
            0x09 => Some(SET_GLOBAL),
            0x0a => Some(SET_LOCAL),
            0x0b => Some(SET_PROP),
            0x0c => Some(NEW_ARRAY),
            0x0d => Some(NEW_LIST),
            0x0e => Some(NEW_OBJECT),
            0x0f => Some(SET_AL),
            0x10 => Some(SELF),
            0x11 => Some(ADD),
            0x12 => Some(SUB),
            0x13 => Some(MUL),
            0x14 => Some(DIV),
            0x15 => Some(IDIV),
            0x16 => Some(MOD),
            0x17 => Some(EQ),
            0x18 => Some(NE),
            0x19 => Some(GR),
            0x1a => Some(LS),
            0x1b => Some(GE),
            0x1c => Some(LE),
            0x1d => Some(SHL),
            0x1e => Some(SHR),
            0x1f => Some(BAND),
            0x20 => Some(BOR),
            0x21 => Some(XOR),
            0x22 => Some(BNOT),
            0x23 => Some(NOT),
            0x24 => Some(NEG),
            0x25 => Some(LEN),
            0x26 => Some(IN),
            0x27 => Some(INSTANCEOF),
            0x28 => Some(GET),
            0x29 => Some(SET),
            0x2a => Some(JP),
            0x2b => Some(TEST),
            0x2c => Some(TEST_SET),
            0x2d => Some(CALL),
            0x2e => Some(INVOKE),
            0x2f => Some(RETURN),
            _ => None,
        }
    }

    /// Assembler mnemonic of the opcode.
    pub const fn mnemonic(&self) -> &'static str {
        use Opcode::*;

        match self {
            NOP => "nop",
            MOVE => "move",
            LOAD_K => "load_k",
            LOAD_BOOL => "load_bool",
            LOAD_NULL => "load_null",
            LOAD_INT => "load_int",
            GET_GLOBAL => "get_global",
            GET_LOCAL => "get_local",
            GET_PROP => "get_prop",
            SET_GLOBAL => "set_global",
            SET_LOCAL => "set_local",
            SET_PROP => "set_prop",
            NEW_ARRAY => "new_array",
            NEW_LIST => "new_list",
            NEW_OBJECT => "new_object",
            SET_AL => "set_al",
            SELF => "self",
            ADD => "add",
            SUB => "sub",
            MUL => "mul",
            DIV => "div",
            IDIV => "idiv",
            MOD => "mod",
            EQ => "eq",
            NE => "ne",
            GR => "gr",
            LS => "ls",
            GE => "ge",
            LE => "le",
            SHL => "shl",
            SHR => "shr",
            BAND => "band",
            BOR => "bor",
            XOR => "xor",
            BNOT => "bnot",
            NOT => "not",
            NEG => "neg",
            LEN => "len",
            IN => "in",
            INSTANCEOF => "instanceof",
            GET => "get",
            SET => "set",
            JP => "jp",
            TEST => "test",
            TEST_SET => "test_set",
            CALL => "call",
            INVOKE => "invoke",
            RETURN => "return",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl TryFrom<u8> for Opcode {
    type Error = InvalidOpcode;

    fn try_from(id: u8) -> Result<Self, InvalidOpcode> {
        Self::from_u8(id).ok_or(InvalidOpcode(id))
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

/// The byte cannot be mapped to any assigned opcode id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvalidOpcode(
    /// The rejected id.
    pub u8,
);

impl fmt::Display for InvalidOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid opcode id {:#04x}", self.0)
    }
}

impl std::error::Error for InvalidOpcode {}
