// Decoding of the 16 bit instruction word. The blockwise opcode layout
// collapses into a small set of operation classes parameterised by the
// destination and index registers, which keeps the dispatch testable.
//
// Global bits: MSB bit 0 is the displacement sign; LSB bit 7 selects the
// byte variant for loads/stores/arithmetic and indirection for jumps.

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Reg {
    A,
    R,
    S,
    T,
}

impl Reg {
    fn from_bits(bits: u8) -> Reg {
        match bits & 3 {
            0 => Reg::A,
            1 => Reg::R,
            2 => Reg::S,
            _ => Reg::T,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Index {
    P,
    R,
    S,
    T,
}

impl Index {
    fn from_bits(bits: u8) -> Index {
        match bits & 3 {
            0 => Index::P,
            1 => Index::R,
            2 => Index::S,
            _ => Index::T,
        }
    }
}

/// Word or byte access, carrying the signed displacement off the index
/// register.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Access {
    Word(i16),
    Byte(i16),
}

/// Jump target: direct to the effective address, or through it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Target {
    Direct(i16),
    Indirect(i16),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Condition {
    VSet,
    VClear,
    CSet,
    CClear,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ShiftDirection {
    Left,
    Right,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ShiftMode {
    Logical,
    Arithmetic,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum LiteralOp {
    Set,
    Add,
    Subtract,
    Compare,
    Mask,
    NotEquivalent,
    InclusiveOr,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Instruction {
    Set { dest: Reg, index: Index, access: Access },
    Store { src: Reg, index: Index, access: Access },
    Add { dest: Reg, index: Index, access: Access },
    Compare { dest: Reg, index: Index, access: Access },
    Subtract { dest: Reg, index: Index, access: Access },
    Mask { dest: Reg, index: Index, access: Access },
    NotEquivalent { dest: Reg, index: Index, access: Access },
    InclusiveOr { dest: Reg, index: Index, access: Access },
    Jump { index: Index, target: Target },
    JumpSave { index: Index, target: Target },
    JumpOn { condition: Condition, target: Target },
    Multiply { index: Index, access: Access },
    Literal { op: LiteralOp, dest: Reg, value: u8 },
    Shift { dest: Reg, direction: ShiftDirection, mode: ShiftMode, count: u8, coupled: bool },
    SetLevel { level: u8 },
    ClearInhibit,
    SetInhibit,
    Nul,
}

/// Decodes one instruction word, or None for an undefined pattern.
/// The level count matters: SETL only accepts levels the processor has.
pub fn parse_instruction(word: i16, number_levels: usize) -> Option<Instruction> {
    let (msb, lsb) = crate::conversions::split_word(word);

    let sign: i16 = if msb & 1 == 0 { 1 } else { -1 };
    let word_offset = sign * lsb as i16;
    let byte_offset = sign * (lsb >> 1) as i16;
    let jump_offset = sign * (lsb & 0xFE) as i16;

    let access = if lsb & 1 == 0 {
        Access::Word(word_offset)
    } else {
        Access::Byte(byte_offset)
    };
    let target = if lsb & 1 == 0 {
        Target::Direct(jump_offset)
    } else {
        Target::Indirect(jump_offset)
    };

    let dest = Reg::from_bits(msb >> 3);
    let index = Index::from_bits(msb >> 1);

    let instruction = match msb {
        0x00..=0x1F => Instruction::Set { dest, index, access },
        0x20..=0x3F => Instruction::Store { src: dest, index, access },
        0x40..=0x5F => Instruction::Add { dest, index, access },
        0x60..=0x7F => Instruction::Compare { dest, index, access },
        // The subtract and bitwise blocks only reach A and R.
        0x80..=0x8F => Instruction::Subtract { dest: Reg::from_bits((msb >> 3) & 1), index, access },
        0x90..=0x9F => Instruction::Mask { dest: Reg::from_bits((msb >> 3) & 1), index, access },
        0xA0..=0xAF => Instruction::NotEquivalent { dest: Reg::from_bits((msb >> 3) & 1), index, access },
        0xB0..=0xBF => Instruction::InclusiveOr { dest: Reg::from_bits((msb >> 3) & 1), index, access },
        0xC0..=0xC7 => Instruction::Jump { index, target },
        0xC8..=0xCF => Instruction::JumpSave { index, target },
        0xD0..=0xD7 => {
            let condition = match (msb >> 1) & 3 {
                0 => Condition::VSet,
                1 => Condition::VClear,
                2 => Condition::CSet,
                _ => Condition::CClear,
            };
            Instruction::JumpOn { condition, target }
        }
        0xD8..=0xDF => Instruction::Multiply { index, access },
        0xE7 | 0xEF | 0xF7 | 0xFF if lsb & 0xC0 == 0x40 => {
            let direction = if (lsb >> 5) & 1 == 0 {
                ShiftDirection::Left
            } else {
                ShiftDirection::Right
            };
            let mode = if (lsb >> 4) & 1 == 0 {
                ShiftMode::Logical
            } else {
                ShiftMode::Arithmetic
            };
            let count = lsb & 0x0F;
            if count == 0 {
                // A zero count encodes shift-by-one with carry couple; the
                // arithmetic coupled variant does not exist.
                if mode == ShiftMode::Arithmetic {
                    return None;
                }
                Instruction::Shift { dest, direction, mode, count: 1, coupled: true }
            } else {
                Instruction::Shift { dest, direction, mode, count, coupled: false }
            }
        }
        0xFF => {
            if (lsb as usize) < number_levels {
                Instruction::SetLevel { level: lsb }
            } else if lsb == 0x20 {
                Instruction::ClearInhibit
            } else if lsb == 0x21 {
                Instruction::SetInhibit
            } else if lsb == 0xFF {
                Instruction::Nul
            } else {
                return None;
            }
        }
        0xE0..=0xE6 | 0xE8..=0xEE | 0xF0..=0xF6 | 0xF8..=0xFE => {
            let op = match msb & 7 {
                0 => LiteralOp::Set,
                1 => LiteralOp::Add,
                2 => LiteralOp::Subtract,
                3 => LiteralOp::Compare,
                4 => LiteralOp::Mask,
                5 => LiteralOp::NotEquivalent,
                _ => LiteralOp::InclusiveOr,
            };
            Instruction::Literal { op, dest, value: lsb }
        }
        _ => return None,
    };
    Some(instruction)
}
