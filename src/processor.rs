// The arithmetic/logic processor: four (or two) banked register levels, a
// shared interrupt request latch, and the fetch/decode/execute cycle. The
// register file is shared between the execution engine driven by the
// executive and the register window the bus dispatches into, so debugger
// and guest accesses to the ALP's own memory-mapped registers both work.

use std::cell::RefCell;
use std::rc::Rc;

use crate::bus::{ActiveDevice, BusPtr, Device, ADDRESS_FIRST, ALL_ONES};
use crate::instructions::{
    parse_instruction, Access, Condition, Index, Instruction, LiteralOp, Reg, ShiftDirection,
    ShiftMode, Target,
};

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum AlpKind {
    Alp1, // four levels
    Alp2, // two levels
}

pub type AlpStatePtr = Rc<RefCell<AlpState>>;

pub struct AlpState {
    pub slot: usize,
    pub number_levels: usize,
    pub level: usize,
    pub interrupt_requested: bool,
    pub preg: [i16; 4],
    pub areg: [i16; 4],
    pub rreg: [i16; 4],
    pub sreg: [i16; 4],
    pub treg: [i16; 4],
    pub c_trigger: [bool; 4],
    pub v_trigger: [bool; 4],
    pub k_flag: [bool; 4],
}

impl AlpState {
    fn new(slot: usize, kind: AlpKind) -> AlpState {
        let mut state = AlpState {
            slot,
            number_levels: if kind == AlpKind::Alp1 { 4 } else { 2 },
            level: 1,
            interrupt_requested: false,
            preg: [0; 4],
            areg: [0; 4],
            rreg: [0; 4],
            sreg: [0; 4],
            treg: [0; 4],
            c_trigger: [false; 4],
            v_trigger: [false; 4],
            k_flag: [false; 4],
        };
        // Reset comes up on level 1 at the bottom of ROM.
        state.preg[1] = ADDRESS_FIRST;
        state
    }
}

/// The primary ALP register window is =X7F00 to =X7FFF, the secondary
/// =X7E00 to =X7EFF.
pub fn register_window_first(slot: usize) -> i16 {
    (0x7F00 - (slot as i32 - 1) * 0x0100) as i16
}

/// Exclusive upper bound, one short of the full span: including =X7FFF
/// would overflow the signed address range for slot 1, and the ALP
/// registers are addressed by word anyway.
pub fn register_window_last(slot: usize) -> i16 {
    (register_window_first(slot) as i32 + 0x00FF) as i16
}

/// Bus-facing view of the ALP registers. Offset 0 reads the interrupt
/// latch and current level; each level owns a 16 byte row of P, A, R, S, T
/// and the trigger triple.
pub struct AlpRegisters {
    name: String,
    state: AlpStatePtr,
}

impl Device for AlpRegisters {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_word(&mut self, addr: i16) -> i16 {
        let state = self.state.borrow();
        let alp_addr = (addr & 0x00FF) as usize;
        let level = alp_addr >> 4;
        if alp_addr == 0 {
            return ((state.interrupt_requested as i16) << 4) | state.level as i16;
        }
        if level >= state.number_levels {
            return ALL_ONES;
        }
        match alp_addr & 0x0F {
            0x02 => state.preg[level],
            0x04 => state.areg[level],
            0x06 => state.rreg[level],
            0x08 => state.sreg[level],
            0x0A => state.treg[level],
            0x0C => {
                ((state.c_trigger[level] as i16) << 2)
                    | ((state.v_trigger[level] as i16) << 1)
                    | (state.k_flag[level] as i16)
            }
            _ => ALL_ONES,
        }
    }

    fn set_word(&mut self, addr: i16, value: i16) {
        let mut state = self.state.borrow_mut();
        let level = ((addr >> 4) & 0x0F) as usize;
        if level >= state.number_levels {
            return;
        }
        match addr & 0x0F {
            0x02 => state.preg[level] = value,
            0x04 => state.areg[level] = value,
            0x06 => state.rreg[level] = value,
            0x08 => state.sreg[level] = value,
            0x0A => state.treg[level] = value,
            0x0C => {
                state.c_trigger[level] = value & 4 == 4;
                state.v_trigger[level] = value & 2 == 2;
                state.k_flag[level] = value & 1 == 1;
            }
            _ => {}
        }
    }
}

pub struct AlpProcessor {
    name: String,
    slot: usize,
    active_identity: usize,
    pub state: AlpStatePtr,
    bus: BusPtr,
}

impl AlpProcessor {
    /// Creates the execution engine together with its bus-facing register
    /// window; both share the one register file.
    pub fn new(
        slot: usize,
        kind: AlpKind,
        bus: BusPtr,
    ) -> (Rc<RefCell<AlpProcessor>>, Rc<RefCell<AlpRegisters>>) {
        let state = Rc::new(RefCell::new(AlpState::new(slot, kind)));
        let number = if kind == AlpKind::Alp1 { 1 } else { 2 };
        let name = format!("ALP{} Processor ({})", number, slot);
        let window = Rc::new(RefCell::new(AlpRegisters {
            name: name.clone(),
            state: Rc::clone(&state),
        }));
        let processor = Rc::new(RefCell::new(AlpProcessor {
            name,
            slot,
            active_identity: 0,
            state,
            bus,
        }));
        (processor, window)
    }

    pub fn request_interrupt(&mut self) {
        self.state.borrow_mut().interrupt_requested = true;
    }

    pub fn get_preg(&self) -> i16 {
        let state = self.state.borrow();
        state.preg[state.level]
    }

    pub fn get_level(&self) -> usize {
        self.state.borrow().level
    }

    pub fn dump_registers(&self, level: usize) {
        let state = self.state.borrow();
        if level >= state.number_levels {
            return;
        }
        println!(
            "{}: Level {}: P: {:04X}  A: {:04X}  R: {:04X}  S: {:04X}  T: {:04X}  C: {}  V: {}  K: {}",
            self.slot,
            level,
            state.preg[level] as u16,
            state.areg[level] as u16,
            state.rreg[level] as u16,
            state.sreg[level] as u16,
            state.treg[level] as u16,
            state.c_trigger[level] as u8,
            state.v_trigger[level] as u8,
            state.k_flag[level] as u8
        );
    }

    pub fn dump_current_registers(&self) {
        let level = self.state.borrow().level;
        self.dump_registers(level);
    }

    // Register plumbing. Each access borrows the shared register file
    // briefly, never across a bus call, so that traffic landing back in
    // this ALP's own register window cannot conflict.

    fn reg(&self, reg: Reg) -> i16 {
        let state = self.state.borrow();
        let level = state.level;
        match reg {
            Reg::A => state.areg[level],
            Reg::R => state.rreg[level],
            Reg::S => state.sreg[level],
            Reg::T => state.treg[level],
        }
    }

    fn set_reg(&self, reg: Reg, value: i16) {
        let mut state = self.state.borrow_mut();
        let level = state.level;
        match reg {
            Reg::A => state.areg[level] = value,
            Reg::R => state.rreg[level] = value,
            Reg::S => state.sreg[level] = value,
            Reg::T => state.treg[level] = value,
        }
    }

    fn index_value(&self, index: Index) -> i16 {
        let state = self.state.borrow();
        let level = state.level;
        match index {
            Index::P => state.preg[level],
            Index::R => state.rreg[level],
            Index::S => state.sreg[level],
            Index::T => state.treg[level],
        }
    }

    fn set_p(&self, value: i16) {
        let mut state = self.state.borrow_mut();
        let level = state.level;
        state.preg[level] = value;
    }

    fn trigger_c(&self) -> bool {
        let state = self.state.borrow();
        state.c_trigger[state.level]
    }

    fn trigger_v(&self) -> bool {
        let state = self.state.borrow();
        state.v_trigger[state.level]
    }

    fn set_triggers(&self, c: bool, v: bool) {
        let mut state = self.state.borrow_mut();
        let level = state.level;
        state.c_trigger[level] = c;
        state.v_trigger[level] = v;
    }

    fn set_trigger_c(&self, c: bool) {
        let mut state = self.state.borrow_mut();
        let level = state.level;
        state.c_trigger[level] = c;
    }

    fn operand(&self, index: Index, access: Access) -> i16 {
        let base = self.index_value(index);
        match access {
            Access::Word(offset) => self.bus.borrow().get_word(base.wrapping_add(offset)),
            Access::Byte(offset) => self.bus.borrow().get_byte(base.wrapping_add(offset)) as i16,
        }
    }

    fn store(&self, index: Index, access: Access, value: i16) {
        let base = self.index_value(index);
        match access {
            Access::Word(offset) => self.bus.borrow().set_word(base.wrapping_add(offset), value),
            Access::Byte(offset) => self.bus.borrow().set_byte(base.wrapping_add(offset), value as u8),
        }
    }

    fn jump_target(&self, index: Index, target: Target) -> i16 {
        let base = self.index_value(index);
        match target {
            Target::Direct(offset) => base.wrapping_add(offset),
            Target::Indirect(offset) => self.bus.borrow().get_word(base.wrapping_add(offset)),
        }
    }

    // Operation classes. Loads set C on zero and V on negative, except
    // into T; add/subtract derive carry and signed overflow from a 32 bit
    // intermediate; compare sets C on equal and V on less; the bitwise
    // group leaves the triggers alone.

    fn op_load(&self, dest: Reg, operand: i16) {
        self.set_reg(dest, operand);
        if dest != Reg::T {
            self.set_triggers(operand == 0, operand < 0);
        }
    }

    fn op_add(&self, dest: Reg, operand: i16) {
        let t = self.reg(dest) as i32 + operand as i32;
        self.set_reg(dest, t as i16);
        self.set_triggers((t >> 16) & 1 == 1, t > 32767 || t < -32768);
    }

    fn op_subtract(&self, dest: Reg, operand: i16) {
        let t = self.reg(dest) as i32 - operand as i32;
        self.set_reg(dest, t as i16);
        self.set_triggers((t >> 16) & 1 == 1, t > 32767 || t < -32768);
    }

    fn op_compare(&self, dest: Reg, operand: i16) {
        let r = self.reg(dest);
        self.set_triggers(r == operand, r < operand);
    }

    fn op_mask(&self, dest: Reg, operand: i16) {
        let value = self.reg(dest) & operand;
        self.set_reg(dest, value);
    }

    fn op_not_equivalent(&self, dest: Reg, operand: i16) {
        let value = self.reg(dest) ^ operand;
        self.set_reg(dest, value);
    }

    fn op_inclusive_or(&self, dest: Reg, operand: i16) {
        let value = self.reg(dest) | operand;
        self.set_reg(dest, value);
    }

    fn op_shift(&self, dest: Reg, direction: ShiftDirection, mode: ShiftMode, count: u8, coupled: bool) {
        let carry_was_set = self.trigger_c();
        let mut value = self.reg(dest);
        let carry;
        match direction {
            ShiftDirection::Left => {
                value = value.wrapping_shl(count as u32 - 1);
                carry = value as u16 & 0x8000 != 0; // last bit to be shifted out
                value = value.wrapping_shl(1);
                if coupled && carry_was_set {
                    value |= 0x0001;
                }
            }
            ShiftDirection::Right => {
                // Right shifts are natively arithmetic; the logical variant
                // masks off the sign bits that crept back in.
                value >>= count - 1;
                carry = value & 1 != 0;
                value >>= 1;
                if mode == ShiftMode::Logical {
                    value &= (0xFFFFu16 >> count) as i16;
                }
                if coupled && carry_was_set {
                    value = (value as u16 | 0x8000) as i16;
                }
            }
        }
        self.set_reg(dest, value);
        self.set_trigger_c(carry);
    }

    fn perform(&self, instruction: Instruction, address: i16) {
        match instruction {
            Instruction::Set { dest, index, access } => {
                let operand = self.operand(index, access);
                self.op_load(dest, operand);
            }
            Instruction::Store { src, index, access } => {
                let value = self.reg(src);
                self.store(index, access, value);
            }
            Instruction::Add { dest, index, access } => {
                let operand = self.operand(index, access);
                self.op_add(dest, operand);
            }
            Instruction::Compare { dest, index, access } => {
                let operand = self.operand(index, access);
                self.op_compare(dest, operand);
            }
            Instruction::Subtract { dest, index, access } => {
                let operand = self.operand(index, access);
                self.op_subtract(dest, operand);
            }
            Instruction::Mask { dest, index, access } => {
                let operand = self.operand(index, access);
                self.op_mask(dest, operand);
            }
            Instruction::NotEquivalent { dest, index, access } => {
                let operand = self.operand(index, access);
                self.op_not_equivalent(dest, operand);
            }
            Instruction::InclusiveOr { dest, index, access } => {
                let operand = self.operand(index, access);
                self.op_inclusive_or(dest, operand);
            }
            Instruction::Jump { index, target } => {
                let destination = self.jump_target(index, target);
                self.set_p(destination);
            }
            Instruction::JumpSave { index, target } => {
                // The return address lands in S after the jump, so a jump
                // indexed off S still leaves from the old S.
                let return_address = address.wrapping_add(2);
                let destination = self.jump_target(index, target);
                self.set_p(destination);
                self.set_reg(Reg::S, return_address);
            }
            Instruction::JumpOn { condition, target } => {
                let taken = match condition {
                    Condition::VSet => self.trigger_v(),
                    Condition::VClear => !self.trigger_v(),
                    Condition::CSet => self.trigger_c(),
                    Condition::CClear => !self.trigger_c(),
                };
                if taken {
                    let destination = self.jump_target(Index::P, target);
                    self.set_p(destination);
                }
            }
            Instruction::Multiply { index, access } => {
                let operand = self.operand(index, access);
                let t = (self.reg(Reg::A) as i32)
                    .wrapping_mul(operand as i32)
                    .wrapping_mul(2);
                self.set_reg(Reg::A, (t >> 16) as i16);
                self.set_reg(Reg::R, t as i16);
            }
            Instruction::Literal { op, dest, value } => {
                let operand = value as i16;
                match op {
                    LiteralOp::Set => {
                        if dest == Reg::T {
                            // The T literal is the signed byte, no triggers:
                            // =XF8FF loads -1.
                            self.set_reg(Reg::T, value as i8 as i16);
                        } else {
                            self.op_load(dest, operand);
                        }
                    }
                    LiteralOp::Add => self.op_add(dest, operand),
                    LiteralOp::Subtract => self.op_subtract(dest, operand),
                    LiteralOp::Compare => self.op_compare(dest, operand),
                    LiteralOp::Mask => self.op_mask(dest, operand),
                    LiteralOp::NotEquivalent => self.op_not_equivalent(dest, operand),
                    LiteralOp::InclusiveOr => self.op_inclusive_or(dest, operand),
                }
            }
            Instruction::Shift { dest, direction, mode, count, coupled } => {
                self.op_shift(dest, direction, mode, count, coupled);
            }
            Instruction::SetLevel { level } => {
                self.state.borrow_mut().level = level as usize;
            }
            Instruction::ClearInhibit => {
                let mut state = self.state.borrow_mut();
                let level = state.level;
                state.k_flag[level] = false;
            }
            Instruction::SetInhibit => {
                let mut state = self.state.borrow_mut();
                let level = state.level;
                state.k_flag[level] = true;
            }
            Instruction::Nul => {}
        }
    }
}

impl ActiveDevice for AlpProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_active_identity(&mut self, id: usize) {
        self.active_identity = id;
    }

    fn active_identity(&self) -> usize {
        self.active_identity
    }

    fn next_instruction_address(&self) -> Option<i16> {
        Some(self.get_preg())
    }

    fn execute(&mut self) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if state.level >= state.number_levels {
                println!("Unexpected processor level: {}", state.level);
                return false;
            }
            // Only level 0 can be interrupted, and the inhibit flag holds
            // the interrupt off.
            if state.interrupt_requested && state.level == 0 && !state.k_flag[0] {
                state.level = 1;
                state.interrupt_requested = false;
            }
        }

        let address = self.get_preg();
        let instruction = self.bus.borrow().get_word(address); // fetch

        // P moves on before the instruction proper executes; JS depends
        // on this.
        self.set_p(address.wrapping_add(2));

        let number_levels = self.state.borrow().number_levels;
        match parse_instruction(instruction, number_levels) {
            Some(decoded) => {
                self.perform(decoded, address);
                true
            }
            None => {
                println!(
                    "Undefined instruction: ({:04X}) {:04X}",
                    address as u16, instruction as u16
                );
                false
            }
        }
    }
}
