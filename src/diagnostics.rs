// Memory inspection: hex dumps, the informative disassembler and the break
// point table. The disassembler names conditional jumps from the preceding
// instruction - indicative rather than perfect, a JEQ after anything but a
// compare falls back to its trigger name.

use termion::color;

use crate::bus::BusPtr;

const MAXIMUM_NUMBER_OF_BREAKS: usize = 20;

pub fn hex(value: i16) -> String {
    format!("{:04X}", value as u16)
}

// ms 4 bits - basic op
const CMD_SET: [&str; 16] = [
    "SET", "SET", "STR", "STR", "ADD", "ADD", "CMP", "CMP", "SUB", "AND", "NEQ", "IOR", "J/JS",
    "MLT ", "???", "???",
];

const LITERAL_CMD_SET: [&str; 8] = ["SET", "ADD", "SUB", "CMP", "AND", "NEQ", "IOR", "???"];

// bits 3-4
const REG_NAME: [&str; 4] = ["A", "R", "S", "T"];

// bits 5-6
const INDEX_NAME: [&str; 4] = ["P", "R", "S", "T"];

const COMPARE_JUMP_NAME: [&str; 4] = ["JLT", "JGE", "JEQ", "JNE"];
const TRIGGER_JUMP_NAME: [&str; 4] = ["JVS", "JVN", "JCS", "JCN"];

const REG_A_VAL_JUMP_NAME: [&str; 4] = ["JNGA", "JPZA", "JEZA", "JNZA"];
const REG_R_VAL_JUMP_NAME: [&str; 4] = ["JNGR", "JPZR", "JEZR", "JNZR"];
const REG_S_VAL_JUMP_NAME: [&str; 4] = ["JNGS", "JPZS", "JEZS", "JNZS"];

const SHIFT_SET: [&str; 2] = ["SHL", "SHR"];
const SHIFT_INDEX: [&str; 3] = ["L", "A", "LC"];

fn is_load_reg(instruction: u16) -> bool {
    (instruction & 0xE000) == 0x0000 || // 0xxx and 1xxx
    (instruction & 0xE700) == 0xE000 // E0xx, E8xx, F0xx, F8xx
}

fn is_compare(instruction: u16) -> bool {
    (instruction & 0xE000) == 0x6000 || // 6xxx and 7xxx
    (instruction & 0xE700) == 0xE300 // E3xx, EBxx, F3xx, FBxx
}

pub struct Diagnostics {
    bus: BusPtr,
    break_list: Vec<i16>,
}

impl Diagnostics {
    pub fn new(bus: BusPtr) -> Diagnostics {
        Diagnostics {
            bus,
            break_list: Vec::new(),
        }
    }

    /// Renders the mnemonic of the word at addr.
    pub fn render_instruction(&self, addr: i16) -> String {
        let data = self.bus.borrow().get_word(addr) as u16;

        let msb = (data >> 8) & 0xFF;
        let lsb = data & 0xFF;

        let b0to3 = ((data >> 12) & 15) as usize;
        let b3to4 = ((data >> 11) & 3) as usize;
        let b5to6 = ((data >> 9) & 3) as usize;
        let b5to7 = ((data >> 8) & 7) as usize;

        let b4 = (data >> 11) & 1;
        let b7 = (data >> 8) & 1;
        let b15 = data & 1;

        let cmd = CMD_SET[b0to3];
        let mut reg = REG_NAME[b3to4];
        let idx = INDEX_NAME[b5to6];

        let sign: i32 = if b7 == 0 { 1 } else { -1 };
        let offset: i32 = if b15 == 0 {
            sign * (data & 0xFF) as i32
        } else {
            sign * ((data >> 1) & 0x7F) as i32
        };
        let bytemode = if b15 == 1 { "B" } else { "" };
        let indirect = if b15 == 1 { "I" } else { "" };

        if b0to3 < 12 {
            if b0to3 >= 8 {
                // Only A and R registers
                reg = REG_NAME[b3to4 & 1];
            }
            let str_offset = if b5to6 == 0 {
                format!(".{:+}", offset + 2)
            } else {
                format!("{}", offset)
            };
            format!("{}{} {:>5},{}{}", cmd, reg, str_offset, idx, bytemode)
        } else if b0to3 == 12 {
            let cmd = if data & 0x0800 == 0 { "J " } else { "JS" };
            let offset = sign * (data & 0xFE) as i32;
            let (str_offset, comma, idx) = if b5to6 == 0 {
                // No ,P for jumps
                (format!(".{:+}", offset + 2), if b15 == 1 { "," } else { "" }, "")
            } else {
                (format!("{}", offset), ",", idx)
            };
            format!("{}   {:>5}{}{}{}", cmd, str_offset, comma, idx, indirect)
        } else if b0to3 == 13 && b4 == 0 {
            // Conditional jumps take their name from the instruction before.
            let previous = self.bus.borrow().get_word(addr.wrapping_sub(2)) as u16;
            let cmd = if is_compare(previous) {
                COMPARE_JUMP_NAME[b5to6]
            } else if is_load_reg(previous) {
                match (previous >> 11) & 3 {
                    0 => REG_A_VAL_JUMP_NAME[b5to6],
                    1 => REG_R_VAL_JUMP_NAME[b5to6],
                    2 => REG_S_VAL_JUMP_NAME[b5to6],
                    _ => TRIGGER_JUMP_NAME[b5to6],
                }
            } else {
                TRIGGER_JUMP_NAME[b5to6]
            };
            let str_offset = format!(".{:+}", offset + 2);
            let comma = if b15 == 1 { "," } else { "" };
            format!("{}  {:>5}{}{}", cmd, str_offset, comma, indirect)
        } else if b0to3 == 13 && b4 == 1 {
            // MLT - the register is implicitly A
            let str_offset = if b5to6 == 0 {
                format!(".{:+}", offset + 2)
            } else {
                format!("{}", offset)
            };
            format!("{} {:>5},{}{}", cmd, str_offset, idx, bytemode)
        } else if b5to7 < 7 {
            // must be Exxx/Fxxx and a literal command
            let cmd = LITERAL_CMD_SET[b5to7];
            format!("{}{} {:>5},L", cmd, reg, lsb)
        } else if data & 0xE7C0 == 0xE740 {
            let reg = REG_NAME[((msb >> 3) & 3) as usize];
            let cmd = SHIFT_SET[((lsb >> 5) & 1) as usize];
            let mut mode = ((lsb >> 4) & 1) as usize;
            let mut shift = lsb & 15;
            if shift == 0 && mode == 1 {
                // shift 1,AC not allowed
                String::from("NOOP")
            } else {
                if shift == 0 && mode == 0 {
                    // logical shift of 0 becomes 1,LC
                    shift = 1;
                    mode = 2;
                }
                format!("{}{} {:>5},{}", cmd, reg, shift, SHIFT_INDEX[mode])
            }
        } else if data & 0xFF00 == 0xFF00 {
            if lsb < 4 {
                format!("SETL {:>5}", lsb)
            } else if lsb == 0x20 {
                String::from("CLRK")
            } else if lsb == 0x21 {
                String::from("SETK")
            } else if lsb == 0xFF {
                String::from("NUL")
            } else {
                String::from("NOOP")
            }
        } else {
            String::from("NOOP")
        }
    }

    /// Prints one address as `(ADDR) DATA  MNEMONIC`, with a highlighted
    /// marker when a break point is set there.
    pub fn access_address(&self, addr: i16) {
        let data = self.bus.borrow().get_word(addr);
        let instruction = self.render_instruction(addr);
        if self.is_break_point(addr) {
            println!(
                "{}*({}){} {}  {}",
                color::Fg(color::Yellow),
                hex(addr),
                color::Fg(color::Reset),
                hex(data),
                instruction
            );
        } else {
            println!(" ({}) {}  {}", hex(addr), hex(data), instruction);
        }
    }

    pub fn access_address_range(&self, start: i16, finish: i16) {
        let mut addr = (start & !1) as i32;
        while addr < finish as i32 {
            self.access_address(addr as i16);
            addr += 2;
        }
    }

    /// 32 bytes per line: 16 words in hex, then the ASCII rendition.
    pub fn wide_dump(&self, start: i16, finish: i16) {
        const ADDRESSES_PER_LINE: i32 = 32;
        let mask = -ADDRESSES_PER_LINE; // line address mask

        if finish <= start {
            return;
        }

        let first = start as i32 & mask; // round down
        let last = (finish as i32 + ADDRESSES_PER_LINE - 1) & mask; // round up

        let mut base = first;
        while base != last {
            print!("({})", hex(base as i16));

            let mut offset = 0;
            while offset < ADDRESSES_PER_LINE {
                let addr = (base + offset) as i16;
                if addr >= start && addr < finish {
                    print!(" {}", hex(self.bus.borrow().get_word(addr)));
                } else {
                    print!("     ");
                }
                offset += 2;
            }

            print!("  |");

            let mut offset = 0;
            while offset < ADDRESSES_PER_LINE {
                let addr = (base + offset) as i16;
                if addr >= start && addr < finish {
                    let byte = self.bus.borrow().get_byte(addr);
                    let c = if byte < 0x20 || byte > 0x7E { '.' } else { byte as char };
                    print!("{}", c);
                } else {
                    print!(" ");
                }
                offset += 1;
            }

            println!("|");
            base += ADDRESSES_PER_LINE;
        }
        println!();
    }

    pub fn set_break(&mut self, addr: i16) {
        if self.break_list.contains(&addr) {
            println!("break point already set at ({})", hex(addr));
        } else if self.break_list.len() >= MAXIMUM_NUMBER_OF_BREAKS {
            println!("!!!break table full, ({}) not set.", hex(addr));
        } else {
            self.break_list.push(addr);
            println!("break point set at ({})", hex(addr));
        }
    }

    pub fn clear_break(&mut self, addr: i16) {
        match self.break_list.iter().position(|&b| b == addr) {
            Some(slot) => {
                self.break_list.swap_remove(slot);
                println!("break point at ({}) cleared", hex(addr));
            }
            None => println!("no break point currently set at ({})", hex(addr)),
        }
    }

    pub fn is_break_point(&self, addr: i16) -> bool {
        self.break_list.contains(&addr)
    }

    pub fn list_breaks(&self) {
        if self.break_list.is_empty() {
            println!("None");
        } else {
            for (j, addr) in self.break_list.iter().enumerate() {
                println!("{:2} ({})", j + 1, hex(*addr));
            }
        }
    }
}
