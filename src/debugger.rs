// The line-oriented debugger: a prompt on stdin, case-insensitive
// two-letter commands, and the diagnostics doing the heavy lifting.

use std::io;
use std::io::Write;

use crate::bus::BusPtr;
use crate::diagnostics::Diagnostics;
use crate::executive::Executive;

const HELP_TEXT: &str = "\
EX                   exit
CU [number]          continue, optional number of instructions
SS                   step 1 instruction, same as CU 1
AA hexaddr [number]  access address, optional number of words
DM hexaddr [number]  dump memory, optional number of words
SC hexaddr hexvalues set upto 20 values from the specified start address
DR [level]           dump ALP registers for current or specified level
SB hexaddr           set break point
CB hexaddr           clear break point
LB                   list break points
HE                   help
// <any text>        comment - ignored.";

enum Command {
    Empty,
    Exit,
    Continue(i64),
    AccessAddress(i16, i64),
    DumpMemory(i16, i64),
    SetCore(i16, Vec<i16>),
    DumpRegisters(Option<i64>),
    SetBreak(i16),
    ClearBreak(i16),
    ListBreaks,
    Help,
    Invalid(String),
}

pub struct Debugger {
    diagnostics: Diagnostics,
    bus: BusPtr,
}

impl Debugger {
    pub fn new(diagnostics: Diagnostics, bus: BusPtr) -> Debugger {
        Debugger { diagnostics, bus }
    }

    pub fn command_loop(&mut self, executive: &mut Executive) {
        loop {
            print!("> ");
            io::stdout().flush().ok();

            let mut line = String::new();
            match io::stdin().read_line(&mut line) {
                Ok(0) => {
                    eprintln!("input terminated");
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }

            match parse_command(&line) {
                Command::Empty => {}
                Command::Exit => {
                    println!("exiting...");
                    break;
                }
                Command::Continue(number) => self.run(executive, number),
                Command::AccessAddress(addr, words) => {
                    let finish = (addr as i32 + 2 * words as i32) as i16;
                    self.diagnostics.access_address_range(addr, finish);
                }
                Command::DumpMemory(addr, words) => {
                    let finish = (addr as i32 + 2 * words as i32) as i16;
                    self.diagnostics.wide_dump(addr, finish);
                }
                Command::SetCore(base, values) => {
                    for (j, value) in values.iter().enumerate() {
                        let addr = base.wrapping_add(2 * j as i16);
                        self.bus.borrow().set_word(addr, *value);
                        self.diagnostics.access_address(addr);
                    }
                }
                Command::DumpRegisters(level) => match level {
                    Some(level) if level < 0 || level >= 4 => {
                        println!("Invalid: level {}", level);
                    }
                    Some(level) => {
                        for processor in executive.processors() {
                            processor.borrow().dump_registers(level as usize);
                        }
                    }
                    None => {
                        for processor in executive.processors() {
                            processor.borrow().dump_current_registers();
                        }
                    }
                },
                Command::SetBreak(addr) => self.diagnostics.set_break(addr),
                Command::ClearBreak(addr) => self.diagnostics.clear_break(addr),
                Command::ListBreaks => self.diagnostics.list_breaks(),
                Command::Help => println!("{}", HELP_TEXT),
                Command::Invalid(text) => println!("Invalid command: {}", text),
            }
        }
    }

    fn run(&mut self, executive: &mut Executive, number: i64) {
        executive.run(number, &mut self.diagnostics);
        for processor in executive.processors() {
            let processor = processor.borrow();
            processor.dump_current_registers();
            self.diagnostics.access_address(processor.get_preg());
        }
    }
}

fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with("//") {
        return Command::Empty;
    }

    let mut parts = trimmed.split_whitespace();
    let word = parts.next().unwrap_or("");
    let upper = word.to_ascii_uppercase();
    let cmd = upper.get(..2).unwrap_or(&upper);

    match cmd {
        "EX" => Command::Exit,
        "CU" => match parts.next() {
            None => Command::Continue(i64::MAX),
            Some(text) => match text.parse::<i64>() {
                Ok(number) => Command::Continue(number),
                Err(_) => Command::Invalid(trimmed.to_string()),
            },
        },
        "SS" => Command::Continue(1),
        "AA" | "DM" => {
            let addr = parts.next().and_then(parse_hex);
            let words = parts
                .next()
                .and_then(|text| text.parse::<i64>().ok())
                .unwrap_or(1);
            match addr {
                Some(addr) if cmd == "AA" => Command::AccessAddress(addr, words),
                Some(addr) => Command::DumpMemory(addr, words),
                None => Command::Invalid(trimmed.to_string()),
            }
        }
        "SC" => match parts.next().and_then(parse_hex) {
            Some(base) => {
                let mut values = Vec::new();
                for text in parts.take(20) {
                    match parse_hex(text) {
                        Some(value) => values.push(value),
                        None => break,
                    }
                }
                Command::SetCore(base, values)
            }
            None => Command::Invalid(trimmed.to_string()),
        },
        "DR" => match parts.next() {
            Some(text) => match text.parse::<i64>() {
                Ok(level) => Command::DumpRegisters(Some(level)),
                Err(_) => Command::DumpRegisters(None),
            },
            None => Command::DumpRegisters(None),
        },
        "SB" => match parts.next().and_then(parse_hex) {
            Some(addr) => Command::SetBreak(addr),
            None => Command::Invalid(trimmed.to_string()),
        },
        "CB" => match parts.next().and_then(parse_hex) {
            Some(addr) => Command::ClearBreak(addr),
            None => Command::Invalid(trimmed.to_string()),
        },
        "LB" => Command::ListBreaks,
        "HE" => Command::Help,
        _ => Command::Invalid(trimmed.to_string()),
    }
}

fn parse_hex(text: &str) -> Option<i16> {
    let digits = text
        .trim_start_matches("=X")
        .trim_start_matches("=x")
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u16::from_str_radix(digits, 16).ok().map(|value| value as i16)
}
