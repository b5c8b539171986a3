// Crate assembly: a small INI reader and the wiring of peripherals and
// devices onto a fresh bus. Everything that can go wrong here is a
// configuration error, reported as a string for the front end to turn into
// its exit code.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::rc::Rc;

use crate::bus::{BusPtr, DataBus};
use crate::devices::{Clock, Rom, Serial, SerialType, CLOCK_FIRST, CLOCK_LAST, ROM_FIRST, ROM_LAST};
use crate::memory::{
    Memory, MemoryMapper, MAP_REGISTER_FIRST, MAP_REGISTER_LAST, MEMORY_FIRST, MEMORY_LAST,
};
use crate::peripherals::{PeripheralPtr, TapePunch, TapeReader, Terminal};
use crate::processor::{register_window_first, register_window_last, AlpKind, AlpProcessor};

/// Sections of key/value pairs. Section and key lookup is case
/// insensitive; comment lines start with ';' or '#'.
pub struct IniFile {
    sections: HashMap<String, HashMap<String, String>>,
}

impl IniFile {
    pub fn parse(text: &str) -> Result<IniFile, String> {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current = String::new();
        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') {
                if !line.ends_with(']') {
                    return Err(format!("parse error at line {}", number + 1));
                }
                current = line[1..line.len() - 1].trim().to_ascii_lowercase();
                sections.entry(current.clone()).or_insert_with(HashMap::new);
            } else {
                match line.find('=') {
                    Some(split) => {
                        let key = line[..split].trim().to_ascii_lowercase();
                        let value = line[split + 1..].trim().to_string();
                        sections
                            .entry(current.clone())
                            .or_insert_with(HashMap::new)
                            .insert(key, value);
                    }
                    None => return Err(format!("parse error at line {}", number + 1)),
                }
            }
        }
        Ok(IniFile { sections })
    }

    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.sections
            .get(&section.to_ascii_lowercase())
            .and_then(|entries| entries.get(&key.to_ascii_lowercase()))
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_integer(&self, section: &str, key: &str, default: i64) -> i64 {
        self.sections
            .get(&section.to_ascii_lowercase())
            .and_then(|entries| entries.get(&key.to_ascii_lowercase()))
            .and_then(|text| parse_integer(text))
            .unwrap_or(default)
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if let Some(digits) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        i64::from_str_radix(digits, 16).ok()
    } else {
        trimmed.parse::<i64>().ok()
    }
}

/// The assembled crate: the bus with all devices registered, plus typed
/// handles to the parts the executive and front end need to reach.
pub struct Configuration {
    pub bus: BusPtr,
    pub mapper: Option<Rc<RefCell<MemoryMapper>>>,
    pub clock: Option<Rc<RefCell<Clock>>>,
    pub processors: Vec<Rc<RefCell<AlpProcessor>>>,
    pub peripherals: Vec<PeripheralPtr>,
    pub tape_readers: Vec<Rc<RefCell<TapeReader>>>,
    pub tape_punches: Vec<Rc<RefCell<TapePunch>>>,
}

impl Configuration {
    pub fn empty() -> Configuration {
        Configuration {
            bus: DataBus::new(),
            mapper: None,
            clock: None,
            processors: Vec::new(),
            peripherals: Vec::new(),
            tape_readers: Vec::new(),
            tape_punches: Vec::new(),
        }
    }

    pub fn load(ini_file: &str) -> Result<Configuration, String> {
        let text = fs::read_to_string(ini_file).map_err(|error| format!("{}: {}", ini_file, error))?;
        Configuration::from_ini_text(&text, ini_file)
    }

    pub fn from_ini_text(text: &str, origin: &str) -> Result<Configuration, String> {
        let ini = IniFile::parse(text).map_err(|error| format!("{}: {}", origin, error))?;

        let number_devices = ini.get_integer("System", "NumberDevices", -1);
        if number_devices < 1 {
            return Err(format!("{}: no devices specified", origin));
        }
        let number_peripherals = ini.get_integer("System", "NumberPeripherals", 0);

        println!("Number devices:     {}", number_devices);
        println!("Number peripherals: {}", number_peripherals);
        println!();

        let mut configuration = Configuration::empty();

        // Peripherals first - the serial channels refer to them by number,
        // and slot 0 is not used.
        let mut peripherals: Vec<Option<PeripheralPtr>> = vec![None];
        for p in 1..=number_peripherals {
            let section = format!("Peripheral{}", p);
            let kind = ini.get_string(&section, "Kind", "None");
            println!("peripheral: {}", p);
            println!("  kind:     {}", kind);

            match kind.as_str() {
                "Terminal" => {
                    let terminal = Terminal::new();
                    let peripheral: PeripheralPtr = terminal;
                    peripherals.push(Some(peripheral));
                }
                "TapeReader" => {
                    let default_name = ini.get_string(&section, "DefaultName", "");
                    println!("  default:  {}", default_name);
                    let reader = TapeReader::new(&default_name);
                    configuration.tape_readers.push(Rc::clone(&reader));
                    let peripheral: PeripheralPtr = reader;
                    peripherals.push(Some(peripheral));
                }
                "TapePunch" => {
                    let default_name = ini.get_string(&section, "DefaultName", "");
                    println!("  default:  {}", default_name);
                    let punch = TapePunch::new(&default_name);
                    configuration.tape_punches.push(Rc::clone(&punch));
                    let peripheral: PeripheralPtr = punch;
                    peripherals.push(Some(peripheral));
                }
                _ => return Err(format!("{}: unknown peripheral kind", origin)),
            }
        }
        for peripheral in peripherals.iter().flatten() {
            configuration.peripherals.push(Rc::clone(peripheral));
        }
        println!();

        for d in 1..=number_devices {
            let section = format!("Device{}", d);
            let kind = ini.get_string(&section, "Kind", "undefined");
            println!("device: {}", d);
            println!("  kind:     {}", kind);

            match kind.as_str() {
                "ALP1" | "ALP2" => {
                    let slot = ini.get_integer(&section, "Processor", -1);
                    if slot < 1 || slot > 2 {
                        return Err(format!("{}: invalid/missing processor number: {}", origin, slot));
                    }
                    let slot = slot as usize;
                    let alp_kind = if kind == "ALP1" { AlpKind::Alp1 } else { AlpKind::Alp2 };
                    println!("  processor no.: {}", slot);
                    println!("  address:  =X{:04X}", register_window_first(slot) as u16);

                    let (processor, window) =
                        AlpProcessor::new(slot, alp_kind, Rc::clone(&configuration.bus));
                    configuration
                        .bus
                        .borrow_mut()
                        .register_active(
                            register_window_first(slot),
                            register_window_last(slot),
                            window,
                            processor.clone(),
                        )
                        .map_err(|error| format!("{}: {}", origin, error))?;
                    configuration.processors.push(processor);
                }
                "MemoryController" => {
                    let addr = ini.get_integer(&section, "Address", MAP_REGISTER_FIRST as i64);
                    println!("  address:  =X{:04X}", addr as u16);
                    let mapper = MemoryMapper::new();
                    configuration
                        .bus
                        .borrow_mut()
                        .register(MAP_REGISTER_FIRST, MAP_REGISTER_LAST, mapper.clone())
                        .map_err(|error| format!("{}: {}", origin, error))?;
                    configuration.mapper = Some(mapper);
                }
                "RAM" => {
                    let number = ini.get_integer(&section, "Number", -1);
                    println!("  number:   {}", number);
                    let mapper = configuration
                        .mapper
                        .clone()
                        .ok_or_else(|| format!("{}: RAM requires a MemoryController", origin))?;
                    let memory = Memory::new(number, mapper);
                    configuration
                        .bus
                        .borrow_mut()
                        .register(MEMORY_FIRST, MEMORY_LAST, memory)
                        .map_err(|error| format!("{}: {}", origin, error))?;
                }
                "ROM" => {
                    let filename = ini.get_string(&section, "Filename", "");
                    println!("  filename: {}", filename);
                    let rom = Rom::new(&filename);
                    configuration
                        .bus
                        .borrow_mut()
                        .register(ROM_FIRST, ROM_LAST, rom)
                        .map_err(|error| format!("{}: {}", origin, error))?;
                }
                "Clock" => {
                    let addr = ini.get_integer(&section, "Address", CLOCK_FIRST as i64);
                    println!("  address:  =X{:04X}", addr as u16);
                    let clock = Clock::new();
                    configuration
                        .bus
                        .borrow_mut()
                        .register(CLOCK_FIRST, CLOCK_LAST, clock.clone())
                        .map_err(|error| format!("{}: {}", origin, error))?;
                    configuration.clock = Some(clock);
                }
                "Serial" => {
                    let serial_type = ini.get_string(&section, "Type", "");
                    let status = ini.get_integer(&section, "Status", -1);
                    let peripheral = ini.get_integer(&section, "Peripheral", -1);

                    println!("  type:     {}", serial_type);
                    println!("  status:   =X{:04X}", status as u16);
                    println!("  data:     =X{:04X}", (status + 2) as u16);

                    if peripheral < 1 || peripheral > number_peripherals {
                        return Err(format!("{}: no/invalid peripheral specified", origin));
                    }
                    println!("  peripheral: {}", peripheral);

                    let direction = match serial_type.as_str() {
                        "Input" => SerialType::Input,
                        "Output" => SerialType::Output,
                        _ => return Err(format!("{}: unknown serial device type", origin)),
                    };

                    let serial = Serial::new(direction, status as i16);
                    configuration
                        .bus
                        .borrow_mut()
                        .register(status as i16, (status + 4) as i16, serial.clone())
                        .map_err(|error| format!("{}: {}", origin, error))?;
                    if let Some(attached) = &peripherals[peripheral as usize] {
                        serial.borrow_mut().connect(Rc::clone(attached));
                    }
                }
                "None" => {}
                _ => return Err(format!("{}: unknown device kind", origin)),
            }
        }
        println!();

        Ok(configuration)
    }

    pub fn list_peripherals(&self) {
        println!("Available peripherals");
        for (j, peripheral) in self.peripherals.iter().enumerate() {
            println!("{:2} {:<20}", j + 1, peripheral.borrow().name());
        }
        println!();
    }
}
