// The passive device zoo: the interval clock, the serial channels and the
// read-only store. RAM lives in the memory module alongside its mapper.

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use crate::bus::{Device, ALL_ONES, XC000};
use crate::conversions::word_from_bytes;
use crate::peripherals::PeripheralPtr;

// Clock registers:
// =X7C00 status/control - bit 0 starts (1) or stops (0) the clock
// =X7C02 interrupt interval in simulated mSec, treated as unsigned
pub const CLOCK_FIRST: i16 = 0x7C00;
pub const CLOCK_LAST: i16 = 0x7C04;

pub struct Clock {
    number_active_devices: i32,
    is_running: bool,
    interval: u16,   // emulated mSec
    count_down: f64, // emulated uSec
    interrupt_pending: bool,
}

impl Clock {
    pub fn new() -> Rc<RefCell<Clock>> {
        Rc::new(RefCell::new(Clock {
            number_active_devices: 1,
            is_running: false,
            interval: 0,
            count_down: 0.0,
            interrupt_pending: false,
        }))
    }

    pub fn set_number_active_devices(&mut self, n: i32) {
        self.number_active_devices = n.max(1);
    }

    /// Called at each instruction boundary by the executive.
    pub fn execute_cycle(&mut self) {
        if self.is_running {
            // A typical ALP instruction is 2.25 uSec; with more devices
            // sharing the bus the effective rate drops, far from linearly,
            // due to bus contention.
            let duration = (3.0 * 2.25) / (self.number_active_devices as f64 + 2.0);
            self.count_down -= duration;
            if self.count_down <= 0.0 {
                self.interrupt_pending = true;
                self.count_down += 1000.0 * self.interval as f64;
                if self.count_down < 10.0 {
                    self.count_down = 10.0;
                }
            }
        }
    }

    pub fn test_and_clear_interrupt_pending(&mut self) -> bool {
        let result = self.interrupt_pending;
        self.interrupt_pending = false;
        result
    }
}

impl Device for Clock {
    fn name(&self) -> &str {
        "Clock"
    }

    fn get_word(&mut self, addr: i16) -> i16 {
        if addr == CLOCK_FIRST {
            self.is_running as i16
        } else if addr == CLOCK_FIRST + 2 {
            self.interval as i16
        } else {
            ALL_ONES
        }
    }

    fn set_word(&mut self, addr: i16, value: i16) {
        if addr == CLOCK_FIRST {
            self.is_running = value & 1 == 1;
        } else if addr == CLOCK_FIRST + 2 {
            // The interval is an unsigned quantity however it arrives.
            self.interval = value as u16;
            self.count_down = 1000.0 * self.interval as f64;
            if self.count_down < 10.0 {
                self.count_down = 10.0;
            }
        }
    }
}

/// One unidirectional serial channel. The device is ready to read/write
/// when the status register reads =XC000; the transferred byte sits in the
/// least significant half of the data register at status + 2.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SerialType {
    Input,
    Output,
}

pub struct Serial {
    serial_type: SerialType,
    status_register_address: i16,
    data_register_address: i16,
    peripheral: Option<PeripheralPtr>,
    buffered_byte: Option<u8>,
}

impl Serial {
    pub fn new(serial_type: SerialType, status_register_address: i16) -> Rc<RefCell<Serial>> {
        Rc::new(RefCell::new(Serial {
            serial_type,
            status_register_address,
            data_register_address: status_register_address + 2,
            peripheral: None,
            buffered_byte: None,
        }))
    }

    pub fn connect(&mut self, peripheral: PeripheralPtr) {
        self.peripheral = Some(peripheral);
        // could be a reconnect
        self.buffered_byte = None;
    }
}

impl Device for Serial {
    fn name(&self) -> &str {
        "Serial"
    }

    fn get_word(&mut self, addr: i16) -> i16 {
        if addr == self.status_register_address {
            match &self.peripheral {
                Some(peripheral) => {
                    if self.serial_type == SerialType::Input {
                        if self.buffered_byte.is_none() {
                            self.buffered_byte = peripheral.borrow_mut().read_byte();
                        }
                        if self.buffered_byte.is_some() {
                            XC000 // ready to read
                        } else {
                            0x0000
                        }
                    } else {
                        // Output is always ready once a peripheral is attached.
                        XC000
                    }
                }
                None => 0x0000,
            }
        } else if addr == self.data_register_address && self.serial_type == SerialType::Input {
            match self.buffered_byte.take() {
                Some(byte) => byte as i16,
                None => ALL_ONES,
            }
        } else {
            // bogus/odd address or wrong direction
            eprintln!("Serial: bogus address (=X{:04X})", addr as u16);
            ALL_ONES
        }
    }

    fn set_word(&mut self, addr: i16, value: i16) {
        if addr == self.data_register_address && self.serial_type == SerialType::Output {
            if let Some(peripheral) = &self.peripheral {
                peripheral.borrow_mut().write_byte((value & 0xFF) as u8);
            }
        }
    }
}

pub const ROM_FIRST: i16 = -32768; // =X8000 - inclusive
pub const ROM_LAST: i16 = -28672; // =X9000 - exclusive
const ROM_SIZE: usize = (ROM_LAST as i32 - ROM_FIRST as i32) as usize;

/// Read-only image loaded from file at initialisation. Uninitialised
/// contents read as all-ones; writes are silently dropped.
pub struct Rom {
    rom_file: String,
    image: Vec<u8>,
}

impl Rom {
    pub fn new(rom_file: &str) -> Rc<RefCell<Rom>> {
        Rc::new(RefCell::new(Rom {
            rom_file: rom_file.to_string(),
            image: vec![0xFF; ROM_SIZE],
        }))
    }

    fn index(addr: i16) -> usize {
        (addr as i32 - ROM_FIRST as i32) as usize
    }
}

impl Device for Rom {
    fn name(&self) -> &str {
        "ROM"
    }

    fn initialise(&mut self) -> bool {
        match fs::read(&self.rom_file) {
            Ok(contents) => {
                let size = contents.len().min(ROM_SIZE);
                self.image[..size].copy_from_slice(&contents[..size]);
                println!("ROM {} bytes loaded from {}", size, self.rom_file);
                true
            }
            Err(error) => {
                // The image stays all-ones and the emulator carries on.
                eprintln!("ROM {}: {}", self.rom_file, error);
                true
            }
        }
    }

    fn get_byte(&mut self, addr: i16) -> u8 {
        self.image[Rom::index(addr)]
    }

    fn set_byte(&mut self, _addr: i16, _value: u8) {}

    fn get_word(&mut self, addr: i16) -> i16 {
        let ptr = Rom::index(addr) & !1;
        word_from_bytes(self.image[ptr], self.image[ptr + 1])
    }

    fn set_word(&mut self, _addr: i16, _value: i16) {}
}
