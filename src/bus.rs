// The data bus is essentially the system: every device plugs into it and
// claims a half-open address range, and word/byte traffic is dispatched to
// whichever device claims the address. Registration refuses overlapping
// ranges, so "first match" is also the only match.

use std::cell::RefCell;
use std::rc::Rc;

use crate::conversions::{high_byte, low_byte, with_high_byte, with_low_byte};

// Addresses are signed 16 bit quantities, =X8000 through =X7FFF.
pub const ADDRESS_FIRST: i16 = -32768; // =X8000
pub const ADDRESS_LAST: i16 = 32767; // =X7FFF
pub const ALL_ONES: i16 = -1; // =XFFFF

pub const X8000: i16 = -32768;
pub const X9000: i16 = -28672;
pub const XA000: i16 = -24576;
pub const XC000: i16 = -16384;
pub const XE000: i16 = -8192;
pub const X0000: i16 = 0;
pub const X1000: i16 = 4096;
pub const X2000: i16 = 8192;
pub const X3000: i16 = 12288;
pub const X5000: i16 = 20480;
pub const X7000: i16 = 28672;

pub const MAXIMUM_NUMBER_OF_DEVICES: usize = 20;

pub type BusPtr = Rc<RefCell<DataBus>>;
pub type DevicePtr = Rc<RefCell<dyn Device>>;
pub type ActivePtr = Rc<RefCell<dyn ActiveDevice>>;

/// A device, typically a card, is something that plugs into the bus:
/// memory, ROM, the clock, the serial channels, processor register windows.
pub trait Device {
    fn name(&self) -> &str;

    /// Called once at startup, after the whole crate has been assembled.
    fn initialise(&mut self) -> bool {
        true
    }

    fn get_word(&mut self, addr: i16) -> i16;
    fn set_word(&mut self, addr: i16, value: i16);

    // Byte access defaults to the big-endian halves of the containing word;
    // devices backed by raw bytes override these.
    fn get_byte(&mut self, addr: i16) -> u8 {
        let word = self.get_word(addr & !1);
        if addr & 1 == 0 {
            high_byte(word)
        } else {
            low_byte(word)
        }
    }

    fn set_byte(&mut self, addr: i16, value: u8) {
        let word = self.get_word(addr & !1);
        let merged = if addr & 1 == 0 {
            with_high_byte(word, value)
        } else {
            with_low_byte(word, value)
        };
        self.set_word(addr & !1, merged);
    }
}

/// A device which owns execution time and is driven by the executive, as
/// opposed to the passive devices which only react to bus accesses.
pub trait ActiveDevice {
    fn name(&self) -> &str;

    /// Runs one instruction. False means an undefined instruction was hit
    /// and the executive should stop and report.
    fn execute(&mut self) -> bool;

    fn set_active_identity(&mut self, id: usize);
    fn active_identity(&self) -> usize;

    /// Address of the next instruction for processors, used by the break
    /// point gate. None for non-processor active devices.
    fn next_instruction_address(&self) -> Option<i16>;
}

pub struct DataBus {
    devices: Vec<(i16, i16, DevicePtr)>,
    active: Vec<ActivePtr>,
}

impl DataBus {
    pub fn new() -> BusPtr {
        Rc::new(RefCell::new(DataBus {
            devices: Vec::new(),
            active: Vec::new(),
        }))
    }

    /// Registers a device claiming [addr_low, addr_high). The crate has a
    /// fixed number of slots and ranges may not overlap.
    pub fn register(&mut self, addr_low: i16, addr_high: i16, device: DevicePtr) -> Result<(), String> {
        if self.devices.len() >= MAXIMUM_NUMBER_OF_DEVICES {
            return Err(format!("crate full: {} not registered", device.borrow().name()));
        }
        for &(low, high, ref other) in &self.devices {
            if addr_low < high && low < addr_high {
                return Err(format!(
                    "{} {} overlaps {} {}",
                    device.borrow().name(),
                    range_image(addr_low, addr_high),
                    other.borrow().name(),
                    range_image(low, high)
                ));
            }
        }
        self.devices.push((addr_low, addr_high, device));
        Ok(())
    }

    /// Registers an active device: its register window on the bus plus its
    /// execution engine, which is assigned the next active identity.
    pub fn register_active(
        &mut self,
        addr_low: i16,
        addr_high: i16,
        window: DevicePtr,
        engine: ActivePtr,
    ) -> Result<(), String> {
        self.register(addr_low, addr_high, window)?;
        engine.borrow_mut().set_active_identity(self.active.len());
        self.active.push(engine);
        Ok(())
    }

    /// All active devices in registration order.
    pub fn active_devices(&self) -> Vec<ActivePtr> {
        self.active.clone()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn initialise_devices(&self) -> bool {
        let mut result = true;
        for &(_, _, ref device) in &self.devices {
            result &= device.borrow_mut().initialise();
        }
        result
    }

    pub fn list_devices(&self) {
        println!("Available devices");
        for (j, &(low, high, ref device)) in self.devices.iter().enumerate() {
            println!("{:2} {:<20} {}", j + 1, device.borrow().name(), range_image(low, high));
        }
        println!();
    }

    fn find(&self, addr: i16) -> Option<&DevicePtr> {
        for &(low, high, ref device) in &self.devices {
            if low <= addr && addr < high {
                return Some(device);
            }
        }
        None
    }

    // Addresses matching no registered range behave as a null device:
    // reads are all-ones, writes are dropped.

    pub fn get_word(&self, addr: i16) -> i16 {
        match self.find(addr) {
            Some(device) => device.borrow_mut().get_word(addr),
            None => ALL_ONES,
        }
    }

    pub fn set_word(&self, addr: i16, value: i16) {
        if let Some(device) = self.find(addr) {
            device.borrow_mut().set_word(addr, value);
        }
    }

    pub fn get_byte(&self, addr: i16) -> u8 {
        match self.find(addr) {
            Some(device) => device.borrow_mut().get_byte(addr),
            None => 0xFF,
        }
    }

    pub fn set_byte(&self, addr: i16, value: u8) {
        if let Some(device) = self.find(addr) {
            device.borrow_mut().set_byte(addr, value);
        }
    }
}

pub fn range_image(low: i16, high: i16) -> String {
    format!("(=X{:04X},=X{:04X})", low as u16, high as u16)
}
