// Locus 16 emulator library: the data bus and its devices, the ALP
// processor, the round-robin executive and the line debugger. The binary
// in main.rs is a thin front end over `Emulator`.

use std::rc::Rc;

pub mod bus;
pub mod config;
mod conversions;
pub mod debugger;
pub mod devices;
pub mod diagnostics;
pub mod executive;
pub mod instructions;
pub mod memory;
pub mod peripherals;
pub mod processor;

pub use crate::config::Configuration;

pub const LOCUS16_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Emulator {
    configuration: Configuration,
    sleep_modulo: i64,
}

impl Emulator {
    pub fn new(configuration: Configuration, sleep_modulo: i64) -> Emulator {
        Emulator {
            configuration,
            sleep_modulo,
        }
    }

    /// Brings the crate up and hands control to the debugger. The return
    /// value is the process exit code.
    pub fn run(&mut self, program: &str, output: &str) -> i32 {
        self.configuration.list_peripherals();
        self.configuration.bus.borrow().list_devices();

        let active = self.configuration.bus.borrow().active_devices();
        println!("Number of active devices: {}", active.len());
        if active.is_empty() {
            println!("Incomplete crate - no active devices");
            return 2;
        }
        println!();

        // The program tape goes into the first reader, the punched output
        // to the first punch.
        if let Some(reader) = self.configuration.tape_readers.first() {
            reader.borrow_mut().set_filename(program);
        }
        if let Some(punch) = self.configuration.tape_punches.first() {
            punch.borrow_mut().set_filename(output);
        }

        // Failures here leave the peripheral or device not-ready; they are
        // reported but do not stop the emulator.
        for peripheral in &self.configuration.peripherals {
            peripheral.borrow_mut().initialise();
        }
        self.configuration.bus.borrow().initialise_devices();

        if let Some(clock) = &self.configuration.clock {
            clock.borrow_mut().set_number_active_devices(active.len() as i32);
        }

        executive::install_interrupt_catcher();
        println!();

        for processor in &self.configuration.processors {
            processor.borrow().dump_current_registers();
        }

        let mut exec = executive::Executive::new(&self.configuration, self.sleep_modulo);
        let diagnostics = diagnostics::Diagnostics::new(Rc::clone(&self.configuration.bus));
        let mut debugger =
            debugger::Debugger::new(diagnostics, Rc::clone(&self.configuration.bus));
        debugger.command_loop(&mut exec);

        println!("complete");
        0
    }
}
