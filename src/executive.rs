// The executive drives the crate: a round-robin over the active devices,
// with the memory mapper told whose context is current before every
// instruction, clock interrupts steered at the primary processor, and a
// pacing sleep to keep simulated time near real time. One thread for the
// whole crate; a mutex per device would cost more than it buys.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::bus::ActivePtr;
use crate::config::Configuration;
use crate::devices::Clock;
use crate::diagnostics::Diagnostics;
use crate::memory::MemoryMapper;
use crate::processor::AlpProcessor;

static SIGINT_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn signal_catcher(_sig: libc::c_int) {
    SIGINT_RECEIVED.store(true, Ordering::SeqCst);
}

/// Routes SIGINT to a flag polled between instructions, so ^C escapes
/// program execution into the debugger instead of killing the emulator.
pub fn install_interrupt_catcher() {
    let handler = signal_catcher as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}

fn take_interrupt_received() -> bool {
    SIGINT_RECEIVED.swap(false, Ordering::SeqCst)
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Interrupted,
    BreakPoint,
    DecodeError,
}

pub struct Executive {
    active: Vec<ActivePtr>,
    processors: Vec<Rc<RefCell<AlpProcessor>>>,
    mapper: Option<Rc<RefCell<MemoryMapper>>>,
    clock: Option<Rc<RefCell<Clock>>>,
    cursor: usize,
    sleep_modulo: i64,
}

impl Executive {
    pub fn new(configuration: &Configuration, sleep_modulo: i64) -> Executive {
        Executive {
            active: configuration.bus.borrow().active_devices(),
            processors: configuration.processors.clone(),
            mapper: configuration.mapper.clone(),
            clock: configuration.clock.clone(),
            cursor: 0,
            sleep_modulo: sleep_modulo.max(1),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn processors(&self) -> &[Rc<RefCell<AlpProcessor>>] {
        &self.processors
    }

    /// Runs up to `number` instructions round-robin across the active
    /// devices. Stops early on a break point, an undefined instruction or
    /// a user interrupt.
    pub fn run(&mut self, number: i64, diagnostics: &mut Diagnostics) -> RunOutcome {
        let count = self.active.len();
        if count == 0 {
            return RunOutcome::Completed;
        }

        take_interrupt_received();
        for ic in 0..number {
            if take_interrupt_received() {
                println!("\nSIGINT received");
                return RunOutcome::Interrupted;
            }

            // Round-robin update, then select the active device.
            self.cursor = (self.cursor + 1) % count;
            let device = Rc::clone(&self.active[self.cursor]);

            // Let the memory mapper know who is about to own the bus.
            let id = device.borrow().active_identity();
            if let Some(mapper) = &self.mapper {
                mapper.borrow_mut().set_active_identity(id);
            }

            // The first instruction of a run is exempt from the break point
            // gate, so continuing from a break point works.
            if ic > 0 {
                if let Some(next) = device.borrow().next_instruction_address() {
                    if diagnostics.is_break_point(next) {
                        println!("break point {}", device.borrow().name());
                        return RunOutcome::BreakPoint;
                    }
                }
            }

            // Only the primary processor gets clock interrupts.
            if let Some(clock) = &self.clock {
                if clock.borrow_mut().test_and_clear_interrupt_pending() {
                    if let Some(primary) = self.processors.first() {
                        primary.borrow_mut().request_interrupt();
                    }
                }
            }

            let status = device.borrow_mut().execute();

            // Slows the emulator down to approximately real time.
            if ic % self.sleep_modulo == 0 {
                thread::sleep(Duration::from_micros(1));
            }

            // One more instruction's worth of simulated time has passed.
            if let Some(clock) = &self.clock {
                clock.borrow_mut().execute_cycle();
            }

            if !status {
                // The device has reported the error; show the faulting word.
                if let Some(faulted) = device.borrow().next_instruction_address() {
                    diagnostics.access_address(faulted.wrapping_sub(2));
                }
                return RunOutcome::DecodeError;
            }
        }
        RunOutcome::Completed
    }
}
