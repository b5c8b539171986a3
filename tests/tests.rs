use std::cell::RefCell;
use std::rc::Rc;

use locus16::bus::{ActiveDevice, DataBus, Device, ALL_ONES, XC000};
use locus16::config::Configuration;
use locus16::devices::{Clock, Serial, SerialType, CLOCK_FIRST, CLOCK_LAST};
use locus16::diagnostics::Diagnostics;
use locus16::executive::{Executive, RunOutcome};
use locus16::memory::{
    Memory, MemoryMapper, MAP_REGISTER_FIRST, MAP_REGISTER_LAST, MEMORY_FIRST, MEMORY_LAST,
};
use locus16::peripherals::{Peripheral, PeripheralPtr};
use locus16::processor::{register_window_first, register_window_last, AlpKind, AlpProcessor};

fn word(value: u32) -> i16 {
    value as u16 as i16
}

/// A single ALP1 crate with mapped RAM and the clock, no ROM: unregistered
/// ROM addresses read all-ones, which conveniently decode as NUL.
fn test_crate() -> Configuration {
    let mut configuration = Configuration::empty();
    let bus = Rc::clone(&configuration.bus);

    let mapper = MemoryMapper::new();
    bus.borrow_mut()
        .register(MAP_REGISTER_FIRST, MAP_REGISTER_LAST, mapper.clone())
        .unwrap();
    let memory = Memory::new(1, Rc::clone(&mapper));
    bus.borrow_mut()
        .register(MEMORY_FIRST, MEMORY_LAST, memory)
        .unwrap();
    let clock = Clock::new();
    bus.borrow_mut()
        .register(CLOCK_FIRST, CLOCK_LAST, clock.clone())
        .unwrap();

    let (processor, window) = AlpProcessor::new(1, AlpKind::Alp1, Rc::clone(&bus));
    bus.borrow_mut()
        .register_active(
            register_window_first(1),
            register_window_last(1),
            window,
            processor.clone(),
        )
        .unwrap();

    configuration.mapper = Some(mapper);
    configuration.clock = Some(clock);
    configuration.processors.push(processor);
    configuration
}

/// Points the processor's foreground level at a program in RAM.
fn load_program(configuration: &Configuration, origin: i16, program: &[u16]) {
    for (j, instruction) in program.iter().enumerate() {
        let addr = origin.wrapping_add(2 * j as i16);
        configuration.bus.borrow().set_word(addr, *instruction as i16);
    }
    let state = Rc::clone(&configuration.processors[0].borrow().state);
    let mut state = state.borrow_mut();
    state.level = 0;
    state.preg[0] = origin;
}

fn step(configuration: &Configuration) -> bool {
    configuration.processors[0].borrow_mut().execute()
}

struct ScriptPeripheral {
    input: Vec<u8>,
    cursor: usize,
    written: Vec<u8>,
}

impl ScriptPeripheral {
    fn new(input: Vec<u8>) -> Rc<RefCell<ScriptPeripheral>> {
        Rc::new(RefCell::new(ScriptPeripheral {
            input,
            cursor: 0,
            written: Vec::new(),
        }))
    }
}

impl Peripheral for ScriptPeripheral {
    fn name(&self) -> &str {
        "Script"
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.cursor < self.input.len() {
            let value = self.input[self.cursor];
            self.cursor += 1;
            Some(value)
        } else {
            None
        }
    }

    fn write_byte(&mut self, value: u8) -> bool {
        self.written.push(value);
        true
    }
}

//------------------------------------------------------------------------------
// Bus behaviour
//------------------------------------------------------------------------------

#[test]
fn unregistered_addresses_read_all_ones() {
    let configuration = test_crate();
    let bus = configuration.bus.borrow();
    // ROM region has no device in the test crate.
    assert_eq!(bus.get_word(word(0x8000)), ALL_ONES);
    assert_eq!(bus.get_byte(word(0x8001)), 0xFF);
    // Writes there go nowhere, silently.
    bus.set_word(word(0x8000), 0x1234);
    assert_eq!(bus.get_word(word(0x8000)), ALL_ONES);
}

#[test]
fn dispatch_routes_by_address_range() {
    let configuration = test_crate();
    let bus = configuration.bus.borrow();
    // The clock answers within its range, the null device just outside it.
    assert_eq!(bus.get_word(CLOCK_FIRST), 0); // stopped
    assert_eq!(bus.get_word(CLOCK_LAST), ALL_ONES);
    // ALP window answers at its base: level 1, no interrupt latched.
    assert_eq!(bus.get_word(word(0x7F00)), 1);
}

#[test]
fn registration_rejects_overlap() {
    let bus = DataBus::new();
    let first = Serial::new(SerialType::Input, 0x7B10);
    bus.borrow_mut().register(0x7B10, 0x7B14, first).unwrap();
    let second = Serial::new(SerialType::Input, 0x7B12);
    assert!(bus.borrow_mut().register(0x7B12, 0x7B16, second).is_err());
    // A disjoint range is still fine.
    let third = Serial::new(SerialType::Input, 0x7B14);
    assert!(bus.borrow_mut().register(0x7B14, 0x7B18, third).is_ok());
}

#[test]
fn registration_rejects_overfull_crate() {
    let bus = DataBus::new();
    for j in 0..20 {
        let serial = Serial::new(SerialType::Input, 0x1000 + 8 * j);
        bus.borrow_mut()
            .register(0x1000 + 8 * j, 0x1004 + 8 * j, serial)
            .unwrap();
    }
    let one_too_many = Serial::new(SerialType::Input, 0x2000);
    assert!(bus.borrow_mut().register(0x2000, 0x2004, one_too_many).is_err());
}

#[test]
fn big_endian_byte_access() {
    // Scenario S2: word =X1234 at =X2000 reads back =X12 then =X34.
    let configuration = test_crate();
    let bus = configuration.bus.borrow();
    bus.set_word(word(0x2000), 0x1234);
    assert_eq!(bus.get_word(word(0x2000)), 0x1234);
    assert_eq!(bus.get_byte(word(0x2000)), 0x12);
    assert_eq!(bus.get_byte(word(0x2001)), 0x34);

    // And the read-modify-write in the other direction.
    bus.set_byte(word(0x2000), 0xAB);
    bus.set_byte(word(0x2001), 0xCD);
    assert_eq!(bus.get_word(word(0x2000)), word(0xABCD));
}

//------------------------------------------------------------------------------
// Memory mapper
//------------------------------------------------------------------------------

#[test]
fn mapper_bank_switch_preserves_contents() {
    // Scenario S5: two banks behind =X2000, switched by map slot 0.
    let configuration = test_crate();
    let bus = configuration.bus.borrow();

    bus.set_word(MAP_REGISTER_FIRST, 0x1000);
    bus.set_word(word(0x2000), word(0xCAFE));

    bus.set_word(MAP_REGISTER_FIRST, 0x2000);
    bus.set_word(word(0x2000), word(0xBEEF));

    bus.set_word(MAP_REGISTER_FIRST, 0x1000);
    assert_eq!(bus.get_word(word(0x2000)), word(0xCAFE));

    bus.set_word(MAP_REGISTER_FIRST, 0x2000);
    assert_eq!(bus.get_word(word(0x2000)), word(0xBEEF));
}

#[test]
fn mapper_contexts_are_per_identity() {
    let configuration = test_crate();
    let mapper = configuration.mapper.clone().unwrap();
    let bus = configuration.bus.borrow();

    // Identity 1 maps =X2000 to bank 1 of group 0; identity 0 stays on
    // the default map.
    bus.set_word(MAP_REGISTER_FIRST + 2, 0x1000);
    bus.set_word(word(0x2000), 0x1111);

    mapper.borrow_mut().set_active_identity(1);
    bus.set_word(word(0x2000), 0x2222);
    assert_eq!(bus.get_word(word(0x2000)), 0x2222);

    mapper.borrow_mut().set_active_identity(0);
    assert_eq!(bus.get_word(word(0x2000)), 0x1111);

    // Out of range identities clamp to 0.
    mapper.borrow_mut().set_active_identity(99);
    assert_eq!(bus.get_word(word(0x2000)), 0x1111);
}

//------------------------------------------------------------------------------
// Instruction execution
//------------------------------------------------------------------------------

#[test]
fn literal_load_and_add() {
    // Scenario S1.
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0xE005, 0xE103, 0xF8FF]);

    assert!(step(&configuration));
    assert!(step(&configuration));
    assert!(step(&configuration));

    let state = Rc::clone(&configuration.processors[0].borrow().state);
    let state = state.borrow();
    assert_eq!(state.areg[0], 8);
    assert_eq!(state.treg[0], word(0xFFFF));
    assert_eq!(state.c_trigger[0], false);
    assert_eq!(state.v_trigger[0], false);
    assert_eq!(state.preg[0], word(0x9006));
}

#[test]
fn unconditional_jump() {
    // Scenario S3: J .+6 from =X9000 lands at =X9006.
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0xC004]);
    assert!(step(&configuration));
    assert_eq!(configuration.processors[0].borrow().get_preg(), word(0x9006));
}

#[test]
fn indirect_jump_reads_target_from_memory() {
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0xC001, 0x4AFE]);
    assert!(step(&configuration));
    assert_eq!(configuration.processors[0].borrow().get_preg(), word(0x4AFE));
}

#[test]
fn jump_and_save_links_through_s() {
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0xCC00]);
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        state.borrow_mut().sreg[0] = word(0x4000);
    }
    assert!(step(&configuration));
    let state = Rc::clone(&configuration.processors[0].borrow().state);
    let state = state.borrow();
    // The jump leaves from the old S, the return address lands afterwards.
    assert_eq!(state.preg[0], word(0x4000));
    assert_eq!(state.sreg[0], word(0x9002));
}

#[test]
fn conditional_jumps_follow_the_triggers() {
    // CMPA 5,L with A = 5 sets C (equal); JCS takes the jump.
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0xE305, 0xD402]);
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        state.borrow_mut().areg[0] = 5;
    }
    assert!(step(&configuration));
    assert!(step(&configuration));
    assert_eq!(configuration.processors[0].borrow().get_preg(), word(0x9006));

    // With A = 4 the compare sets V (less) instead; JCS falls through
    // and JVS takes.
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0xE305, 0xD402, 0xD004]);
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        state.borrow_mut().areg[0] = 4;
    }
    assert!(step(&configuration));
    assert!(step(&configuration)); // JCS not taken
    assert_eq!(configuration.processors[0].borrow().get_preg(), word(0x9004));
    assert!(step(&configuration)); // JVS taken: =X9006 + 4
    assert_eq!(configuration.processors[0].borrow().get_preg(), word(0x900A));
}

#[test]
fn byte_mode_load_halves_the_offset() {
    // SETA with LSB 03: byte access at P + 1, which is the low half of
    // the word at =X9002.
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0x0003]);
    configuration.bus.borrow().set_word(word(0x9002), 0x00AB);
    assert!(step(&configuration));
    let state = Rc::clone(&configuration.processors[0].borrow().state);
    assert_eq!(state.borrow().areg[0], 0x00AB);
}

#[test]
fn store_word_and_byte() {
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0x2200, 0x2201]);
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        let mut state = state.borrow_mut();
        state.areg[0] = 0x1234;
        state.rreg[0] = word(0x2000);
    }
    assert!(step(&configuration));
    assert_eq!(configuration.bus.borrow().get_word(word(0x2000)), 0x1234);

    // The byte variant stores the low half of A at the even address,
    // which is the high half of the word.
    assert!(step(&configuration));
    assert_eq!(configuration.bus.borrow().get_word(word(0x2000)), 0x3434);
}

#[test]
fn add_and_subtract_triggers() {
    // Signed overflow: =X7FFF + 1.
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0xE101]);
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        state.borrow_mut().areg[0] = 0x7FFF;
    }
    assert!(step(&configuration));
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        let state = state.borrow();
        assert_eq!(state.areg[0], word(0x8000));
        assert_eq!(state.c_trigger[0], false);
        assert_eq!(state.v_trigger[0], true);
    }

    // Borrow: 0 - 1 leaves bit 16 of the wide intermediate set.
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0xE201]);
    assert!(step(&configuration));
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        let state = state.borrow();
        assert_eq!(state.areg[0], word(0xFFFF));
        assert_eq!(state.c_trigger[0], true);
        assert_eq!(state.v_trigger[0], false);
    }

    // -1 + -1 from memory: carry, no overflow.
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0x4200]);
    configuration.bus.borrow().set_word(word(0x2000), word(0xFFFF));
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        let mut state = state.borrow_mut();
        state.areg[0] = word(0xFFFF);
        state.rreg[0] = word(0x2000);
    }
    assert!(step(&configuration));
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        let state = state.borrow();
        assert_eq!(state.areg[0], word(0xFFFE));
        assert_eq!(state.c_trigger[0], true);
        assert_eq!(state.v_trigger[0], false);
    }
}

#[test]
fn multiply_doubles_the_product() {
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0xDA00]);
    configuration.bus.borrow().set_word(word(0x2000), 4);
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        let mut state = state.borrow_mut();
        state.areg[0] = 3;
        state.rreg[0] = word(0x2000);
    }
    assert!(step(&configuration));
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        let state = state.borrow();
        // A:R = 2 * 3 * 4 = 24
        assert_eq!(state.areg[0], 0);
        assert_eq!(state.rreg[0], 24);
    }

    // A negative product sign-extends through the high half.
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0xDA00]);
    configuration.bus.borrow().set_word(word(0x2000), 1);
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        let mut state = state.borrow_mut();
        state.areg[0] = -1;
        state.rreg[0] = word(0x2000);
    }
    assert!(step(&configuration));
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        let state = state.borrow();
        assert_eq!(state.areg[0], word(0xFFFF));
        assert_eq!(state.rreg[0], -2);
    }
}

#[test]
fn coupled_rotate() {
    // Scenario S6: shift left, count 0, with A = =X8001 and C set.
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0xE740]);
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        let mut state = state.borrow_mut();
        state.areg[0] = word(0x8001);
        state.c_trigger[0] = true;
    }
    assert!(step(&configuration));
    let state = Rc::clone(&configuration.processors[0].borrow().state);
    let state = state.borrow();
    assert_eq!(state.areg[0], 0x0003);
    assert_eq!(state.c_trigger[0], true);
}

#[test]
fn logical_right_shift_masks_sign_extension() {
    // SHRA 4,L on a negative value clears the bits the arithmetic shift
    // would drag in.
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0xE764]);
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        state.borrow_mut().areg[0] = word(0x8000);
    }
    assert!(step(&configuration));
    let state = Rc::clone(&configuration.processors[0].borrow().state);
    let state = state.borrow();
    assert_eq!(state.areg[0], word(0x0800));
    assert_eq!(state.c_trigger[0], false);
}

#[test]
fn set_level_and_inhibit_flags() {
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0xFF21, 0xFF02]);
    assert!(step(&configuration));
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        assert_eq!(state.borrow().k_flag[0], true);
    }
    assert!(step(&configuration));
    assert_eq!(configuration.processors[0].borrow().get_level(), 2);
}

#[test]
fn undefined_instructions_report_decode_errors() {
    for instruction in &[0xFF22u16, 0xFF10, 0xE700, 0xE750] {
        let configuration = test_crate();
        load_program(&configuration, word(0x9000), &[*instruction]);
        assert!(!step(&configuration), "={:04X} should not decode", instruction);
    }
}

//------------------------------------------------------------------------------
// ALP register window
//------------------------------------------------------------------------------

#[test]
fn register_window_reflects_every_level() {
    let configuration = test_crate();
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        let mut state = state.borrow_mut();
        for level in 0..4 {
            state.preg[level] = 0x1000 + level as i16;
            state.areg[level] = 0x2000 + level as i16;
            state.rreg[level] = 0x3000 + level as i16;
            state.sreg[level] = 0x4000 + level as i16;
            state.treg[level] = 0x5000 + level as i16;
        }
        state.c_trigger[3] = true;
        state.k_flag[3] = true;
    }

    let bus = configuration.bus.borrow();
    for level in 0..4i16 {
        let row = word(0x7F00) + (level << 4);
        assert_eq!(bus.get_word(row + 0x02), 0x1000 + level);
        assert_eq!(bus.get_word(row + 0x04), 0x2000 + level);
        assert_eq!(bus.get_word(row + 0x06), 0x3000 + level);
        assert_eq!(bus.get_word(row + 0x08), 0x4000 + level);
        assert_eq!(bus.get_word(row + 0x0A), 0x5000 + level);
    }
    // Trigger triple: bit 2 = C, bit 1 = V, bit 0 = K.
    assert_eq!(bus.get_word(word(0x7F3C)), 0b101);
    // Offset 0: interrupt latch and current level (reset level is 1).
    assert_eq!(bus.get_word(word(0x7F00)), 1);
    // Unassigned offsets read all-ones.
    assert_eq!(bus.get_word(word(0x7F0E)), ALL_ONES);
}

#[test]
fn register_window_accepts_writes() {
    let configuration = test_crate();
    let bus = configuration.bus.borrow();
    bus.set_word(word(0x7F16), 0x2222); // R at level 1
    bus.set_word(word(0x7F0C), 0x0007); // all three triggers at level 0

    let state = Rc::clone(&configuration.processors[0].borrow().state);
    let state = state.borrow();
    assert_eq!(state.rreg[1], 0x2222);
    assert!(state.c_trigger[0] && state.v_trigger[0] && state.k_flag[0]);
}

#[test]
fn secondary_processor_window_sits_at_7e00() {
    let mut configuration = Configuration::empty();
    let bus = Rc::clone(&configuration.bus);
    let (processor, window) = AlpProcessor::new(2, AlpKind::Alp1, Rc::clone(&bus));
    bus.borrow_mut()
        .register_active(
            register_window_first(2),
            register_window_last(2),
            window,
            processor.clone(),
        )
        .unwrap();
    configuration.processors.push(processor);

    let state = Rc::clone(&configuration.processors[0].borrow().state);
    state.borrow_mut().preg[1] = word(0x8123);
    assert_eq!(configuration.bus.borrow().get_word(word(0x7E12)), word(0x8123));
}

#[test]
fn two_level_processor_hides_upper_rows() {
    let configuration = Configuration::empty();
    let bus = Rc::clone(&configuration.bus);
    let (_processor, window) = AlpProcessor::new(1, AlpKind::Alp2, Rc::clone(&bus));
    bus.borrow_mut()
        .register(register_window_first(1), register_window_last(1), window)
        .unwrap();
    // Reset leaves level 1 pointing at the bottom of ROM.
    assert_eq!(bus.borrow().get_word(word(0x7F12)), word(0x8000));
    assert_eq!(bus.borrow().get_word(word(0x7F22)), ALL_ONES);
}

//------------------------------------------------------------------------------
// Interrupts and the clock
//------------------------------------------------------------------------------

#[test]
fn clock_interrupt_switches_level_zero_to_one() {
    // Scenario S4: a 1 mS interval at one active device is 445
    // instructions' worth of simulated time.
    let configuration = test_crate();
    let clock = configuration.clock.clone().unwrap();
    load_program(&configuration, word(0x9000), &[]);

    {
        let bus = configuration.bus.borrow();
        bus.set_word(CLOCK_FIRST + 2, 1);
        bus.set_word(CLOCK_FIRST, 1);
    }

    let mut fired_at = None;
    for ic in 1..=500 {
        assert!(step(&configuration));
        clock.borrow_mut().execute_cycle();
        if clock.borrow_mut().test_and_clear_interrupt_pending() {
            fired_at = Some(ic);
            break;
        }
    }
    assert_eq!(fired_at, Some(445));

    // The next processor step takes the interrupt: level 0 becomes 1 and
    // the request latch clears.
    configuration.processors[0].borrow_mut().request_interrupt();
    assert!(step(&configuration));
    let state = Rc::clone(&configuration.processors[0].borrow().state);
    let state = state.borrow();
    assert_eq!(state.level, 1);
    assert_eq!(state.interrupt_requested, false);
}

#[test]
fn inhibit_flag_holds_the_interrupt_off() {
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[]);
    {
        let state = Rc::clone(&configuration.processors[0].borrow().state);
        state.borrow_mut().k_flag[0] = true;
    }
    configuration.processors[0].borrow_mut().request_interrupt();
    assert!(step(&configuration));
    let state = Rc::clone(&configuration.processors[0].borrow().state);
    let state = state.borrow();
    // Still on level 0, the request stays latched.
    assert_eq!(state.level, 0);
    assert_eq!(state.interrupt_requested, true);
}

//------------------------------------------------------------------------------
// Executive
//------------------------------------------------------------------------------

#[test]
fn round_robin_is_fair() {
    let mut configuration = Configuration::empty();
    let bus = Rc::clone(&configuration.bus);
    for slot in 1..=2 {
        let (processor, window) = AlpProcessor::new(slot, AlpKind::Alp1, Rc::clone(&bus));
        bus.borrow_mut()
            .register_active(
                register_window_first(slot),
                register_window_last(slot),
                window,
                processor.clone(),
            )
            .unwrap();
        configuration.processors.push(processor);
    }

    // Both processors chew NULs out of the unregistered ROM region.
    let mut executive = Executive::new(&configuration, 26);
    let mut diagnostics = Diagnostics::new(Rc::clone(&configuration.bus));
    assert_eq!(executive.run(5, &mut diagnostics), RunOutcome::Completed);

    // In 5 steps over 2 devices the split is 3 and 2, strictly
    // alternating, second-registered first.
    let first = configuration.processors[0].borrow().get_preg();
    let second = configuration.processors[1].borrow().get_preg();
    assert_eq!(first, word(0x8004));
    assert_eq!(second, word(0x8006));
}

#[test]
fn break_point_stops_the_run() {
    let configuration = test_crate();
    let mut executive = Executive::new(&configuration, 26);
    let mut diagnostics = Diagnostics::new(Rc::clone(&configuration.bus));

    diagnostics.set_break(word(0x8004));
    assert_eq!(executive.run(100, &mut diagnostics), RunOutcome::BreakPoint);
    // Stopped with the break point address up next, not yet executed.
    assert_eq!(configuration.processors[0].borrow().get_preg(), word(0x8004));

    // Continuing is exempt on the first step, so the run moves past it.
    assert_eq!(executive.run(2, &mut diagnostics), RunOutcome::Completed);
    assert_eq!(configuration.processors[0].borrow().get_preg(), word(0x8008));
}

#[test]
fn decode_error_stops_the_run() {
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[0xFFFF, 0xFF22]);
    let mut executive = Executive::new(&configuration, 26);
    let mut diagnostics = Diagnostics::new(Rc::clone(&configuration.bus));
    assert_eq!(executive.run(10, &mut diagnostics), RunOutcome::DecodeError);
    // P has moved past the faulting word.
    assert_eq!(configuration.processors[0].borrow().get_preg(), word(0x9004));
}

#[test]
fn executive_injects_clock_interrupts_into_the_primary() {
    let configuration = test_crate();
    load_program(&configuration, word(0x9000), &[]);
    {
        let bus = configuration.bus.borrow();
        bus.set_word(CLOCK_FIRST + 2, 1);
        bus.set_word(CLOCK_FIRST, 1);
    }
    let mut executive = Executive::new(&configuration, 1000);
    let mut diagnostics = Diagnostics::new(Rc::clone(&configuration.bus));
    assert_eq!(executive.run(500, &mut diagnostics), RunOutcome::Completed);
    // The pending interrupt was routed to the processor, which took it.
    assert_eq!(configuration.processors[0].borrow().get_level(), 1);
}

//------------------------------------------------------------------------------
// Serial channels
//------------------------------------------------------------------------------

#[test]
fn serial_input_latches_and_consumes() {
    let serial = Serial::new(SerialType::Input, 0x7B10);
    let script = ScriptPeripheral::new(vec![0x41]);
    {
        let peripheral: PeripheralPtr = script.clone();
        serial.borrow_mut().connect(peripheral);
    }
    let mut serial = serial.borrow_mut();

    // Polling the status latches the byte and reports ready.
    assert_eq!(serial.get_word(0x7B10), XC000);
    assert_eq!(serial.get_word(0x7B12), 0x41);

    // Nothing left: not ready, and the data register reads all-ones.
    assert_eq!(serial.get_word(0x7B10), 0x0000);
    assert_eq!(serial.get_word(0x7B12), ALL_ONES);
}

#[test]
fn serial_input_without_peripheral_is_never_ready() {
    let serial = Serial::new(SerialType::Input, 0x7B10);
    assert_eq!(serial.borrow_mut().get_word(0x7B10), 0x0000);
}

#[test]
fn serial_output_forwards_the_low_byte() {
    let serial = Serial::new(SerialType::Output, 0x7B14);
    let script = ScriptPeripheral::new(Vec::new());
    {
        let peripheral: PeripheralPtr = script.clone();
        serial.borrow_mut().connect(peripheral);
    }
    {
        let mut serial = serial.borrow_mut();
        assert_eq!(serial.get_word(0x7B14), XC000); // always ready
        serial.set_word(0x7B16, 0x1234);
        serial.set_word(0x7B16, 0x0041);
    }
    assert_eq!(script.borrow().written, vec![0x34, 0x41]);
}

//------------------------------------------------------------------------------
// Configuration loader
//------------------------------------------------------------------------------

const CRATE_INI: &str = "
[System]
NumberDevices=7
NumberPeripherals=2

[Peripheral1]
Kind=TapeReader
DefaultName=papertape.bin

[Peripheral2]
Kind=TapePunch
DefaultName=punchout.txt

[Device1]
Kind=ALP1
Processor=1

[Device2]
Kind=MemoryController
Address=0x7B00

[Device3]
Kind=RAM
Number=1

[Device4]
Kind=ROM
Filename=rom.bin

[Device5]
Kind=Clock
Address=0x7C00

[Device6]
Kind=Serial
Type=Input
Status=0x7B18
Peripheral=1

[Device7]
Kind=Serial
Type=Output
Status=0x7B1C
Peripheral=2
";

#[test]
fn configuration_assembles_a_full_crate() {
    let configuration = Configuration::from_ini_text(CRATE_INI, "test").unwrap();
    assert_eq!(configuration.processors.len(), 1);
    assert!(configuration.mapper.is_some());
    assert!(configuration.clock.is_some());
    assert_eq!(configuration.peripherals.len(), 2);
    assert_eq!(configuration.tape_readers.len(), 1);
    assert_eq!(configuration.tape_punches.len(), 1);
    assert_eq!(configuration.bus.borrow().device_count(), 7);
    assert_eq!(configuration.bus.borrow().active_devices().len(), 1);
}

#[test]
fn configuration_errors() {
    // No devices at all.
    assert!(Configuration::from_ini_text("[System]\n", "test").is_err());

    // Unknown device kind.
    let text = "[System]\nNumberDevices=1\n[Device1]\nKind=Teleprinter\n";
    assert!(Configuration::from_ini_text(text, "test").is_err());

    // RAM with no controller in front of it.
    let text = "[System]\nNumberDevices=1\n[Device1]\nKind=RAM\nNumber=1\n";
    assert!(Configuration::from_ini_text(text, "test").is_err());

    // Serial pointing at a peripheral that does not exist.
    let text = "[System]\nNumberDevices=1\n[Device1]\nKind=Serial\nType=Input\nStatus=0x7B10\nPeripheral=3\n";
    assert!(Configuration::from_ini_text(text, "test").is_err());

    // Overlapping devices: two clocks.
    let text = "[System]\nNumberDevices=2\n[Device1]\nKind=Clock\n[Device2]\nKind=Clock\n";
    assert!(Configuration::from_ini_text(text, "test").is_err());

    // Bad processor slot.
    let text = "[System]\nNumberDevices=1\n[Device1]\nKind=ALP1\nProcessor=3\n";
    assert!(Configuration::from_ini_text(text, "test").is_err());
}

//------------------------------------------------------------------------------
// Disassembler
//------------------------------------------------------------------------------

#[test]
fn disassembler_mnemonics() {
    let configuration = test_crate();
    let diagnostics = Diagnostics::new(Rc::clone(&configuration.bus));
    let bus = configuration.bus.borrow();

    let at = |addr: i16, data: u16, expected: &str| {
        bus.set_word(addr, data as i16);
        let rendered = diagnostics.render_instruction(addr);
        assert_eq!(rendered, expected, "={:04X}", data);
    };

    at(word(0x9000), 0xE005, "SETA     5,L");
    at(word(0x9000), 0x0005, "SETA   .+7,P");
    at(word(0x9000), 0xC004, "J      .+6");
    at(word(0x9000), 0xE740, "SHLA     1,LC");
    at(word(0x9000), 0xFF01, "SETL     1");
    at(word(0x9000), 0xFFFF, "NUL");
    at(word(0x9000), 0xFF20, "CLRK");

    // Conditional jump naming leans on the preceding instruction.
    bus.set_word(word(0x9000), 0xE305u16 as i16); // a compare
    at(word(0x9002), 0xD402, "JEQ    .+4");
    bus.set_word(word(0x9000), 0xE005u16 as i16); // a load of A
    at(word(0x9002), 0xD402, "JEZA    .+4");
    bus.set_word(word(0x9000), 0xFFFFu16 as i16); // neither
    at(word(0x9002), 0xD402, "JCS    .+4");
}
