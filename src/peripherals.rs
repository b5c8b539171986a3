// Character peripherals hanging off the serial channels: paper tape in and
// out, and an xterm reached through a pseudo-terminal pair. All descriptors
// are set non-blocking so a poll from the bus can never stall the executive.

use std::cell::RefCell;
use std::ffi::CStr;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

pub type PeripheralPtr = Rc<RefCell<dyn Peripheral>>;

pub trait Peripheral {
    fn name(&self) -> &str;

    fn initialise(&mut self) -> bool {
        true
    }

    fn read_byte(&mut self) -> Option<u8> {
        eprintln!("{}: read_byte not implemented", self.name());
        None
    }

    fn write_byte(&mut self, _value: u8) -> bool {
        eprintln!("{}: write_byte not implemented", self.name());
        false
    }
}

fn set_non_blocking(fd: i32) {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
    }
}

fn read_one(file: &mut Option<File>, name: &str) -> Option<u8> {
    let mut value = [0u8; 1];
    let outcome = match file {
        Some(f) => f.read(&mut value),
        None => return None,
    };
    match outcome {
        Ok(0) => {
            // End of input: the channel polls not-ready from here on.
            *file = None;
            None
        }
        Ok(_) => Some(value[0]),
        Err(error) => {
            if error.kind() != ErrorKind::WouldBlock {
                eprintln!("{}: {}", name, error);
            }
            None
        }
    }
}

fn write_one(file: &mut Option<File>, name: &str, value: u8) -> bool {
    match file {
        Some(f) => match f.write(&[value]) {
            Ok(number) => number == 1,
            Err(error) => {
                if error.kind() != ErrorKind::WouldBlock {
                    eprintln!("{}: {}", name, error);
                }
                false
            }
        },
        None => false,
    }
}

pub struct TapeReader {
    filename: String,
    file: Option<File>,
}

impl TapeReader {
    pub fn new(filename: &str) -> Rc<RefCell<TapeReader>> {
        Rc::new(RefCell::new(TapeReader {
            filename: filename.to_string(),
            file: None,
        }))
    }

    pub fn set_filename(&mut self, filename: &str) {
        self.file = None;
        self.filename = filename.to_string();
    }
}

impl Peripheral for TapeReader {
    fn name(&self) -> &str {
        "Tape Reader"
    }

    fn initialise(&mut self) -> bool {
        match File::open(&self.filename) {
            Ok(file) => {
                set_non_blocking(file.as_raw_fd());
                self.file = Some(file);
                true
            }
            Err(error) => {
                eprintln!("Tape Reader {}: {}", self.filename, error);
                false
            }
        }
    }

    fn read_byte(&mut self) -> Option<u8> {
        read_one(&mut self.file, "Tape Reader")
    }
}

pub struct TapePunch {
    filename: String,
    file: Option<File>,
}

impl TapePunch {
    pub fn new(filename: &str) -> Rc<RefCell<TapePunch>> {
        Rc::new(RefCell::new(TapePunch {
            filename: filename.to_string(),
            file: None,
        }))
    }

    pub fn set_filename(&mut self, filename: &str) {
        self.file = None;
        self.filename = filename.to_string();
    }
}

impl Peripheral for TapePunch {
    fn name(&self) -> &str {
        "Tape Punch"
    }

    fn initialise(&mut self) -> bool {
        match File::create(&self.filename) {
            Ok(file) => {
                set_non_blocking(file.as_raw_fd());
                self.file = Some(file);
                true
            }
            Err(error) => {
                eprintln!("Tape Punch {}: {}", self.filename, error);
                false
            }
        }
    }

    fn write_byte(&mut self, value: u8) -> bool {
        write_one(&mut self.file, "Tape Punch", value)
    }
}

/// An external terminal window. We keep the master side of a pseudo
/// terminal pair, hand it to an xterm child, and talk bytes through the
/// slave side.
pub struct Terminal {
    master_fd: i32,
    slave: Option<File>,
}

impl Terminal {
    pub fn new() -> Rc<RefCell<Terminal>> {
        Rc::new(RefCell::new(Terminal {
            master_fd: -1,
            slave: None,
        }))
    }
}

impl Peripheral for Terminal {
    fn name(&self) -> &str {
        "Terminal"
    }

    fn initialise(&mut self) -> bool {
        let master = unsafe { libc::posix_openpt(libc::O_RDWR) };
        if master < 0 {
            eprintln!("Terminal: could not open pseudo terminal");
            return false;
        }

        let ptname = unsafe {
            let name = libc::ptsname(master);
            if name.is_null() {
                eprintln!("Terminal: could not get pseudo terminal device name");
                return false;
            }
            CStr::from_ptr(name).to_string_lossy().into_owned()
        };

        if unsafe { libc::unlockpt(master) } == -1 {
            eprintln!("Terminal: could not unlock terminal device {}", ptname);
            return false;
        }
        self.master_fd = master;

        // xterm -S{pts tail}/{fd} attaches to the inherited master side.
        // The child gets its own process group so that ^C aimed at the
        // debugger leaves the terminal window alone.
        let tail = ptname.rsplit('/').next().unwrap_or("").to_string();
        let mut command = Command::new("xterm");
        command
            .arg(format!("-S{}/{}", tail, self.master_fd))
            .args(&["-bg", "black", "-fg", "white"])
            .args(&["-fa", "Monospace", "-fs", "10"])
            .args(&["-title", "Locus 16 Emulator Terminal"]);
        command.process_group(0);
        if let Err(error) = command.spawn() {
            eprintln!("Terminal: could not start xterm: {}", error);
            return false;
        }

        // Let the child do its stuff before we open the slave side.
        thread::sleep(Duration::from_millis(200));
        let mut slave = match OpenOptions::new().read(true).write(true).open(&ptname) {
            Ok(file) => file,
            Err(error) => {
                eprintln!("Terminal: could not open {}: {}", ptname, error);
                return false;
            }
        };

        // The first input back is the xterm window id - read and discard,
        // then clear the screen.
        let mut reply = [0u8; 40];
        let _ = slave.read(&mut reply);
        let status = slave.write(b"\x1b[2J");
        set_non_blocking(slave.as_raw_fd());
        self.slave = Some(slave);

        status.is_ok()
    }

    fn read_byte(&mut self) -> Option<u8> {
        read_one(&mut self.slave, "Terminal")
    }

    fn write_byte(&mut self, value: u8) -> bool {
        write_one(&mut self.slave, "Terminal", value)
    }
}
