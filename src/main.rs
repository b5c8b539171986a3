use std::env;
use std::process::exit;

use locus16::{Configuration, Emulator, LOCUS16_VERSION};

const PREAMBLE_TEXT: &str = "\
Locus 16 Emulator - a bit-exact model of the Locus 16 mini computer:
ALP processors, paged RAM, ROM, interval clock and serial channels on a
shared data bus, with a line-oriented debugger in charge.";

const USAGE_TEXT: &str = "\
usage: locus16 [OPTIONS] program [punchfile]
       locus16 [-h | --help]

program                 paper tape file loaded into the tape reader
punchfile               tape punch output file (default punchout.txt)

-s, --sleep NUMBER      pacing modulo, sleeps 1 uSec every NUMBER
                        instructions (default 26)
-h, --help              show help and exit
-u, --usage             show this usage and exit
-l, --license           show licence information and exit
-w, --warranty          show warranty information and exit
-r, --redistribute      show redistribution information and exit
-v, --version           show version and exit

The crate configuration is read from locus16.ini in the working
directory. Exit codes: 0 success, 1 usage error, 2 incomplete crate,
4 configuration error.";

const GENERAL_TEXT: &str = "\
The emulator starts paused in the debugger. Enter HE at the prompt for
the debugger command summary, CU to set the crate running, and ^C to
get back to the prompt.";

const LICENSE_TEXT: &str = "\
This program is free software, distributed in the hope that it will be
useful but WITHOUT ANY WARRANTY. See the accompanying warranty and
redistribution notes for details.";

const WARRANTY_TEXT: &str = "\
There is no warranty for this program, to the extent permitted by
applicable law. The entire risk as to the quality and performance of
the program is with you.";

const REDISTRIBUTE_TEXT: &str = "\
You may redistribute copies of this program provided this notice and
the licence information are preserved.";

fn version() {
    println!("Locus 16 Emulator Version {}", LOCUS16_VERSION);
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() {
        eprintln!("missing arguments");
        eprintln!("{}", USAGE_TEXT);
        exit(1);
    }

    match args[0].as_str() {
        "-h" | "--help" => {
            version();
            println!();
            println!("{}", USAGE_TEXT);
            println!();
            println!("{}", GENERAL_TEXT);
            exit(0);
        }
        "-u" | "--usage" => {
            println!("{}", USAGE_TEXT);
            exit(0);
        }
        "-l" | "--license" => {
            println!("{}", LICENSE_TEXT);
            exit(0);
        }
        "-r" | "--redistribute" => {
            println!("{}", REDISTRIBUTE_TEXT);
            exit(0);
        }
        "-w" | "--warranty" => {
            println!("{}", WARRANTY_TEXT);
            exit(0);
        }
        "-v" | "--version" => {
            version();
            exit(0);
        }
        _ => {}
    }

    let mut index = 0;
    let mut sleep_modulo: i64 = 26;
    if args[index] == "-s" || args[index] == "--sleep" {
        if args.len() < index + 2 {
            eprintln!("missing sleep option value");
            eprintln!("{}", USAGE_TEXT);
            exit(1);
        }
        match args[index + 1].parse::<i64>() {
            Ok(value) if value >= 1 => sleep_modulo = value,
            _ => {
                eprintln!("non integer or non positive sleep option value");
                exit(1);
            }
        }
        index += 2;
    }

    if args.len() <= index {
        eprintln!("missing arguments");
        eprintln!("{}", USAGE_TEXT);
        exit(1);
    }
    let program = args[index].clone();
    let output = if args.len() > index + 1 {
        args[index + 1].clone()
    } else {
        String::from("punchout.txt")
    };

    println!("{}", PREAMBLE_TEXT);
    println!();
    version();

    let configuration = match Configuration::load("locus16.ini") {
        Ok(configuration) => configuration,
        Err(message) => {
            eprintln!("{}", message);
            exit(4);
        }
    };

    let mut emulator = Emulator::new(configuration, sleep_modulo);
    exit(emulator.run(&program, &output));
}
