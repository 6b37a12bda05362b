// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A line-oriented REPL for experimenting with the base-`b` number codec: type a number, get
//! it re-encoded in the output base at the configured precision, along with its raw bit
//! pattern and the inexact flag.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

use std::io::{self, BufRead, Write};
use std::process;

use clap::{App, Arg};
use log::warn;

use tabula::core::errors::{Error, Result};
use tabula::core::num::{
    BackendKind, FormatOptions, NumberFormatter, NumberParser, NumberSystem, Outcome,
    PrecisionContext,
};

const HELP: &str = "\
commands:
  \\base in|out <b>          set the input or output base (2..64)
  \\precision <k>            set the output precision in significand digits
  \\context in|out 32|64|128 use the precise back-end with that working precision
  \\in tool|double|float|raw|reshape
                            select how input lines are interpreted
  \\digits <alphabet>        install a custom digit alphabet
  \\h                        this help
  \\q                        quit
anything else is treated as a number to round-trip";

/// How an input line turns into a value.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum InputMode {
    /// Parse with the configurable number codec.
    Tool,
    /// Parse with the host's double conversion.
    Double,
    /// Parse with the host's single-precision conversion, then widen.
    Float,
    /// Interpret the line as raw IEEE-754 bits in hex.
    Raw,
    /// Re-round the digit sequence without constructing a double.
    Reshape,
}

/// The REPL state: bases, precision, contexts, and the input interpretation mode.
struct Session {
    digits: Option<String>,
    base_in: u32,
    base_out: u32,
    precision: u32,
    context_in: Option<PrecisionContext>,
    context_out: Option<PrecisionContext>,
    mode: InputMode,
}

impl Session {
    fn new(base: u32, precision: u32) -> Session {
        Session {
            digits: None,
            base_in: base,
            base_out: base,
            precision,
            context_in: None,
            context_out: None,
            mode: InputMode::Tool,
        }
    }

    fn system(&self, base: u32) -> Result<NumberSystem> {
        match &self.digits {
            Some(digits) => NumberSystem::with_digits(base, digits, base > 36),
            None => NumberSystem::new(base),
        }
    }

    fn parser(&self) -> Result<NumberParser> {
        let (backend, context) = match self.context_in {
            Some(context) => (BackendKind::Precise, context),
            None => (BackendKind::Fast, PrecisionContext::default()),
        };
        Ok(NumberParser::with_backend(self.system(self.base_in)?, backend, context))
    }

    fn formatter(&self) -> Result<NumberFormatter> {
        let opts = match self.context_out {
            Some(context) => FormatOptions {
                backend: BackendKind::Precise,
                context,
                ..Default::default()
            },
            None => FormatOptions::default(),
        };
        Ok(NumberFormatter::with_options(self.system(self.base_out)?, opts))
    }
}

fn main() {
    pretty_env_logger::init();

    let matches = App::new("Tabula Num")
        .version("1.0")
        .about("Round-trip numbers through the Tabula base-b codec")
        .arg(
            Arg::with_name("base")
                .long("base")
                .short('b')
                .value_name("B")
                .help("The initial input and output base")
                .default_value("30"),
        )
        .arg(
            Arg::with_name("precision")
                .long("precision")
                .short('p')
                .value_name("K")
                .help("The initial output precision")
                .default_value("11"),
        )
        .get_matches();

    let base = matches.value_of("base").and_then(|v| v.parse().ok()).unwrap_or(30);
    let precision = matches.value_of("precision").and_then(|v| v.parse().ok()).unwrap_or(11);

    let mut session = Session::new(base, precision);

    let stdin = io::stdin();
    let mut out = io::stdout();

    loop {
        print!("> ");
        let _ = out.flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => (),
            Err(err) => {
                eprintln!("stdin: {}", err);
                process::exit(1);
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('\\') {
            match run_command(&mut session, command) {
                Ok(true) => break,
                Ok(false) => (),
                Err(err) => println!("error: {}", err),
            }
        }
        else if let Err(err) = round_trip(&session, line) {
            println!("error: {}", err);
        }
    }

    process::exit(0);
}

/// Executes one backslash command. Returns `true` when the session should end.
fn run_command(session: &mut Session, command: &str) -> Result<bool> {
    let mut words = command.split_whitespace();
    let name = words.next().unwrap_or("");

    match name {
        "h" => println!("{}", HELP),
        "q" => return Ok(true),
        "base" => {
            let side = words.next().unwrap_or("");
            let base: u32 = parse_arg(words.next())?;
            // Validate eagerly so a bad base fails here rather than on the next number.
            session.system(base)?;
            match side {
                "in" => session.base_in = base,
                "out" => session.base_out = base,
                _ => return usage("\\base in|out <b>"),
            }
        }
        "precision" => {
            let precision: u32 = parse_arg(words.next())?;
            if precision == 0 {
                return usage("\\precision <k>, k >= 1");
            }
            session.precision = precision;
        }
        "context" => {
            let side = words.next().unwrap_or("");
            let context = match words.next() {
                Some("32") => Some(PrecisionContext::Bits32),
                Some("64") => Some(PrecisionContext::Bits64),
                Some("128") => Some(PrecisionContext::Bits128),
                Some("off") => None,
                _ => return usage("\\context in|out 32|64|128|off"),
            };
            match side {
                "in" => session.context_in = context,
                "out" => session.context_out = context,
                _ => return usage("\\context in|out 32|64|128|off"),
            }
        }
        "in" => {
            session.mode = match words.next() {
                Some("tool") => InputMode::Tool,
                Some("double") => InputMode::Double,
                Some("float") => InputMode::Float,
                Some("raw") => InputMode::Raw,
                Some("reshape") => InputMode::Reshape,
                _ => return usage("\\in tool|double|float|raw|reshape"),
            };
        }
        "digits" => {
            let digits = command.trim_start_matches("digits").trim();
            if digits.is_empty() {
                session.digits = None;
            }
            else {
                session.digits = Some(digits.to_string());
                // Validate against the current bases right away.
                if let Err(err) = session.system(session.base_in.max(session.base_out)) {
                    session.digits = None;
                    return Err(err);
                }
            }
        }
        other => {
            warn!("unknown command {:?}", other);
            println!("unknown command; \\h for help");
        }
    }

    Ok(false)
}

/// Round-trips one number line according to the session's input mode.
fn round_trip(session: &Session, line: &str) -> Result<()> {
    let formatter = session.formatter()?;

    if session.mode == InputMode::Reshape {
        let reshaped = formatter.reshape(line, session.precision)?;
        println!("  {}", reshaped);
        return Ok(());
    }

    let (value, inexact) = match session.mode {
        InputMode::Tool => {
            let mut parser = session.parser()?;
            match parser.parse(line)? {
                Outcome::Number(parsed) => (parsed.value, parsed.inexact),
                Outcome::Sysmiss => {
                    println!("  system-missing");
                    return Ok(());
                }
            }
        }
        InputMode::Double => {
            let value = line.parse::<f64>().map_err(|_| Error::MalformedNumber(
                tabula::core::errors::NumberErrorKind::UnexpectedChar,
            ))?;
            (value, false)
        }
        InputMode::Float => {
            let value = line.parse::<f32>().map_err(|_| Error::MalformedNumber(
                tabula::core::errors::NumberErrorKind::UnexpectedChar,
            ))?;
            (f64::from(value), false)
        }
        InputMode::Raw => {
            let hex = line.trim_start_matches("0x");
            let bits = u64::from_str_radix(hex, 16).map_err(|_| Error::MalformedNumber(
                tabula::core::errors::NumberErrorKind::UnexpectedChar,
            ))?;
            (f64::from_bits(bits), false)
        }
        InputMode::Reshape => unreachable!(),
    };

    let text = formatter.format(value, session.precision)?;
    println!("  {}", text);
    println!("  = {:e}  bits {:016X}{}", value, value.to_bits(), if inexact {
        "  (inexact)"
    }
    else {
        ""
    });

    Ok(())
}

fn parse_arg<T: std::str::FromStr>(word: Option<&str>) -> Result<T> {
    word.and_then(|w| w.parse().ok())
        .ok_or(Error::MalformedNumber(tabula::core::errors::NumberErrorKind::UnexpectedChar))
}

fn usage(text: &str) -> Result<bool> {
    println!("usage: {}", text);
    Ok(false)
}
