extern crate clap;
extern crate dirs;
extern crate fnv;
extern crate itertools;
extern crate marksweep;
extern crate rustyline;
extern crate tracing;
extern crate tracing_subscriber;

use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::path::PathBuf;
use std::process;

use clap::{App, Arg};

use rustyline::error::ReadlineError;
use rustyline::Editor;

use tracing_subscriber::EnvFilter;

use marksweep::GcConfig;

mod config;
mod error;
mod model;
mod shell;

use crate::error::ShellError;
use crate::shell::Shell;

/// Read a file into a String
fn load_file(filename: &str) -> Result<String, io::Error> {
    let mut contents = String::new();

    File::open(filename)?.read_to_string(&mut contents)?;

    Ok(contents)
}

/// Print command output, or report a recoverable error and carry on
fn report(result: Result<Vec<String>, ShellError>, context: &str) -> Result<(), ShellError> {
    match result {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
            Ok(())
        }

        Err(err) if err.is_recoverable() => {
            eprintln!("{}error: {}", context, err);
            Ok(())
        }

        Err(err) => Err(err),
    }
}

/// Run every line of a script file
fn read_file(filename: &str, config: GcConfig) -> Result<(), ShellError> {
    let contents = load_file(filename)?;
    let mut shell = Shell::new(config);

    for (count, line) in contents.lines().enumerate() {
        // count starts at 0, line numbers start at 1
        let context = format!("{}:{}: ", filename, count + 1);
        report(shell.execute(line), &context)?;
    }

    Ok(())
}

/// Read and run a command at a time
fn read_print_loop(config: GcConfig) -> Result<(), ShellError> {
    // establish a repl input history file path
    let history_file: Option<PathBuf> = dirs::home_dir().map(|mut path| {
        path.push(".gcsim_history");
        path
    });

    let mut reader = Editor::<()>::new();

    if let Some(ref path) = history_file {
        if let Err(err) = reader.load_history(path) {
            eprintln!("Could not read history: {}", err);
        }
    }

    let mut shell = Shell::new(config);

    loop {
        let readline = reader.readline("gc> ");

        match readline {
            // valid input
            Ok(line) => {
                reader.add_history_entry(line.as_str());
                report(shell.execute(&line), "")?;
            }

            // some kind of program termination condition
            Err(e) => {
                if let Some(ref path) = history_file {
                    reader.save_history(path).unwrap_or_else(|err| {
                        eprintln!("could not save input history in {}: {}", path.display(), err);
                    });
                }

                // EOF is fine
                if let ReadlineError::Eof = e {
                    return Ok(());
                } else {
                    return Err(ShellError::from(e));
                }
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    let matches = App::new("gcsim")
        .about("Drive a mark-sweep heap from the command line")
        .arg(
            Arg::with_name("filename")
                .help("Optional script of heap commands to run")
                .index(1),
        )
        .arg(
            Arg::with_name("growth-factor")
                .long("growth-factor")
                .value_name("FACTOR")
                .help("Collect when the heap grows past FACTOR times its size after the last collection")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("initial-heap")
                .long("initial-heap")
                .value_name("BYTES")
                .help("Heap size baseline before the first collection")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("min-heap")
                .long("min-heap")
                .value_name("BYTES")
                .help("Lowest baseline a collection may commit")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log every collection phase"),
        )
        .get_matches();

    init_logging(matches.is_present("verbose"));

    let config = config::gc_config(&matches).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(2);
    });

    let result = match matches.value_of("filename") {
        Some(filename) => read_file(filename, config),
        None => read_print_loop(config),
    };

    result.unwrap_or_else(|err| {
        eprintln!("Terminated: {}", err);
        process::exit(1);
    });
}
