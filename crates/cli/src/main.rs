//! fsjournal-dump: print the contents of a filesystem operation journal.
//!
//! Two modes:
//! - **Directory mode**: `fsjournal-dump [--dir D] [--ident I] [--term N]`
//!   reads every term of a journal (or one of them) in term order
//! - **File mode**: `fsjournal-dump META DATA` reads one explicit segment pair

mod commands;
mod format;

use std::path::Path;
use std::process;

use fsjournal_durability::{JournalReader, ReadError};
use tracing::{debug, Level};

use commands::build_cli;
use format::{format_dumps, format_error, format_terms, OutputMode, SegmentDump};

fn main() {
    let matches = build_cli().get_matches();

    let level = match matches.get_count("verbose") {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mode = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    match run(&matches, mode) {
        Ok(output) => {
            if !output.is_empty() {
                print!("{}", output);
                if !output.ends_with('\n') {
                    println!();
                }
            }
        }
        Err(e) => {
            eprintln!("{}", format_error(&e, mode));
            process::exit(1);
        }
    }
}

fn run(matches: &clap::ArgMatches, mode: OutputMode) -> Result<String, ReadError> {
    if let (Some(meta), Some(data)) = (
        matches.get_one::<String>("meta"),
        matches.get_one::<String>("data"),
    ) {
        debug!(meta = %meta, data = %data, "Reading segment pair");
        let records = JournalReader::read_files(Path::new(meta), Path::new(data))?;
        return Ok(format_dumps(&[SegmentDump { term: None, records }], mode));
    }

    let dir = matches
        .get_one::<String>("dir")
        .map(String::as_str)
        .unwrap_or("fdl");
    let ident = matches
        .get_one::<String>("ident")
        .map(String::as_str)
        .unwrap_or("fubar");
    let reader = JournalReader::new(dir, ident);
    let terms = reader.terms()?;
    debug!(dir = %dir, ident = %ident, count = terms.len(), "Found terms");

    if matches.get_flag("list") {
        return Ok(format_terms(&terms, mode));
    }

    let selected: Vec<u64> = match matches.get_one::<u64>("term") {
        Some(term) => vec![*term],
        None => terms,
    };
    let mut dumps = Vec::with_capacity(selected.len());
    for term in selected {
        dumps.push(SegmentDump {
            term: Some(term),
            records: reader.read_term(term)?,
        });
    }
    Ok(format_dumps(&dumps, mode))
}
