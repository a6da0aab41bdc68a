use clap::{Arg, ArgAction, Command, value_parser};
use clap_num::maybe_hex;
use exhume_indexdat::output::{self, OutputFormat};
use exhume_indexdat::scan::ScanMode;
use exhume_indexdat::timestamp::TimestampFormat;
use exhume_indexdat::{IndexDat, ScanOptions};
use log::{debug, error, info};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let matches = Command::new("exhume_indexdat")
        .version(env!("CARGO_PKG_VERSION"))
        .author("ForensicXlab")
        .about("Exhume the browsing activity records from an index.dat history file.")
        .arg(
            Arg::new("file")
                .value_parser(value_parser!(String))
                .required(true)
                .help("The path to the index.dat file."),
        )
        .arg(
            Arg::new("deleted")
                .short('d')
                .long("deleted")
                .action(ArgAction::SetTrue)
                .help("Undelete activity records by sweeping every block instead of the hash directory."),
        )
        .arg(
            Arg::new("delimiter")
                .short('t')
                .long("delimiter")
                .value_parser(value_parser!(String))
                .default_value("\t")
                .help("Field delimiter (TAB by default)."),
        )
        .arg(
            Arg::new("iso")
                .short('i')
                .long("iso")
                .action(ArgAction::SetTrue)
                .help("Use ISO 8601 format for time stamps."),
        )
        .arg(
            Arg::new("header")
                .long("header")
                .action(ArgAction::SetTrue)
                .help("Display the index.dat header information and exit."),
        )
        .arg(
            Arg::new("record")
                .long("record")
                .value_parser(maybe_hex::<u64>)
                .help("Decode a single record at this offset (decimal or hex)."),
        )
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Output records (or the header) in JSON format, one object per line."),
        )
        .arg(
            Arg::new("table")
                .long("table")
                .action(ArgAction::SetTrue)
                .conflicts_with("json")
                .help("Render the records as a table."),
        )
        .arg(
            Arg::new("keep_unknown")
                .long("keep-unknown")
                .action(ArgAction::SetTrue)
                .help("Emit an empty row for every candidate with an unknown record type."),
        )
        .arg(
            Arg::new("log_level")
                .short('l')
                .long("log-level")
                .value_parser(["error", "warn", "info", "debug", "trace"])
                .default_value("info")
                .help("Set the log verbosity level"),
        )
        .get_matches();

    // Initialize logger.
    let log_level_str = matches
        .get_one::<String>("log_level")
        .map(String::as_str)
        .unwrap_or("info");
    let level_filter = match log_level_str {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };
    env_logger::Builder::new().filter_level(level_filter).init();

    let Some(file_path) = matches.get_one::<String>("file") else {
        error!("No index.dat file given.");
        return ExitCode::from(2);
    };
    let json_output = matches.get_flag("json");
    let options = ScanOptions {
        mode: if matches.get_flag("deleted") {
            ScanMode::Deleted
        } else {
            ScanMode::Active
        },
        format: if matches.get_flag("iso") {
            TimestampFormat::Iso8601
        } else {
            TimestampFormat::Calendar
        },
    };
    let out_format = if json_output {
        OutputFormat::JsonLines
    } else if matches.get_flag("table") {
        OutputFormat::Table
    } else {
        let delim = matches
            .get_one::<String>("delimiter")
            .cloned()
            .unwrap_or_else(|| "\t".to_string());
        OutputFormat::Delimited(delim)
    };

    info!("History File: {}", file_path);
    let file = match File::open(file_path) {
        Ok(f) => f,
        Err(e) => {
            error!("The index.dat file cannot be opened: {}", e);
            return ExitCode::from(3);
        }
    };
    let mut index = match IndexDat::new(BufReader::new(file)) {
        Ok(index) => index,
        Err(e) => {
            error!("Couldn't read index.dat: {}", e);
            return ExitCode::from(3);
        }
    };
    debug!("Logical size 0x{:X}", index.size());

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if matches.get_flag("header") {
        let rendered = if json_output {
            serde_json::to_string_pretty(&index.header.to_json())
                .unwrap_or_else(|e| format!("Error serializing header to JSON: {}", e))
        } else {
            index.header.to_string()
        };
        return match writeln!(out, "{}", rendered).and_then(|_| out.flush()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Cannot write output: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let written = if let Some(offset) = matches.get_one::<u64>("record") {
        let decoded = index.record_at(*offset, options.format);
        if !decoded.corruptions.is_empty() {
            info!(
                "Record at 0x{:X} has {} damaged field(s).",
                offset,
                decoded.corruptions.len()
            );
        }
        output::write_records(&mut out, [decoded.record], &out_format, true)
    } else {
        let keep_unknown = matches.get_flag("keep_unknown");
        output::write_records(&mut out, index.records(options), &out_format, keep_unknown)
    };

    match written {
        Ok(n) => {
            info!("{} record(s) written.", n);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Cannot write output: {}", e);
            ExitCode::FAILURE
        }
    }
}
