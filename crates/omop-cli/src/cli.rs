//! CLI argument definitions for the CCDA to OMOP converter.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "ccda-omop",
    version,
    about = "Convert CCDA clinical documents to OMOP CDM tables",
    long_about = "Convert CCDA XML documents to OMOP CDM table rows.\n\n\
                  Field resolution is driven by a JSON metadata file of per-table\n\
                  parse configurations; visits are reconciled into a hierarchy and\n\
                  clinical events are linked to them by time."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Convert a CCDA document, or a directory of them, to OMOP rows.
    Convert(ConvertArgs),

    /// Show the tables a metadata file defines.
    Tables(TablesArgs),
}

#[derive(Parser)]
pub struct ConvertArgs {
    /// A CCDA .xml file, or a directory scanned for .xml files.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Metadata JSON file with the per-table parse configurations.
    #[arg(long = "metadata", value_name = "PATH")]
    pub metadata: PathBuf,

    /// Print every produced row to stdout.
    #[arg(long = "print-records")]
    pub print_records: bool,
}

#[derive(Parser)]
pub struct TablesArgs {
    /// Metadata JSON file to inspect.
    #[arg(value_name = "METADATA")]
    pub metadata: PathBuf,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
