use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use comfy_table::Table;
use tracing::{error, info, info_span};

use omop_cli::metadata::load_metadata;
use omop_core::{DocumentOutput, FunctionRegistry, process_document};
use omop_ingest::XmlDocument;

use crate::cli::{ConvertArgs, TablesArgs};
use crate::summary::apply_table_style;
use crate::types::ConvertResult;

pub fn run_tables(args: &TablesArgs) -> Result<()> {
    let metadata = load_metadata(&args.metadata)?;
    let mut table = Table::new();
    table.set_header(vec!["Table", "Expected domain", "Fields", "Root path"]);
    apply_table_style(&mut table);
    for (name, config) in metadata.iter() {
        table.add_row(vec![
            name.to_string(),
            config.expected_domain_id().unwrap_or("-").to_string(),
            config.data_fields().count().to_string(),
            config.root_element().unwrap_or("<missing>").to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn run_convert(args: &ConvertArgs) -> Result<ConvertResult> {
    let metadata = load_metadata(&args.metadata)?;
    let functions = FunctionRegistry::with_builtins();
    let unknown = functions.validate_metadata(&metadata);
    if !unknown.is_empty() {
        for error in &unknown {
            error!(%error, "unknown derivation function");
        }
        bail!(
            "metadata references {} unknown derivation function(s)",
            unknown.len()
        );
    }

    let files = discover_inputs(&args.input)?;
    if files.is_empty() {
        bail!("no .xml documents found under {}", args.input.display());
    }

    let start = Instant::now();
    let mut result = ConvertResult::default();
    for path in files {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let span = info_span!("document", file = %filename);
        let _guard = span.enter();
        match XmlDocument::from_file(&path) {
            Ok(doc) => {
                let output = process_document(&doc, &filename, &metadata, &functions);
                if args.print_records {
                    print_records(&filename, &output);
                }
                tally(&mut result, &output);
                result.documents += 1;
            }
            Err(ingest_error) => {
                error!(error = %ingest_error, "document could not be parsed");
                result.failed.push(filename);
            }
        }
    }
    info!(
        documents = result.documents,
        failed = result.failed.len(),
        elapsed_ms = start.elapsed().as_millis(),
        "conversion finished"
    );
    Ok(result)
}

fn tally(result: &mut ConvertResult, output: &DocumentOutput) {
    for (name, rows) in output.tables() {
        result.tables.entry(name.to_string()).or_default().rows += rows.len();
    }
    for (name, fields) in output.error_fields() {
        result
            .tables
            .entry(name.to_string())
            .or_default()
            .error_fields
            .extend(fields.iter().cloned());
    }
}

/// A single `.xml` file, or every `.xml` file directly inside a directory,
/// sorted for deterministic processing order.
fn discover_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("input {} is neither a file nor a directory", input.display());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(input)
        .with_context(|| format!("read input directory {}", input.display()))?
    {
        let path = entry?.path();
        let is_xml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        if path.is_file() && is_xml {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn print_records(filename: &str, output: &DocumentOutput) {
    for (table, rows) in output.tables() {
        for row in rows {
            let rendered: Vec<String> = row
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            println!("{filename} {table}: {}", rendered.join(", "));
        }
    }
}
