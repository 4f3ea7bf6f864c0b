//! `pgrid run` — batch chain execution over values read from stdin.
//!
//! One entry value per input record; each becomes a row, the commit
//! triggers the chain, and the finished grid is written as CSV or JSON.

use std::io::{Read, Write};
use std::path::PathBuf;

use clap::ValueEnum;

use promptgrid_config::settings::Settings;
use promptgrid_engine::executor::{ChainReport, Generator};
use promptgrid_engine::grid::Grid;
use promptgrid_providers::ProviderError;

use crate::exit_codes::{EXIT_ERROR, EXIT_GENERATION, EXIT_PROVIDER_MISSING_KEY};
use crate::{pipeline, CliError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
}

pub struct RunArgs {
    pub pipeline: PathBuf,
    pub headers: bool,
    pub output: Option<PathBuf>,
    pub to: OutputFormat,
    pub quiet: bool,
    pub verbose: bool,
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let mut grid = pipeline::load(&args.pipeline)?;

    let inputs = read_inputs(std::io::stdin().lock(), args.headers)?;

    // Settings are read here, at the start of the run
    let settings = Settings::load();
    let generator = build_generator(&settings)?;

    let report = run_rows(&mut grid, &inputs, generator.as_ref(), args.quiet);

    let out_label = match args.to {
        OutputFormat::Csv => write_grid_csv(&grid, &args.output)?,
        OutputFormat::Json => write_grid_json(&grid, &args.output)?,
    };

    let stderr_tty = atty::is(atty::Stream::Stderr);
    if !args.quiet && stderr_tty {
        eprintln!("Done: {} rows written to {}", grid.rows().len(), out_label);
    }
    if args.verbose {
        eprintln!("{}", report.log_line());
    }

    if report.failed > 0 {
        let first = report.errors.first();
        return Err(CliError {
            code: EXIT_GENERATION,
            message: format!(
                "{} cell(s) failed generation{}",
                report.failed,
                first
                    .map(|e| format!(" (first: {} — {})", e.cell, e.error))
                    .unwrap_or_default()
            ),
            hint: Some("regenerate failed cells interactively with `pgrid open`".to_string()),
        });
    }

    Ok(())
}

/// Build the active adapter, mapping provider configuration problems onto
/// their exit codes.
pub fn build_generator(
    settings: &Settings,
) -> Result<Box<dyn Generator + Send + Sync>, CliError> {
    promptgrid_providers::from_settings(settings).map_err(|e| {
        let code = match e {
            ProviderError::MissingKey(_) => EXIT_PROVIDER_MISSING_KEY,
            _ => EXIT_ERROR,
        };
        CliError {
            code,
            message: e.to_string(),
            hint: Some("run `pgrid doctor` to inspect the provider configuration".to_string()),
        }
    })
}

/// Read entry values: first field of each CSV record.
pub fn read_inputs(reader: impl Read, headers: bool) -> Result<Vec<String>, CliError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(headers)
        .flexible(true)
        .from_reader(reader);

    let mut inputs = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|e| CliError::io(format!("cannot read stdin: {}", e)))?;
        inputs.push(record.get(0).unwrap_or("").to_string());
    }
    Ok(inputs)
}

/// Append one row per input value and run its chain to completion.
pub fn run_rows(
    grid: &mut Grid,
    inputs: &[String],
    generator: &dyn Generator,
    quiet: bool,
) -> ChainReport {
    let entry = grid.entry_column().id;
    let total = inputs.len();
    let stderr_tty = atty::is(atty::Stream::Stderr);
    let show_progress = !quiet && stderr_tty;

    let mut report = ChainReport::new();
    for (i, value) in inputs.iter().enumerate() {
        let row = grid.add_row();
        let row_report = grid
            .commit_edit(row, entry, value, generator)
            .expect("fresh row and entry column exist");
        if show_progress {
            eprintln!("  row {}/{}: {}", i + 1, total, row_report.log_line());
        }
        report.merge(row_report);
    }
    report
}

/// Write the grid as CSV: one header row of labels, then cell values.
/// Returns the output label for progress messages.
pub fn write_grid_csv(grid: &Grid, out: &Option<PathBuf>) -> Result<String, CliError> {
    let (writer, out_label) = open_output(out)?;
    let mut csv_writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    let labels: Vec<&str> = grid.columns().iter().map(|h| h.label.as_str()).collect();
    csv_writer
        .write_record(&labels)
        .map_err(|e| CliError::io(format!("CSV write error: {}", e)))?;

    for row in grid.rows() {
        let values: Vec<&str> = row.cells.iter().map(|c| c.value.as_str()).collect();
        csv_writer
            .write_record(&values)
            .map_err(|e| CliError::io(format!("CSV write error: {}", e)))?;
    }

    csv_writer
        .flush()
        .map_err(|e| CliError::io(format!("CSV flush error: {}", e)))?;

    Ok(out_label)
}

/// Write the grid as JSON: one object per row, keyed by column label, with
/// value, status, and error detail per cell.
pub fn write_grid_json(grid: &Grid, out: &Option<PathBuf>) -> Result<String, CliError> {
    let rows: Vec<serde_json::Value> = grid
        .rows()
        .iter()
        .map(|row| {
            let mut obj = serde_json::Map::new();
            for (header, cell) in grid.columns().iter().zip(&row.cells) {
                obj.insert(
                    header.label.clone(),
                    serde_json::json!({
                        "value": cell.value,
                        "status": cell.status.as_str(),
                        "error": cell.error,
                    }),
                );
            }
            serde_json::Value::Object(obj)
        })
        .collect();

    let (mut writer, out_label) = open_output(out)?;
    serde_json::to_writer_pretty(&mut writer, &rows)
        .map_err(|e| CliError::io(format!("JSON write error: {}", e)))?;
    writer
        .write_all(b"\n")
        .and_then(|_| writer.flush())
        .map_err(|e| CliError::io(format!("JSON write error: {}", e)))?;

    Ok(out_label)
}

fn open_output(out: &Option<PathBuf>) -> Result<(Box<dyn Write>, String), CliError> {
    match out {
        Some(path) => {
            let f = std::fs::File::create(path).map_err(|e| {
                CliError::io(format!("cannot create {}: {}", path.display(), e))
            })?;
            Ok((
                Box::new(std::io::BufWriter::new(f)),
                path.display().to_string(),
            ))
        }
        None => Ok((
            Box::new(std::io::BufWriter::new(std::io::stdout().lock())),
            "stdout".to_string(),
        )),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use promptgrid_engine::cell::CellStatus;
    use promptgrid_providers::LocalClient;

    use httpmock::prelude::*;

    #[test]
    fn test_read_inputs_plain_lines() {
        let inputs = read_inputs("alpha\nbeta\n".as_bytes(), false).unwrap();
        assert_eq!(inputs, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_read_inputs_takes_first_field_and_skips_header() {
        let inputs = read_inputs("text,notes\nalpha,x\nbeta,y\n".as_bytes(), true).unwrap();
        assert_eq!(inputs, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_run_rows_against_local_endpoint() {
        let server = MockServer::start();

        // The summarize step matches on its prompt in the payload…
        server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_includes("Summarize the following text");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({
                    "choices": [{ "message": { "role": "assistant", "content": "Short summary" } }]
                }));
        });
        // …and the translate step on its own
        server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_includes("Translate the following text");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({
                    "choices": [{ "message": { "role": "assistant", "content": "Résumé court" } }]
                }));
        });

        let mut grid = pipeline::parse(pipeline::sample()).unwrap();
        let client = LocalClient::new(server.base_url(), "test-model");

        let report = run_rows(&mut grid, &["Long text...".to_string()], &client, true);

        assert_eq!(report.generated, 2);
        assert_eq!(report.failed, 0);

        let row = &grid.rows()[0];
        assert_eq!(row.cells[0].value, "Long text...");
        assert_eq!(row.cells[1].value, "Short summary");
        assert_eq!(row.cells[1].status, CellStatus::Succeeded);
        assert_eq!(row.cells[2].value, "Résumé court");
        assert_eq!(row.cells[2].status, CellStatus::Succeeded);
    }

    #[test]
    fn test_run_rows_upstream_failure_marks_cell_and_continues() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(500).body("model exploded");
        });

        let mut grid = pipeline::parse(pipeline::sample()).unwrap();
        let client = LocalClient::new(server.base_url(), "test-model");

        let report = run_rows(
            &mut grid,
            &["first".to_string(), "second".to_string()],
            &client,
            true,
        );

        // Summarize failed for both rows; Translate was never attempted
        assert_eq!(report.failed, 2);
        assert_eq!(grid.rows().len(), 2);
        for row in grid.rows() {
            assert_eq!(row.cells[1].status, CellStatus::Failed);
            assert!(row.cells[1].error.as_deref().unwrap().contains("model exploded"));
            assert_eq!(row.cells[2].status, CellStatus::Idle);
        }
    }

    #[test]
    fn test_write_grid_csv_to_file() {
        let mut grid = pipeline::parse(pipeline::sample()).unwrap();
        let row = grid.add_row();
        let entry = grid.entry_column().id;
        grid.edit_cell(row, entry, "hello").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_grid_csv(&grid, &Some(path.clone())).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "Input,Summarize,Translate\nhello,,\n");
    }

    #[test]
    fn test_write_grid_json_shape() {
        let mut grid = pipeline::parse(pipeline::sample()).unwrap();
        let row = grid.add_row();
        let entry = grid.entry_column().id;
        grid.edit_cell(row, entry, "hello").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_grid_json(&grid, &Some(path.clone())).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let rows: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(rows[0]["Input"]["value"], "hello");
        assert_eq!(rows[0]["Input"]["status"], "idle");
        assert_eq!(rows[0]["Summarize"]["value"], "");
    }
}
