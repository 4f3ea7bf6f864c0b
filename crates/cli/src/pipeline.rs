//! Pipeline definition files.
//!
//! A pipeline is an ordered list of `[[column]]` tables in TOML. The first
//! column is the entry column (typed, never generated); every later column
//! needs a prompt and feeds from `source` — or, when `source` is omitted,
//! from the column right before it.

use std::path::Path;

use serde::Deserialize;

use promptgrid_engine::column::ColumnId;
use promptgrid_engine::grid::{Grid, GridError};

use crate::exit_codes::{EXIT_PIPELINE_CYCLE, EXIT_PIPELINE_SOURCE};
use crate::CliError;

#[derive(Debug, Deserialize)]
struct PipelineFile {
    #[serde(default, rename = "column")]
    columns: Vec<ColumnDef>,
}

#[derive(Debug, Deserialize)]
struct ColumnDef {
    label: String,
    #[serde(default)]
    prompt: String,
    source: Option<String>,
}

/// Load and validate a pipeline file into a grid with no rows.
pub fn load(path: &Path) -> Result<Grid, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read {}: {}", path.display(), e)))?;
    parse(&text).map_err(|mut err| {
        err.message = format!("{}: {}", path.display(), err.message);
        err
    })
}

/// Parse and validate pipeline TOML into a grid with no rows.
pub fn parse(text: &str) -> Result<Grid, CliError> {
    let file: PipelineFile = toml::from_str(text)
        .map_err(|e| CliError::pipeline(format!("invalid pipeline TOML: {}", e)))?;

    if file.columns.is_empty() {
        return Err(CliError::pipeline("pipeline defines no columns")
            .with_hint("start from `pgrid init` for a working example"));
    }

    // Labels are the source-reference namespace; duplicates would make
    // references ambiguous.
    for (i, def) in file.columns.iter().enumerate() {
        if def.label.trim().is_empty() {
            return Err(CliError::pipeline(format!("column {} has an empty label", i + 1)));
        }
        if file.columns[..i].iter().any(|d| d.label == def.label) {
            return Err(CliError::pipeline(format!(
                "duplicate column label {:?}",
                def.label
            )));
        }
    }

    let entry = &file.columns[0];
    if entry.source.is_some() {
        return Err(CliError::pipeline(format!(
            "the entry column {:?} cannot have a source",
            entry.label
        )));
    }
    if !entry.prompt.is_empty() {
        return Err(CliError::pipeline(format!(
            "the entry column {:?} does not take a prompt",
            entry.label
        )));
    }

    let mut grid = Grid::new(entry.label.clone());
    let mut ids: Vec<(String, ColumnId)> = vec![(entry.label.clone(), grid.entry_column().id)];

    // Pass 1: create the columns (default sources; rewired below).
    for def in &file.columns[1..] {
        if def.prompt.trim().is_empty() {
            return Err(CliError::pipeline(format!(
                "column {:?} has no prompt",
                def.label
            )));
        }
        let id = grid.add_column(def.label.clone(), def.prompt.clone());
        ids.push((def.label.clone(), id));
    }

    // Clear the default edges from pass 1 before wiring the declared ones:
    // a leftover default could read as a cycle when a later column is
    // referenced forward.
    for (_, id) in &ids[1..] {
        grid.set_column_source(*id, None)
            .expect("clearing a source cannot cycle");
    }

    // Pass 2: resolve source labels, now that every column exists.
    for (i, def) in file.columns.iter().enumerate().skip(1) {
        let source_label = def
            .source
            .as_deref()
            .unwrap_or_else(|| ids[i - 1].0.as_str());
        let source_id = ids
            .iter()
            .find(|(label, _)| label == source_label)
            .map(|(_, id)| *id)
            .ok_or_else(|| CliError {
                code: EXIT_PIPELINE_SOURCE,
                message: format!(
                    "column {:?} names unknown source {:?}",
                    def.label, source_label
                ),
                hint: None,
            })?;

        let id = ids[i].1;
        grid.set_column_source(id, Some(source_id)).map_err(|e| match e {
            GridError::Cycle(cycle) => CliError {
                code: EXIT_PIPELINE_CYCLE,
                message: format!("column {:?}: {}", def.label, cycle),
                hint: None,
            },
            other => CliError::pipeline(other.to_string()),
        })?;
    }

    Ok(grid)
}

/// Sample pipeline written by `pgrid init`.
pub fn sample() -> &'static str {
    r#"# PromptGrid pipeline definition.
# The first column is the entry column: its cells are typed, never generated.
# Every later column needs a prompt; `source` defaults to the previous column.

[[column]]
label = "Input"

[[column]]
label = "Summarize"
prompt = "Summarize the following text in one short paragraph."

[[column]]
label = "Translate"
prompt = "Translate the following text into French."
source = "Summarize"
"#
}

/// Write the sample pipeline to `path`.
pub fn write_sample(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::usage(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    std::fs::write(path, sample())
        .map_err(|e| CliError::io(format!("cannot write {}: {}", path.display(), e)))
}

// ── Tests ───────────────────────────────────────────────────────────
