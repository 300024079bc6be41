//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::SelectionConfig;
use crate::pipeline::run_selection;
use cutflow_core::{
    Cutflow, CutflowError, CutflowRecords, EventBatch, RunOutput, run_output_from_bytes,
    run_output_to_bytes,
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a JSON batch (1 GB).
const MAX_BATCH_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Maximum size of a selection config (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Maximum size of a run output file (1 GB).
const MAX_OUTPUT_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), CutflowError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| CutflowError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(CutflowError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Validate an input path: it must resolve to an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, CutflowError> {
    let canonical = path.canonicalize().map_err(|e| {
        CutflowError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(CutflowError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Validate an output path: its parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, CutflowError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        CutflowError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(CutflowError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| CutflowError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read a file after path and size validation.
fn read_validated(path: &Path, max_size: u64) -> Result<Vec<u8>, CutflowError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, max_size)?;
    std::fs::read(&validated)
        .map_err(|e| CutflowError::IoError(format!("Read '{}': {}", path.display(), e)))
}

// =============================================================================
// LOADERS
// =============================================================================

/// Load a JSON event batch.
pub fn load_batch(path: &Path) -> Result<EventBatch, CutflowError> {
    let data = read_validated(path, MAX_BATCH_FILE_SIZE)?;
    serde_json::from_slice(&data)
        .map_err(|e| CutflowError::DeserializationError(format!("Batch '{}': {}", path.display(), e)))
}

/// Load and validate a TOML selection config.
pub fn load_config(path: &Path) -> Result<SelectionConfig, CutflowError> {
    let data = read_validated(path, MAX_CONFIG_FILE_SIZE)?;
    let contents = String::from_utf8(data)
        .map_err(|e| CutflowError::Config(format!("Config '{}' is not UTF-8: {}", path.display(), e)))?;
    SelectionConfig::from_toml_str(&contents)
}

/// Load a binary run output.
pub fn load_run_output(path: &Path) -> Result<RunOutput, CutflowError> {
    let data = read_validated(path, MAX_OUTPUT_FILE_SIZE)?;
    run_output_from_bytes(&data)
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Run a selection and write its output.
pub fn cmd_run(batch: &Path, config: &Path, output: &Path, json_mode: bool) -> Result<(), CutflowError> {
    let validated_output = validate_output_path(output)?;
    let events = load_batch(batch)?;
    let selection = load_config(config)?;

    tracing::info!(events = events.len(), steps = selection.steps.len(), "running selection");
    let result = run_selection(events, selection)?;

    let data = run_output_to_bytes(&result)?;
    std::fs::write(&validated_output, &data)
        .map_err(|e| CutflowError::IoError(format!("Write file: {}", e)))?;

    if json_mode {
        let summary = serde_json::json!({
            "output": validated_output.to_string_lossy(),
            "bytes": data.len(),
            "final_events": result.final_batch.len(),
            "steps": result.graph.len(),
            "snapshots": result.snapshots.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "cutflow_rows": result.cutflow.total_rows(),
        });
        println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());
        return Ok(());
    }

    println!("Wrote {} bytes to {:?}", data.len(), validated_output);
    println!("Final events: {}", result.final_batch.len());
    println!();
    print!("{}", render_records(&result.cutflow));
    Ok(())
}

// =============================================================================
// SHOW COMMAND
// =============================================================================

/// Show the cutflow and snapshots of a run output.
pub fn cmd_show(input: &Path, json_mode: bool) -> Result<(), CutflowError> {
    let output = load_run_output(input)?;

    if json_mode {
        println!("{}", records_json(&output.cutflow));
        return Ok(());
    }

    print!("{}", render_records(&output.cutflow));
    println!();
    println!("Snapshots");
    println!("=========");
    for snapshot in output.snapshots.iter() {
        println!(
            "{:<20} step={:<16} events={}",
            snapshot.name(),
            snapshot.step(),
            snapshot.len()
        );
    }
    Ok(())
}

// =============================================================================
// MERGE COMMAND
// =============================================================================

/// Sum the cutflow record sets of several run outputs, set by set.
pub fn merge_cutflows(inputs: &[PathBuf]) -> Result<CutflowRecords, CutflowError> {
    let mut merged = CutflowRecords::default();
    for input in inputs {
        let output = load_run_output(input)?;
        merged.merge(&output.cutflow);
        tracing::debug!(input = %input.display(), rows = output.cutflow.total_rows(), "merged cutflow");
    }
    Ok(merged)
}

/// Merge and print the cutflows of several run outputs.
pub fn cmd_merge(inputs: &[PathBuf], json_mode: bool) -> Result<(), CutflowError> {
    let merged = merge_cutflows(inputs)?;

    if json_mode {
        println!("{}", records_json(&merged));
        return Ok(());
    }

    println!("Merged {} run outputs", inputs.len());
    println!();
    print!("{}", render_records(&merged));
    Ok(())
}

// =============================================================================
// HASH COMMAND
// =============================================================================

/// Print snapshot fingerprints.
pub fn cmd_hash(input: &Path, json_mode: bool) -> Result<(), CutflowError> {
    let output = load_run_output(input)?;

    if json_mode {
        let hashes: Vec<_> = output
            .snapshots
            .iter()
            .map(|s| {
                serde_json::json!({
                    "name": s.name(),
                    "step": s.step(),
                    "events": s.len(),
                    "checksum": s.checksum(),
                    "blake3": s.crypto_hash(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&hashes).unwrap_or_default());
        return Ok(());
    }

    for snapshot in output.snapshots.iter() {
        println!("{}", snapshot.name());
        println!("  Checksum: {}", snapshot.checksum());
        println!("  BLAKE3:   {}", snapshot.crypto_hash());
    }
    Ok(())
}

// =============================================================================
// RENDERING
// =============================================================================

/// Format a cutflow as a text table.
pub fn render_cutflow(cutflow: &Cutflow) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<20} {:<12} {:>10} {:>14} {:>12} {:>10}\n",
        "Step", "Category", "Raw", "Weighted", "Uncertainty", "Eff."
    ));
    out.push_str(&format!("{}\n", "-".repeat(83)));
    for row in cutflow.rows() {
        let efficiency = cutflow
            .efficiency(row)
            .map(|e| format!("{:.4}", e))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<20} {:<12} {:>10} {:>14.3} {:>12.3} {:>10}\n",
            row.step,
            row.category,
            row.raw,
            row.weighted,
            row.uncertainty(),
            efficiency
        ));
    }
    out
}

/// Format every record set of a run, the explicit one first.
pub fn render_records(records: &CutflowRecords) -> String {
    let mut out = String::new();
    if !records.run().is_empty() {
        out.push_str("Cutflow\n\n");
        out.push_str(&render_cutflow(records.run()));
    }
    for (name, cutflow) in records.snapshots() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("Cutflow of snapshot '{}'\n\n", name));
        out.push_str(&render_cutflow(cutflow));
    }
    out
}

fn cutflow_json(cutflow: &Cutflow) -> serde_json::Value {
    let rows: Vec<_> = cutflow
        .rows()
        .iter()
        .map(|row| {
            serde_json::json!({
                "step": row.step,
                "parent": row.parent,
                "category": row.category,
                "raw": row.raw,
                "weighted": row.weighted,
                "weighted_sq": row.weighted_sq,
                "efficiency": cutflow.efficiency(row),
            })
        })
        .collect();
    serde_json::Value::Array(rows)
}

fn records_json(records: &CutflowRecords) -> String {
    let snapshots: serde_json::Map<String, serde_json::Value> = records
        .snapshots()
        .map(|(name, cutflow)| (name.to_string(), cutflow_json(cutflow)))
        .collect();
    let value = serde_json::json!({
        "run": cutflow_json(records.run()),
        "snapshots": snapshots,
    });
    serde_json::to_string_pretty(&value).unwrap_or_default()
}
