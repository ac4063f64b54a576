use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use newslabel::data::{dedupe_records, load_records};
use newslabel::export::{
    build_rows, labeled_ids, load_previous_results, read_json, read_output, write_json, write_output,
};
use newslabel::labeling::schema::output_schema;
use newslabel::llm::{backend_from_config, GenerateOptions};
use newslabel::resolve::{join_accepted, resolve_batch};
use newslabel::{Config, LabelingEngine, Registry, ResolvedRecord};

const RESOLUTION_RESULTS: &str = "resolution_results.json";
const RESOLVED_RECORDS: &str = "resolved_records.json";
const REJECTED_RECORDS: &str = "rejected_records.json";
const OUTPUT_TABLE: &str = "labeled_events.csv";

fn artifact(output_dir: &Path, name: &str) -> PathBuf {
    output_dir.join(name)
}

pub fn resolve(config: &Config, input: &Path, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let registry = Registry::load(Path::new(&config.registry.path))
        .with_context(|| format!("Failed to load registry {}", config.registry.path))?;

    let records = dedupe_records(load_records(input)?);
    let previous = load_previous_results(&artifact(output_dir, RESOLUTION_RESULTS))?;

    let (results, report) = resolve_batch(&records, &registry, &config.resolution, &previous);

    let accepted = join_accepted(&records, &results);
    let rejected: Vec<ResolvedRecord> = records
        .iter()
        .zip(&results)
        .filter(|(_, result)| !result.is_accepted())
        .map(|(record, result)| ResolvedRecord {
            record: record.clone(),
            resolution: result.clone(),
        })
        .collect();

    write_json(&artifact(output_dir, RESOLUTION_RESULTS), &results)?;
    write_json(&artifact(output_dir, RESOLVED_RECORDS), &accepted)?;
    write_json(&artifact(output_dir, REJECTED_RECORDS), &rejected)?;

    let table = artifact(output_dir, OUTPUT_TABLE);
    let existing = read_output(&table)?;
    write_output(&table, &build_rows(&accepted, &[], &existing))?;

    println!("\nResolution complete");
    println!("   Records: {}", report.total);
    println!(
        "   Accepted: {} (explicit {}, name {})",
        report.accepted(),
        report.accepted_explicit,
        report.accepted_name
    );
    println!(
        "   Rejected: {} ambiguous, {} low confidence, {} no match",
        report.rejected_ambiguous, report.rejected_low_confidence, report.rejected_no_match
    );
    println!("   Carried over: {}", report.passed_through);
    println!("   Output: {}", table.display());

    Ok(())
}

pub async fn label(config: &Config, output_dir: &Path, limit: Option<usize>) -> Result<()> {
    let accepted: Vec<ResolvedRecord> = read_json(&artifact(output_dir, RESOLVED_RECORDS))
        .context("Run `newslabel resolve` first")?;

    let table = artifact(output_dir, OUTPUT_TABLE);
    let existing = read_output(&table)?;
    let done = labeled_ids(&existing);

    let mut pending: Vec<ResolvedRecord> = accepted
        .iter()
        .filter(|r| !done.contains(&r.record.event_id))
        .cloned()
        .collect();
    if let Some(limit) = limit {
        pending.truncate(limit);
    }

    if pending.is_empty() {
        info!(labeled = done.len(), "Nothing left to label");
        println!("\nAll {} resolved record(s) are already labeled", accepted.len());
        return Ok(());
    }

    let backend = backend_from_config(&config.llm)?;
    let engine = LabelingEngine::new(
        backend,
        config.labeling.clone(),
        GenerateOptions::from_config(&config.llm).with_json_schema(&output_schema()),
    );

    match engine.label_batch(pending, &done).await {
        Ok(labels) => {
            write_output(&table, &build_rows(&accepted, &labels, &existing))?;
            let needs_review = labels.iter().filter(|l| l.label_needs_review).count();
            println!("\nLabeling complete");
            println!("   Labeled: {}", labels.len());
            println!("   Needs review: {}", needs_review);
            println!("   Output: {}", table.display());
            Ok(())
        }
        Err(aborted) => {
            // Keep what finished so the next run resumes after it.
            write_output(&table, &build_rows(&accepted, &aborted.completed, &existing))?;
            warn!(
                completed = aborted.completed.len(),
                "Labeling aborted, partial results written"
            );
            Err(aborted).context("Labeling stopped early; rerun `newslabel label` to resume")
        }
    }
}

