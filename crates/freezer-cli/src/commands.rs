//! Command handlers for freezerctl
//!
//! Each handler runs against an already opened `Freezer`. Handlers that
//! modify the dataset finish with a Sync (via `close`) so the process never
//! exits with records only in memory.

use crate::format::Output;
use anyhow::{Context, Result};
use freezer_core::{encode_hex, AncientRecord, FieldKind};
use freezer_storage::Freezer;
use serde_json::json;
use std::io::{BufWriter, Write};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn status(freezer: &Freezer, output: &Output, metrics: bool) -> Result<()> {
    let status = freezer.status().await;
    let cache = freezer.cache_stats();

    output.print_fields(
        "Freezer",
        &[
            ("frozen", json!(status.frozen)),
            ("durable", json!(status.durable)),
            ("buffered", json!(status.buffered)),
            ("group_size", json!(status.group_size)),
            ("cache_hits", json!(cache.hits)),
            ("cache_misses", json!(cache.misses)),
        ],
    )?;

    if metrics {
        print!("{}", freezer_observability::gather_text()?);
    }

    Ok(())
}

pub async fn get(freezer: &Freezer, output: &Output, kind: FieldKind, number: u64) -> Result<()> {
    let value = freezer
        .ancient(kind, number)
        .await
        .with_context(|| format!("Failed to read {kind} of record {number}"))?;

    output.print_fields(
        &format!("Record {number}"),
        &[
            ("number", json!(number)),
            ("kind", json!(kind.table_name())),
            ("value", json!(encode_hex(&value))),
        ],
    )
}

pub async fn truncate(freezer: &Freezer, output: &Output, target: u64) -> Result<()> {
    let before = freezer.ancients();
    freezer
        .truncate_ancients(target)
        .await
        .with_context(|| format!("Failed to truncate to {target}"))?;
    freezer.close().await?;

    output.print_success(&format!("Truncated {before} → {}", freezer.ancients()));
    output.print_fields(
        "Truncate",
        &[
            ("before", json!(before)),
            ("frozen", json!(freezer.ancients())),
        ],
    )
}

pub async fn repair(freezer: &Freezer, output: &Output) -> Result<()> {
    let report = freezer.repair().await.context("Repair failed")?;

    output.print_fields(
        "Repair",
        &[
            ("marker_before", json!(report.marker_before)),
            ("marker_after", json!(report.marker_after)),
            ("buffered", json!(report.buffered)),
            ("orphans_deleted", json!(report.orphans_deleted)),
        ],
    )
}

/// Append every record of a JSON-lines file after the current frozen count.
///
/// Blank lines are skipped. A malformed line aborts the import; batches
/// appended before it stay committed.
pub async fn import(freezer: &Freezer, output: &Output, path: &Path, batch: usize) -> Result<()> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let batch = batch.max(1);
    let first = freezer.ancients();
    let mut next = first;
    let mut pending = Vec::with_capacity(batch);
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let record = AncientRecord::from_json_line(&line)
            .with_context(|| format!("{}:{line_no}", path.display()))?;
        pending.push(record);

        if pending.len() >= batch {
            next = freezer
                .append_batch(next, std::mem::take(&mut pending))
                .await?;
            freezer.sync().await.context("Sync failed during import")?;
        }
    }
    if !pending.is_empty() {
        next = freezer.append_batch(next, pending).await?;
    }
    freezer.close().await.context("Final sync failed")?;

    tracing::info!(first, count = next - first, "Import complete");
    output.print_success(&format!("Imported {} records", next - first));
    output.print_fields(
        "Import",
        &[
            ("first", json!(first)),
            ("count", json!(next - first)),
            ("frozen", json!(next)),
        ],
    )
}

/// Write records `[from, to)` as JSON lines, clamped to the frozen count.
pub async fn export(
    freezer: &Freezer,
    output: &Output,
    from: u64,
    to: u64,
    path: Option<&Path>,
) -> Result<()> {
    let end = to.min(freezer.ancients());
    let mut writer: Box<dyn Write> = match path {
        Some(path) => Box::new(BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    let mut written = 0u64;
    for number in from..end {
        let record = freezer
            .ancient_record(number)
            .await
            .with_context(|| format!("Failed to read record {number}"))?;
        writeln!(writer, "{}", record.to_json_line()?)?;
        written += 1;
    }
    writer.flush()?;

    tracing::info!(from, end, written, "Export complete");
    // Records went to stdout; keep it clean.
    if let Some(path) = path {
        output.print_fields(
            "Export",
            &[
                ("from", json!(from)),
                ("count", json!(written)),
                ("path", json!(path.display().to_string())),
            ],
        )?;
    }

    Ok(())
}
