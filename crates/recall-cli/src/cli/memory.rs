//! Memory commands: serve, reset, ingest, query, demo, check.
//!
//! Every command builds an engine from the configuration, brings it up
//! (Ctrl+C aborts a slow embedding-service startup), runs, and shuts the
//! embedding service down again.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tokio_util::sync::CancellationToken;

use recall_types::memory::{
    IndexOutcome, IngestReport, IntegrityReport, LoadOutcome, QueryOutcome,
};

use crate::state::{AppState, ConcreteEngine};

/// Sample memories used by `recall demo`.
const DEMO_MEMORIES: [&str; 3] = ["I can sing", "I can dance", "I can play basketball"];
const DEMO_QUERY: &str = "What can I do";

/// Build the engine and bring it to the operational state.
async fn start_engine(state: &AppState, reset: bool) -> Result<ConcreteEngine> {
    let mut engine = state.build_engine().await?;

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            crate::shutdown_signal().await;
            cancel.cancel();
        }
    });

    let result = if reset {
        engine.reset_and_bootstrap(&cancel).await
    } else {
        engine.bootstrap(&cancel).await
    };
    interrupt.abort();

    if reset {
        result.context("Failed to reset memory stores")?;
    } else {
        result.context("Failed to start memory engine (run `recall reset` to initialize)")?;
    }
    Ok(engine)
}

/// Bootstrap against existing data and wait for a shutdown signal.
pub async fn serve(state: &AppState) -> Result<()> {
    let mut engine = start_engine(state, false).await?;

    println!();
    println!(
        "  {} Memory engine ready (embedding service on port {})",
        style("⚡").bold(),
        style(state.config.embedding.port).cyan()
    );
    println!("  {}", style("Press Ctrl+C to stop").dim());

    crate::shutdown_signal().await;
    engine.shutdown().await;

    println!("\n  Stopped.");
    Ok(())
}

/// Erase both stores and recreate them.
pub async fn reset(state: &AppState, json: bool) -> Result<()> {
    let mut engine = start_engine(state, true).await?;
    engine.shutdown().await;

    if json {
        println!("{}", serde_json::json!({ "reset": true }));
    } else {
        println!();
        println!(
            "  {} All memories erased; stores recreated in {}",
            style("✓").green().bold(),
            style(state.data_dir.display()).cyan()
        );
        println!();
    }
    Ok(())
}

/// Store texts, optionally after a reset.
pub async fn ingest(state: &AppState, texts: &[String], reset: bool, json: bool) -> Result<()> {
    let mut engine = start_engine(state, reset).await?;
    let report = engine.ingest(texts).await;
    engine.shutdown().await;
    let report = report.context("Ingestion failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_ingest_report(&report);
    }
    Ok(())
}

/// Query the closest memories for each text.
pub async fn query(state: &AppState, texts: &[String], json: bool) -> Result<()> {
    let mut engine = start_engine(state, false).await?;
    let outcome = engine.query(texts).await;
    engine.shutdown().await;
    let outcome = outcome.context("Query failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_query_outcome(&outcome);
    }
    Ok(())
}

/// Reset, ingest the sample memories, and query them.
pub async fn demo(state: &AppState, json: bool) -> Result<()> {
    let mut engine = start_engine(state, true).await?;

    let seed: Vec<String> = DEMO_MEMORIES.iter().map(|t| t.to_string()).collect();
    let queries = vec![DEMO_QUERY.to_string()];

    let result = async {
        let report = engine.ingest(&seed).await?;
        let outcome = engine.query(&queries).await?;
        Ok::<_, recall_types::error::EngineError>((report, outcome))
    }
    .await;
    engine.shutdown().await;
    let (report, outcome) = result.context("Demo failed")?;

    if json {
        let value = serde_json::json!({
            "ingest": report,
            "query": DEMO_QUERY,
            "outcome": outcome,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_ingest_report(&report);
        println!("  Query: {}", style(DEMO_QUERY).cyan().bold());
        print_query_outcome(&outcome);
    }
    Ok(())
}

/// Report ids present in only one of the two stores.
pub async fn check(state: &AppState, json: bool) -> Result<()> {
    let mut engine = start_engine(state, false).await?;
    let report = engine.check_integrity().await;
    engine.shutdown().await;
    let report = report.context("Integrity check failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_integrity(&report);
    }
    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

fn print_ingest_report(report: &IngestReport) {
    println!();
    println!(
        "  {} Stored {} memor{}",
        style("✓").green().bold(),
        style(report.stored.len()).bold(),
        if report.stored.len() == 1 { "y" } else { "ies" }
    );

    if !report.failed.is_empty() {
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL_CONDENSED);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Text").fg(Color::White),
            Cell::new("Stage").fg(Color::White),
            Cell::new("Reason").fg(Color::White),
        ]);
        for failure in &report.failed {
            table.add_row(vec![
                Cell::new(truncate(&failure.text, 50)).fg(Color::White),
                Cell::new(failure.stage).fg(Color::Yellow),
                Cell::new(&failure.reason).fg(Color::Red),
            ]);
        }

        println!(
            "  {} {} skipped",
            style("✗").red().bold(),
            style(report.failed.len()).bold()
        );
        println!();
        println!("{table}");
    }

    let index = match &report.index {
        IndexOutcome::Built { partitions } => format!("index built ({partitions} partitions)"),
        IndexOutcome::Skipped { rows } => format!("exhaustive search ({rows} rows, no index yet)"),
        IndexOutcome::Failed { reason } => format!("index build failed: {reason}"),
    };
    println!("  {}", style(index).dim());
    if let LoadOutcome::Failed { reason } = &report.load {
        println!(
            "  {} Reload failed, new memories become searchable on the next ingest: {reason}",
            style("!").yellow().bold()
        );
    }
    println!();
}

fn print_query_outcome(outcome: &QueryOutcome) {
    println!();
    for text in &outcome.skipped_queries {
        println!(
            "  {} Could not embed query '{}'",
            style("!").yellow().bold(),
            truncate(text, 50)
        );
    }
    if !outcome.missing_ids.is_empty() {
        println!(
            "  {} {} hit(s) had no stored text: {:?}",
            style("!").yellow().bold(),
            outcome.missing_ids.len(),
            outcome.missing_ids
        );
    }

    if outcome.memories.is_empty() {
        println!("  {} No memories found.", style("i").blue().bold());
        println!();
        return;
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Score").fg(Color::White),
        Cell::new("Id").fg(Color::White),
        Cell::new("Memory").fg(Color::White),
    ]);
    for memory in &outcome.memories {
        table.add_row(vec![
            Cell::new(format!("{:.4}", memory.score)).fg(Color::Yellow),
            Cell::new(memory.id).fg(Color::DarkGrey),
            Cell::new(truncate(&memory.origin_text, 70)).fg(Color::White),
        ]);
    }
    println!("{table}");
    println!();
}

fn print_integrity(report: &IntegrityReport) {
    println!();
    if report.is_consistent() {
        println!(
            "  {} Vector index and text log hold the same ids",
            style("✓").green().bold()
        );
    } else {
        println!("  {} Stores have diverged", style("✗").red().bold());
        if !report.text_only.is_empty() {
            println!("    text only:   {:?}", report.text_only);
        }
        if !report.vector_only.is_empty() {
            println!("    vector only: {:?}", report.vector_only);
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("我会唱歌我会跳舞", 5), "我会...");
    }
}
