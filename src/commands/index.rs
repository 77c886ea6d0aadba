//! Index command - Build or inspect the embeddings index

use anyhow::Result;
use colored::Colorize;

use crate::commands::open_engine;
use product_match::search::engine::IndexStatus;
use product_match::{DataPaths, MatcherConfig};

/// Run index command
pub fn run(
    paths: DataPaths,
    config: &MatcherConfig,
    status_only: bool,
    rebuild: bool,
    json: bool,
) -> Result<()> {
    let engine = open_engine(paths, config)?;

    if status_only {
        let status = engine.status()?;
        if json {
            println!("{}", serde_json::to_string_pretty(&status)?);
        } else {
            print_status(&status);
        }
        return Ok(());
    }

    let catalog = engine.load_catalog()?;

    if !json {
        println!(
            "{} Checking index for {} products...",
            "→".dimmed(),
            catalog.len()
        );
    }

    let ensured = engine.ensure_index(&catalog, rebuild)?;

    let (reason, report) = match ensured.rebuilt {
        Some(rebuilt) => rebuilt,
        None => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "rebuilt": false,
                        "model": ensured.index.model_id,
                        "count": ensured.index.count,
                    })
                );
            } else {
                println!(
                    "{} Index is up to date ({} items, model {})",
                    "✓".green().bold(),
                    ensured.index.count.to_string().cyan(),
                    ensured.index.model_id
                );
            }
            return Ok(());
        }
    };

    if json {
        let failures: Vec<_> = report
            .failures
            .iter()
            .map(|f| serde_json::json!({ "id": f.id, "reason": f.reason.to_string() }))
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "rebuilt": true,
                "reason": reason.to_string(),
                "model": ensured.index.model_id,
                "count": ensured.index.count,
                "failed": failures,
                "duration_ms": report.duration_ms,
            })
        );
    } else {
        println!("  {} Rebuilding: {}", "→".dimmed(), reason);
        println!();
        println!(
            "{} Indexed {} of {} products in {:.2}s",
            "✓".green().bold(),
            report.embedded.to_string().cyan(),
            report.processed,
            report.duration_ms as f64 / 1000.0
        );
        if report.failed() > 0 {
            println!("  {} {} products failed", "✗".red(), report.failed());
            for failure in &report.failures {
                println!("    {} {}", failure.id.dimmed(), failure.reason);
            }
        }
        println!(
            "  {} Index saved to: {}",
            "→".dimmed(),
            engine.paths().embeddings.display()
        );
    }

    Ok(())
}

fn print_status(status: &IndexStatus) {
    if !status.exists {
        println!(
            "{} Index not found. Run {} first.",
            "!".yellow().bold(),
            "match index".cyan()
        );
        return;
    }

    println!("{}", "Index Status".bold());
    println!();
    println!(
        "  {} {} items indexed ({} in catalog)",
        "→".dimmed(),
        status.count.to_string().cyan(),
        status.catalog_items
    );
    println!(
        "  {} Model: {}",
        "→".dimmed(),
        status.model.as_deref().unwrap_or("unknown")
    );
    println!(
        "  {} Size: {:.2} KB",
        "→".dimmed(),
        status.file_size_bytes as f64 / 1024.0
    );
    if let Some(ts) = status.created_at {
        let dt = chrono::DateTime::from_timestamp(ts, 0)
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        println!("  {} Built: {}", "→".dimmed(), dt);
    }
    match &status.stale {
        Some(reason) => println!("  {} Stale: {}", "!".yellow(), reason),
        None => println!("  {} Up to date", "✓".green()),
    }
}
