//! Search command - find visually similar products

use anyhow::Result;
use colored::Colorize;

use crate::commands::open_engine;
use product_match::{DataPaths, MatcherConfig};

pub fn run(
    paths: DataPaths,
    config: &MatcherConfig,
    image: &str,
    rebuild: bool,
    json: bool,
) -> Result<()> {
    let engine = open_engine(paths, config)?;
    let response = engine.search(image, config.top_k, config.min_score, rebuild)?;

    if json {
        println!("{}", serde_json::to_string(&response)?);
        return Ok(());
    }

    if response.results.is_empty() {
        println!(
            "{} No products above {:.2} for: {}",
            "→".dimmed(),
            config.min_score,
            image.cyan()
        );
        return Ok(());
    }

    println!(
        "{} {} matches for: {}",
        "→".dimmed(),
        response.count,
        image.cyan()
    );
    println!();

    for (i, result) in response.results.iter().enumerate() {
        let score_str = format!("{:.3}", result.score);
        let score_colored = if result.score > 0.8 {
            score_str.green()
        } else if result.score > 0.6 {
            score_str.yellow()
        } else {
            score_str.dimmed()
        };

        println!(
            "{}. [{}] {} ({})",
            (i + 1).to_string().bold(),
            score_colored,
            result.name.cyan(),
            result.id
        );
        println!("   {} | {}", result.category, result.image_url.dimmed());
    }

    Ok(())
}
