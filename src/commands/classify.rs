//! Classify command - guess the category of an image

use anyhow::Result;
use colored::Colorize;

use crate::commands::open_engine;
use product_match::{DataPaths, MatcherConfig};

pub fn run(paths: DataPaths, config: &MatcherConfig, image: &str, json: bool) -> Result<()> {
    let engine = open_engine(paths, config)?;
    let classification = engine.classify(image)?;

    if json {
        println!("{}", serde_json::to_string(&classification)?);
    } else {
        println!(
            "{} {} → {}",
            "✓".green().bold(),
            image,
            classification.category.cyan()
        );
    }

    Ok(())
}
