//! init command: Create a refwatch.yaml template

use crate::config::Config;
use anyhow::{bail, Result};
use chrono::Utc;
use clap::Args;
use serde::Serialize;
use std::path::Path;

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub created: String,
    pub file: String,
}

pub async fn run_init(config_path: &Path, args: InitArgs) -> Result<()> {
    if config_path.exists() && !args.force {
        let error = serde_json::json!({
            "error": "file_exists",
            "message": format!("{} already exists. Use --force to overwrite.", config_path.display()),
            "file": config_path.display().to_string()
        });
        println!("{}", serde_json::to_string(&error)?);
        bail!("File exists");
    }

    let header = "# refwatch configuration\n\
                  # sources: glob patterns of files to scan for issue / Q&A links\n";
    let yaml = serde_yaml::to_string(&Config::template())?;
    tokio::fs::write(config_path, format!("{}{}", header, yaml)).await?;

    let output = InitOutput {
        created: Utc::now().to_rfc3339(),
        file: config_path.display().to_string(),
    };
    println!("{}", serde_json::to_string(&output)?);

    Ok(())
}
