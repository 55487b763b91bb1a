//! Source scanning: expand the configured globs and collect URL literals

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[a-zA-Z0-9$=?_@.&+!*(),%/:#-]+").expect("URL pattern"));

/// Extract unique URLs from text content
pub fn extract_urls(content: &str) -> BTreeSet<String> {
    URL.find_iter(content)
        // Clean trailing punctuation
        .map(|m| m.as_str().trim_end_matches([',', '.', ')', ']', ';', ':']))
        .map(str::to_string)
        .collect()
}

/// Expand glob patterns (relative to `root`) to the files they match
pub fn expand_sources(root: &Path, patterns: &[String]) -> Result<BTreeSet<PathBuf>> {
    let mut files = BTreeSet::new();
    let root = PathBuf::from(glob::Pattern::escape(&root.to_string_lossy()));

    for pattern in patterns {
        let full = root.join(pattern);
        let full = full.to_string_lossy();
        for entry in glob::glob(&full).with_context(|| format!("Invalid source pattern: {}", pattern))? {
            let path = entry?;
            if path.is_file() {
                files.insert(path);
            }
        }
    }

    Ok(files)
}

/// Every URL literal in the source files matched by `patterns`
pub async fn scan_sources(root: &Path, patterns: &[String]) -> Result<BTreeSet<String>> {
    let files = expand_sources(root, patterns)?;
    info!(count = files.len(), "scanning source files");

    let mut urls = BTreeSet::new();
    for file in &files {
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        for url in extract_urls(&String::from_utf8_lossy(&bytes)) {
            debug!(file = %file.display(), %url, "found URL");
            urls.insert(url);
        }
    }

    info!(count = urls.len(), "found URLs in source code");
    Ok(urls)
}
