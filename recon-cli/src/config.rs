//! Configuration module
//!
//! Connection settings shared by every command.

use anyhow::{Context, Result};

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the Recon server
    pub server_url: String,
    /// Source system connection URL, for local runs
    pub source_url: Option<String>,
    /// Target system connection URL, for local runs
    pub target_url: Option<String>,
}

impl Config {
    /// Both system URLs, required by commands that connect directly
    pub fn system_urls(&self) -> Result<(&str, &str)> {
        let source = self
            .source_url
            .as_deref()
            .context("--source-url (or RECON_SOURCE_URL) is required for local runs")?;
        let target = self
            .target_url
            .as_deref()
            .context("--target-url (or RECON_TARGET_URL) is required for local runs")?;
        Ok((source, target))
    }
}
