//! Implementations behind the CLI subcommands.

pub mod consume;
pub mod drain;
pub mod produce;
pub mod selftest;

use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Write a run report as pretty-printed JSON.
pub(crate) fn write_report<T: Serialize>(report: &T, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, &json).with_context(|| format!("Failed to write report to {path:?}"))?;
    info!("Report written to {path:?}");
    Ok(())
}
