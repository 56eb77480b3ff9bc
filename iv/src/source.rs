//! Identity roster loading
//!
//! A roster is a CSV document whose first column holds handles. It can be
//! fetched over HTTP(S) or read from a local file.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use eyre::{Context, Result, eyre};
use tracing::{debug, info};

use crate::identity::Identity;

/// Header cell that marks a non-data row
const HEADER_CELL: &str = "username";

/// Parse roster CSV into normalized, de-duplicated identities in order
pub fn parse_roster(text: &str) -> Result<Vec<Identity>> {
    debug!(len = text.len(), "parse_roster: called");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut seen = HashSet::new();
    let mut identities = Vec::new();

    for (line, record) in reader.records().enumerate() {
        let record = record.context(format!("Malformed roster row {}", line + 1))?;
        let Some(cell) = record.get(0) else {
            continue;
        };
        let Some(identity) = Identity::parse(cell) else {
            continue;
        };
        if identity.as_str() == HEADER_CELL {
            debug!(line = line + 1, "parse_roster: skipping header row");
            continue;
        }
        if seen.insert(identity.clone()) {
            identities.push(identity);
        }
    }

    Ok(identities)
}

/// Load a roster from an HTTP(S) URL or a local path
pub async fn fetch_roster(location: &str) -> Result<Vec<Identity>> {
    debug!(%location, "fetch_roster: called");
    let location = location.trim();
    if location.is_empty() {
        return Err(eyre!("Identity source is not set"));
    }

    let text = if location.starts_with("http://") || location.starts_with("https://") {
        info!("Loading identity roster from {}", location);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        let response = client
            .get(location)
            .send()
            .await
            .context(format!("Failed to fetch roster from {}", location))?;
        if !response.status().is_success() {
            return Err(eyre!("Failed to fetch roster from {}: HTTP {}", location, response.status()));
        }
        response.text().await.context("Failed to read roster body")?
    } else {
        info!("Loading identity roster from file {}", location);
        tokio::fs::read_to_string(location)
            .await
            .context(format!("Failed to read roster file {}", location))?
    };

    parse_roster(&text)
}

/// Drop identities the checkpoint already records as processed, keeping order
pub fn pending(roster: &[Identity], processed: &BTreeSet<String>) -> Vec<Identity> {
    let remaining: Vec<Identity> = roster
        .iter()
        .filter(|identity| !processed.contains(identity.as_str()))
        .cloned()
        .collect();
    info!(
        "Total identities in roster: {} | Previously processed: {} | Remaining to process: {}",
        roster.len(),
        processed.len(),
        remaining.len()
    );
    remaining
}
