// src/pipeline/refilter.rs

//! Re-apply the inclusion policy without crawling.

use crate::error::Result;
use crate::models::Config;
use crate::services::{DocumentFilter, FilterOutcome};
use crate::storage::DocumentStore;

/// Re-evaluate every catalog record against the current filter settings.
pub async fn run_refilter(config: &Config, store: &dyn DocumentStore) -> Result<FilterOutcome> {
    let mut catalog = store.load_catalog().await?;
    let outcome = DocumentFilter::new(&config.filter).apply(&mut catalog);
    store.save_catalog(&catalog).await?;

    log::info!(
        "Refilter: {} included, {} excluded",
        outcome.included,
        outcome.excluded
    );
    Ok(outcome)
}
