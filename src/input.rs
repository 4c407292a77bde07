//! CSV readers for the MovieLens `movies.csv` and `ratings.csv` files.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::models::{RawMovieRow, RawRatingRow};

pub fn read_movies(path: &Path) -> Result<Vec<RawMovieRow>> {
    read_rows(path, "movies")
}

pub fn read_ratings(path: &Path) -> Result<Vec<RawRatingRow>> {
    read_rows(path, "ratings")
}

/// Header-keyed rows. Records that fail to decode are logged and dropped.
fn read_rows<T: DeserializeOwned>(path: &Path, kind: &str) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .with_context(|| format!("Failed to open {} file {}", kind, path.display()))?;

    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for (idx, record) in reader.deserialize::<T>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) => {
                // idx + 2: 1-based, after the header line
                warn!(kind, line = idx + 2, error = %e, "unreadable CSV record, dropped");
                dropped += 1;
            }
        }
    }

    info!(kind, path = %path.display(), rows = rows.len(), dropped, "CSV read");
    Ok(rows)
}
