//! Core data models for the MovieLens load.
//!
//! This module contains the typed input rows, the persisted movie record
//! and the run statistics used throughout the pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Type Aliases
// ============================================================================

/// Full OMDb response object as returned by the service and stored in the cache.
pub type MetadataPayload = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Input Rows
// ============================================================================

/// Row of `movies.csv` exactly as it appears in the file.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawMovieRow {
    #[serde(rename = "movieId", default)]
    pub movie_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub genres: Option<String>,
}

/// Row of `ratings.csv` exactly as it appears in the file.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawRatingRow {
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
    #[serde(rename = "movieId", default)]
    pub movie_id: Option<String>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Why a raw row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("invalid {field}: {value:?}")]
    Invalid { field: &'static str, value: String },
}

/// Validated movie row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovieRow {
    pub movie_id: i64,
    /// Raw title, trimmed. Still carries the "(1995)" suffix.
    pub title: String,
    pub genres: String,
}

impl TryFrom<&RawMovieRow> for MovieRow {
    type Error = RowError;

    fn try_from(raw: &RawMovieRow) -> Result<Self, Self::Error> {
        let movie_id = parse_id("movieId", raw.movie_id.as_deref())?;
        Ok(Self {
            movie_id,
            title: raw.title.as_deref().unwrap_or("").trim().to_string(),
            genres: raw.genres.clone().unwrap_or_default(),
        })
    }
}

/// Validated rating event.
#[derive(Clone, Debug, PartialEq)]
pub struct RatingRow {
    pub user_id: i64,
    pub movie_id: i64,
    pub rating: f64,
    /// Epoch seconds, 0 when the column is empty.
    pub timestamp: i64,
}

impl TryFrom<&RawRatingRow> for RatingRow {
    type Error = RowError;

    fn try_from(raw: &RawRatingRow) -> Result<Self, Self::Error> {
        let user_id = parse_id("userId", raw.user_id.as_deref())?;
        let movie_id = parse_id("movieId", raw.movie_id.as_deref())?;

        let rating_text = non_blank(raw.rating.as_deref()).ok_or(RowError::Missing("rating"))?;
        let rating: f64 = rating_text.parse().map_err(|_| RowError::Invalid {
            field: "rating",
            value: rating_text.to_string(),
        })?;
        if !rating.is_finite() {
            return Err(RowError::Invalid { field: "rating", value: rating_text.to_string() });
        }

        let timestamp = match non_blank(raw.timestamp.as_deref()) {
            None => 0,
            Some(t) => parse_integral(t).ok_or_else(|| RowError::Invalid {
                field: "timestamp",
                value: t.to_string(),
            })?,
        };

        Ok(Self { user_id, movie_id, rating, timestamp })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Integer, or a float with no fractional part ("12.0" is how a numeric
/// column with gaps gets written back out by most tools).
fn parse_integral(text: &str) -> Option<i64> {
    if let Ok(n) = text.parse::<i64>() {
        return Some(n);
    }
    let f: f64 = text.parse().ok()?;
    (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

fn parse_id(field: &'static str, value: Option<&str>) -> Result<i64, RowError> {
    let text = non_blank(value).ok_or(RowError::Missing(field))?;
    parse_integral(text).ok_or_else(|| RowError::Invalid { field, value: text.to_string() })
}

// ============================================================================
// Output Models
// ============================================================================

/// Row of the `movies` table.
///
/// Every column except `movie_id` is overwritten on each upsert, so a bare
/// record replaces fields a previous enriched run had filled in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MovieRecord {
    pub movie_id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub director: Option<String>,
    pub plot: Option<String>,
    pub box_office: Option<String>,
    pub imdb_id: Option<String>,
    /// OMDb payload serialized as JSON
    pub omdb_raw: Option<String>,
}

impl MovieRecord {
    /// Record with no enrichment fields set.
    pub fn bare(movie_id: i64, title: &str, year: Option<i32>) -> Self {
        Self { movie_id, title: title.to_string(), year, ..Default::default() }
    }

    /// Record filled from an OMDb payload (`Director`, `Plot`, `BoxOffice`, `imdbID`).
    pub fn enriched(
        movie_id: i64,
        title: &str,
        year: Option<i32>,
        payload: &MetadataPayload,
    ) -> serde_json::Result<Self> {
        let field = |name: &str| payload.get(name).and_then(|v| v.as_str()).map(str::to_string);
        Ok(Self {
            movie_id,
            title: title.to_string(),
            year,
            director: field("Director"),
            plot: field("Plot"),
            box_office: field("BoxOffice"),
            imdb_id: field("imdbID"),
            omdb_raw: Some(serde_json::to_string(payload)?),
        })
    }
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Counters for one ETL run.
#[derive(Default, Debug, Clone, Serialize)]
pub struct LoadStats {
    // Movie loop
    pub movie_rows_read: usize,
    pub movie_rows_invalid: usize,
    pub movies_upserted: usize,
    pub movies_failed: usize,

    // Enrichment
    pub cache_hits: usize,
    pub cache_null_hits: usize, // cached "no result" markers
    pub lookups_skipped_no_key: usize,
    pub lookups_found: usize,
    pub lookups_not_found: usize,
    pub lookups_failed: usize, // transport/decode errors
    pub cache_entries_learned: usize,
    pub politeness_pauses: usize, // sleeps after live successful lookups

    // Genres
    pub genres_attached: usize,
    pub genres_already_attached: usize,
    pub genres_failed: usize,

    // Ratings
    pub rating_rows_read: usize,
    pub ratings_invalid: usize,
    pub ratings_inserted: usize,
    pub ratings_duplicate: usize,
    pub ratings_failed: usize,

    // Timing
    pub elapsed_seconds: f64,
}

impl LoadStats {
    /// Share of valid movie rows that ended up enriched, as a percentage
    pub fn enrichment_rate(&self) -> f64 {
        let valid = self.movie_rows_read - self.movie_rows_invalid;
        if valid == 0 {
            0.0
        } else {
            100.0 * (self.lookups_found + self.cache_hits) as f64 / valid as f64
        }
    }

    /// Log the counters through tracing
    pub fn log_summary(&self) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => tracing::info!("run statistics\n{}", json),
            Err(e) => tracing::warn!(error = %e, "could not serialize run statistics"),
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
