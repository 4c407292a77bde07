//! Movie enrichment and load pipeline.
//!
//! Phase 1 walks the movie rows in input order: normalize, consult the
//! lookup cache, query OMDb on a miss, upsert the movie and link its genres.
//! Phase 2 saves the cache (once). Phase 3 bulk-loads the ratings.
//! Per-row failures are logged and counted, never fatal.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::cache::{CacheLookup, LookupCache};
use crate::models::{LoadStats, MetadataPayload, MovieRecord, MovieRow, RatingRow, RawMovieRow, RawRatingRow};
use crate::normalize::{cache_key, clean_title, parse_genres, parse_year};
use crate::omdb::{LookupOutcome, MetadataLookup};
use crate::progress::PhaseProgress;
use crate::store::{AttachOutcome, MovieStore};

pub const DEFAULT_POLITENESS_DELAY: Duration = Duration::from_millis(200);

/// What happened to one movie row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// Bad or missing movieId, nothing written
    Skipped,
    Stored { enriched: bool },
    /// The movie upsert itself failed
    Failed,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub cache_path: PathBuf,
    /// Pause after each successful OMDb lookup
    pub politeness_delay: Duration,
}

pub struct Pipeline<'a> {
    store: &'a mut MovieStore,
    lookup: Option<&'a dyn MetadataLookup>,
    cache: LookupCache,
    politeness_delay: Duration,
    stats: LoadStats,
}

impl<'a> Pipeline<'a> {
    /// `lookup` is None when no OMDb key is configured.
    pub fn new(
        store: &'a mut MovieStore,
        lookup: Option<&'a dyn MetadataLookup>,
        cache: LookupCache,
        politeness_delay: Duration,
    ) -> Self {
        Self { store, lookup, cache, politeness_delay, stats: LoadStats::default() }
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    pub fn load_movies(&mut self, rows: &[RawMovieRow]) {
        let mut progress = PhaseProgress::rows("Phase 1: Loading movies", rows.len() as u64);

        for raw in rows {
            self.process_movie(raw);
            progress.inc();
        }

        progress.finish(format!(
            "Phase 1: Stored {} movies ({} skipped, {} failed)",
            self.stats.movies_upserted, self.stats.movie_rows_invalid, self.stats.movies_failed
        ));
        info!(
            upserted = self.stats.movies_upserted,
            invalid = self.stats.movie_rows_invalid,
            failed = self.stats.movies_failed,
            lookups = self.stats.lookups_found + self.stats.lookups_not_found + self.stats.lookups_failed,
            "movie phase done"
        );
    }

    pub fn process_movie(&mut self, raw: &RawMovieRow) -> RowOutcome {
        self.stats.movie_rows_read += 1;

        let row = match MovieRow::try_from(raw) {
            Ok(row) => row,
            Err(e) => {
                warn!(error = %e, title = raw.title.as_deref().unwrap_or(""), "invalid movieId, row skipped");
                self.stats.movie_rows_invalid += 1;
                return RowOutcome::Skipped;
            }
        };

        let year = parse_year(&row.title);
        let query_title = clean_title(&row.title);
        let genres = parse_genres(&row.genres);

        let payload = self.metadata_for(&query_title, year);
        let record = match &payload {
            Some(p) => match MovieRecord::enriched(row.movie_id, &row.title, year, p) {
                Ok(record) => record,
                Err(e) => {
                    warn!(movie_id = row.movie_id, error = %e, "could not serialize OMDb payload, storing bare movie");
                    MovieRecord::bare(row.movie_id, &row.title, year)
                }
            },
            None => MovieRecord::bare(row.movie_id, &row.title, year),
        };
        let enriched = record.omdb_raw.is_some();

        if let Err(e) = self.store.upsert_movie(&record) {
            error!(movie_id = row.movie_id, error = %e, "movie upsert failed");
            self.stats.movies_failed += 1;
            return RowOutcome::Failed;
        }
        debug!(movie_id = row.movie_id, title = %row.title, enriched, "movie upserted");
        self.stats.movies_upserted += 1;

        for genre in &genres {
            self.attach_genre(row.movie_id, genre);
        }

        RowOutcome::Stored { enriched }
    }

    /// Cached payload, or a fresh lookup on a miss. Only fresh results
    /// (found / not found / failed) are written to the cache.
    fn metadata_for(&mut self, title: &str, year: Option<i32>) -> Option<MetadataPayload> {
        let key = cache_key(title, year);

        match self.cache.get(&key) {
            CacheLookup::Hit(payload) => {
                self.stats.cache_hits += 1;
                return Some(payload.clone());
            }
            CacheLookup::NoResult => {
                self.stats.cache_null_hits += 1;
                return None;
            }
            CacheLookup::Miss => {}
        }

        let Some(lookup) = self.lookup else {
            self.stats.lookups_skipped_no_key += 1;
            return None;
        };

        match lookup.lookup(title, year) {
            Ok(LookupOutcome::Found(payload)) => {
                self.stats.lookups_found += 1;
                self.cache.record(key, Some(payload.clone()));
                if !self.politeness_delay.is_zero() {
                    std::thread::sleep(self.politeness_delay);
                    self.stats.politeness_pauses += 1;
                }
                Some(payload)
            }
            Ok(LookupOutcome::NotFound) => {
                debug!(title, ?year, "OMDb lookup failed");
                self.stats.lookups_not_found += 1;
                self.cache.record(key, None);
                None
            }
            Err(e) => {
                warn!(title, ?year, error = %e, "OMDb exception, caching no result");
                self.stats.lookups_failed += 1;
                self.cache.record(key, None);
                None
            }
        }
    }

    fn attach_genre(&mut self, movie_id: i64, genre: &str) {
        let result = self
            .store
            .resolve_genre_id(genre)
            .and_then(|genre_id| self.store.attach_genre(movie_id, genre_id));

        match result {
            Ok(AttachOutcome::Attached) => {
                debug!(movie_id, genre, "attached genre");
                self.stats.genres_attached += 1;
            }
            Ok(AttachOutcome::AlreadyAttached) => {
                debug!(movie_id, genre, "genre already attached, skipping");
                self.stats.genres_already_attached += 1;
            }
            Err(e) => {
                error!(movie_id, genre, error = %e, "genre attach failed");
                self.stats.genres_failed += 1;
            }
        }
    }

    /// Hand back the cache (to be saved) and the counters.
    pub fn finish(mut self) -> (LookupCache, LoadStats) {
        self.stats.cache_entries_learned = self.cache.learned();
        (self.cache, self.stats)
    }
}

/// Convert raw rating rows, dropping the ones without usable ids or rating.
pub fn validate_ratings(rows: &[RawRatingRow], stats: &mut LoadStats) -> Vec<RatingRow> {
    stats.rating_rows_read += rows.len();
    rows.iter()
        .filter_map(|raw| match RatingRow::try_from(raw) {
            Ok(row) => Some(row),
            Err(e) => {
                debug!(error = %e, "invalid rating row, skipped");
                stats.ratings_invalid += 1;
                None
            }
        })
        .collect()
}

/// Full run: movies, cache save, ratings. Row-level failures are counted
/// in the returned stats; nothing here ends the run.
pub fn run(
    store: &mut MovieStore,
    lookup: Option<&dyn MetadataLookup>,
    options: &RunOptions,
    movies: &[RawMovieRow],
    ratings: &[RawRatingRow],
) -> LoadStats {
    let start = Instant::now();

    if lookup.is_none() {
        warn!("no OMDb API key configured, movies will be stored without enrichment");
    }

    let cache = LookupCache::load(&options.cache_path);
    let mut pipeline = Pipeline::new(store, lookup, cache, options.politeness_delay);
    pipeline.load_movies(movies);
    let (cache, mut stats) = pipeline.finish();

    let saving = PhaseProgress::step("Phase 2: Saving lookup cache");
    match cache.save(&options.cache_path) {
        Ok(entries) => saving.finish(format!("Phase 2: Saved {} cache entries", entries)),
        Err(e) => {
            saving.finish("Phase 2: Cache save failed".to_string());
            error!(error = %e, "lookup cache not saved, this run's lookups are lost");
        }
    }

    let rating_rows = validate_ratings(ratings, &mut stats);
    let mut progress = PhaseProgress::rows("Phase 3: Loading ratings", rating_rows.len() as u64);
    let rating_stats = store.load_ratings(&rating_rows, || progress.inc());
    progress.finish(format!(
        "Phase 3: Loaded {} ratings ({} duplicates, {} failed)",
        rating_stats.inserted, rating_stats.duplicate, rating_stats.failed
    ));
    info!(
        inserted = rating_stats.inserted,
        duplicate = rating_stats.duplicate,
        failed = rating_stats.failed,
        invalid = stats.ratings_invalid,
        "all ratings loaded"
    );

    stats.ratings_inserted = rating_stats.inserted;
    stats.ratings_duplicate = rating_stats.duplicate;
    stats.ratings_failed = rating_stats.failed;
    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    stats
}
