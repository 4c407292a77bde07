//! SQLite persistence for movies, genres and ratings.
//!
//! All writes are idempotent: movies are upserted (full overwrite), genres
//! are looked up before being created, genre links and ratings absorb
//! duplicates. Every movie, genre and rating write commits on its own.

use std::path::Path;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::debug;

use crate::models::{MovieRecord, RatingRow};

const UPSERT_MOVIE_SQL: &str = "
    INSERT INTO movies (movie_id, title, year, director, plot, box_office, imdb_id, omdb_raw)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT (movie_id) DO UPDATE SET
        title = excluded.title,
        year = excluded.year,
        director = excluded.director,
        plot = excluded.plot,
        box_office = excluded.box_office,
        imdb_id = excluded.imdb_id,
        omdb_raw = excluded.omdb_raw";

const INSERT_RATING_SQL: &str = "
    INSERT INTO ratings (user_id, movie_id, rating, timestamp)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT DO NOTHING";

/// Result of linking a genre to a movie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached,
    AlreadyAttached,
}

/// Counters returned by [`MovieStore::load_ratings`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RatingLoadStats {
    pub inserted: usize,
    pub duplicate: usize,
    pub failed: usize,
}

/// Tables the loader writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Movies,
    Genres,
    MovieGenres,
    Ratings,
}

impl Table {
    fn name(self) -> &'static str {
        match self {
            Table::Movies => "movies",
            Table::Genres => "genres",
            Table::MovieGenres => "movie_genres",
            Table::Ratings => "ratings",
        }
    }
}

pub struct MovieStore {
    conn: Connection,
}

impl MovieStore {
    /// Open (or create) the database file.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Apply the schema script and commit. The script must be re-runnable
    /// (`CREATE TABLE IF NOT EXISTS` ...).
    pub fn ensure_schema(&mut self, schema_sql: &str) -> rusqlite::Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(schema_sql)?;
        tx.commit()
    }

    /// Insert the movie, or overwrite every column of the existing row.
    pub fn upsert_movie(&mut self, movie: &MovieRecord) -> rusqlite::Result<()> {
        let mut stmt = self.conn.prepare_cached(UPSERT_MOVIE_SQL)?;
        stmt.execute(params![
            movie.movie_id,
            movie.title,
            movie.year,
            movie.director,
            movie.plot,
            movie.box_office,
            movie.imdb_id,
            movie.omdb_raw,
        ])?;
        Ok(())
    }

    /// Id of the genre called `name`, creating it on first use.
    pub fn resolve_genre_id(&mut self, name: &str) -> rusqlite::Result<i64> {
        let tx = self.conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row("SELECT id FROM genres WHERE name = ?1", [name], |row| row.get(0))
            .optional()?;
        let id = match existing {
            Some(id) => id,
            None => {
                debug!(genre = name, "new genre");
                tx.execute("INSERT INTO genres (name) VALUES (?1)", [name])?;
                tx.last_insert_rowid()
            }
        };
        tx.commit()?;
        Ok(id)
    }

    /// Link a genre to a movie. An existing link is not an error.
    pub fn attach_genre(&mut self, movie_id: i64, genre_id: i64) -> rusqlite::Result<AttachOutcome> {
        let tx = self.conn.transaction()?;
        match tx.execute(
            "INSERT INTO movie_genres (movie_id, genre_id) VALUES (?1, ?2)",
            params![movie_id, genre_id],
        ) {
            Ok(_) => {
                tx.commit()?;
                Ok(AttachOutcome::Attached)
            }
            Err(e) if is_unique_violation(&e) => {
                tx.rollback()?;
                Ok(AttachOutcome::AlreadyAttached)
            }
            Err(e) => Err(e),
        }
    }

    /// Insert rating events, skipping duplicates and rows the database rejects.
    ///
    /// Each row runs in its own transaction, so a row that fails at insert or
    /// at commit (deferred constraints) is rolled back alone and the load goes
    /// on. `on_row` is called after every row (progress reporting).
    pub fn load_ratings(&mut self, ratings: &[RatingRow], mut on_row: impl FnMut()) -> RatingLoadStats {
        let mut stats = RatingLoadStats::default();

        for r in ratings {
            match self.insert_rating(r) {
                Ok(0) => stats.duplicate += 1,
                Ok(_) => stats.inserted += 1,
                Err(e) => {
                    debug!(user_id = r.user_id, movie_id = r.movie_id, error = %e, "rating insert failed, skipped");
                    stats.failed += 1;
                }
            }
            on_row();
        }

        stats
    }

    /// Rows changed (0 for a duplicate). A failed commit drops the
    /// transaction, which rolls it back.
    fn insert_rating(&mut self, r: &RatingRow) -> rusqlite::Result<usize> {
        let tx = self.conn.transaction()?;
        let changed = tx
            .prepare_cached(INSERT_RATING_SQL)?
            .execute(params![r.user_id, r.movie_id, r.rating, r.timestamp])?;
        tx.commit()?;
        Ok(changed)
    }

    // ------------------------------------------------------------------------
    // Read helpers
    // ------------------------------------------------------------------------

    pub fn movie(&self, movie_id: i64) -> rusqlite::Result<Option<MovieRecord>> {
        self.conn
            .query_row(
                "SELECT movie_id, title, year, director, plot, box_office, imdb_id, omdb_raw
                 FROM movies WHERE movie_id = ?1",
                [movie_id],
                |row| {
                    Ok(MovieRecord {
                        movie_id: row.get(0)?,
                        title: row.get(1)?,
                        year: row.get(2)?,
                        director: row.get(3)?,
                        plot: row.get(4)?,
                        box_office: row.get(5)?,
                        imdb_id: row.get(6)?,
                        omdb_raw: row.get(7)?,
                    })
                },
            )
            .optional()
    }

    /// Genre names linked to a movie, alphabetical.
    pub fn movie_genres(&self, movie_id: i64) -> rusqlite::Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT g.name FROM movie_genres mg
             JOIN genres g ON g.id = mg.genre_id
             WHERE mg.movie_id = ?1
             ORDER BY g.name",
        )?;
        let rows = stmt.query_map([movie_id], |row| row.get(0))?;
        rows.collect()
    }

    pub fn count(&self, table: Table) -> rusqlite::Result<i64> {
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table.name()), [], |row| row.get(0))
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => {
            err.code == ErrorCode::ConstraintViolation
                && matches!(
                    err.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                )
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = include_str!("../schema.sql");

    fn store() -> MovieStore {
        let mut store = MovieStore::open_in_memory().unwrap();
        store.ensure_schema(SCHEMA).unwrap();
        store
    }

    fn rating(user_id: i64, movie_id: i64, rating: f64, timestamp: i64) -> RatingRow {
        RatingRow { user_id, movie_id, rating, timestamp }
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let mut store = store();
        store.ensure_schema(SCHEMA).unwrap();
        assert_eq!(store.count(Table::Movies).unwrap(), 0);
    }

    #[test]
    fn test_upsert_overwrites_all_fields() {
        let mut store = store();
        let enriched = MovieRecord {
            movie_id: 1,
            title: "Toy Story (1995)".into(),
            year: Some(1995),
            director: Some("John Lasseter".into()),
            plot: Some("Toys come alive.".into()),
            box_office: Some("$223,225,679".into()),
            imdb_id: Some("tt0114709".into()),
            omdb_raw: Some("{}".into()),
        };
        store.upsert_movie(&enriched).unwrap();

        let bare = MovieRecord::bare(1, "Toy Story", None);
        store.upsert_movie(&bare).unwrap();

        assert_eq!(store.count(Table::Movies).unwrap(), 1);
        assert_eq!(store.movie(1).unwrap(), Some(bare));
    }

    #[test]
    fn test_missing_movie_is_none() {
        assert_eq!(store().movie(42).unwrap(), None);
    }

    #[test]
    fn test_resolve_genre_id_is_stable() {
        let mut store = store();
        let first = store.resolve_genre_id("Comedy").unwrap();
        let second = store.resolve_genre_id("Comedy").unwrap();
        let other = store.resolve_genre_id("Drama").unwrap();
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(store.count(Table::Genres).unwrap(), 2);
    }

    #[test]
    fn test_attach_genre_twice_keeps_one_link() {
        let mut store = store();
        store.upsert_movie(&MovieRecord::bare(1, "Toy Story (1995)", Some(1995))).unwrap();
        let comedy = store.resolve_genre_id("Comedy").unwrap();

        assert_eq!(store.attach_genre(1, comedy).unwrap(), AttachOutcome::Attached);
        assert_eq!(store.attach_genre(1, comedy).unwrap(), AttachOutcome::AlreadyAttached);
        assert_eq!(store.count(Table::MovieGenres).unwrap(), 1);
        assert_eq!(store.movie_genres(1).unwrap(), vec!["Comedy"]);
    }

    #[test]
    fn test_attach_genre_other_errors_surface() {
        let mut store = store();
        let comedy = store.resolve_genre_id("Comedy").unwrap();
        // No movie 99: foreign key violation, not a duplicate
        assert!(store.attach_genre(99, comedy).is_err());
        assert_eq!(store.count(Table::MovieGenres).unwrap(), 0);
    }

    #[test]
    fn test_load_ratings_twice_does_not_duplicate() {
        let mut store = store();
        store.upsert_movie(&MovieRecord::bare(1, "Toy Story (1995)", Some(1995))).unwrap();
        store.upsert_movie(&MovieRecord::bare(2, "Jumanji (1995)", Some(1995))).unwrap();
        let rows = vec![rating(1, 1, 4.0, 964982703), rating(1, 2, 3.5, 964981247), rating(2, 1, 5.0, 0)];

        let first = store.load_ratings(&rows, || {});
        assert_eq!(first, RatingLoadStats { inserted: 3, duplicate: 0, failed: 0 });

        let second = store.load_ratings(&rows, || {});
        assert_eq!(second, RatingLoadStats { inserted: 0, duplicate: 3, failed: 0 });
        assert_eq!(store.count(Table::Ratings).unwrap(), 3);
    }

    #[test]
    fn test_load_ratings_skips_rejected_rows() {
        let mut store = store();
        store.upsert_movie(&MovieRecord::bare(1, "Toy Story (1995)", Some(1995))).unwrap();
        let rows = vec![
            rating(1, 1, 4.0, 1),
            rating(1, 1, 9.0, 2),  // out of range
            rating(1, 77, 3.0, 3), // unknown movie
            rating(2, 1, 2.0, 4),
        ];

        let mut seen = 0;
        let stats = store.load_ratings(&rows, || seen += 1);
        assert_eq!(stats, RatingLoadStats { inserted: 2, duplicate: 0, failed: 2 });
        assert_eq!(seen, 4);
        assert_eq!(store.count(Table::Ratings).unwrap(), 2);
    }

    #[test]
    fn test_load_ratings_deferred_constraint_fails_only_its_row() {
        let deferred = SCHEMA.replace(
            "movie_id  INTEGER NOT NULL REFERENCES movies(movie_id),",
            "movie_id  INTEGER NOT NULL REFERENCES movies(movie_id) DEFERRABLE INITIALLY DEFERRED,",
        );
        assert_ne!(deferred, SCHEMA);
        let mut store = MovieStore::open_in_memory().unwrap();
        store.ensure_schema(&deferred).unwrap();
        store.upsert_movie(&MovieRecord::bare(1, "Toy Story (1995)", Some(1995))).unwrap();

        let rows = vec![rating(1, 1, 4.0, 1), rating(1, 404, 3.0, 2), rating(2, 1, 2.5, 3)];
        let stats = store.load_ratings(&rows, || {});

        assert_eq!(stats, RatingLoadStats { inserted: 2, duplicate: 0, failed: 1 });
        assert_eq!(store.count(Table::Ratings).unwrap(), 2);
        // Connection is usable afterwards: no transaction left open
        store.upsert_movie(&MovieRecord::bare(2, "Jumanji (1995)", Some(1995))).unwrap();
        assert_eq!(store.load_ratings(&[rating(3, 2, 5.0, 4)], || {}).inserted, 1);
    }

    #[test]
    fn test_open_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movielens.sqlite3");
        {
            let mut store = MovieStore::open(&path).unwrap();
            store.ensure_schema(SCHEMA).unwrap();
            store.upsert_movie(&MovieRecord::bare(3, "Heat (1995)", Some(1995))).unwrap();
        }
        let store = MovieStore::open(&path).unwrap();
        assert_eq!(store.movie(3).unwrap().map(|m| m.title), Some("Heat (1995)".to_string()));
    }
}
