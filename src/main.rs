use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use movielens_etl::input::{read_movies, read_ratings};
use movielens_etl::omdb::{MetadataLookup, OmdbClient, OMDB_API_BASE};
use movielens_etl::pipeline::{run, RunOptions};
use movielens_etl::progress::set_log_only;
use movielens_etl::safety::{read_schema, validate_cache_path};
use movielens_etl::store::{MovieStore, Table};

#[derive(Parser)]
#[command(name = "movielens-etl")]
#[command(about = "Load MovieLens movies and ratings into SQLite, enriched with OMDb metadata")]
struct Args {
    /// movies.csv (movieId,title,genres)
    #[arg(long)]
    movies: PathBuf,

    /// ratings.csv (userId,movieId,rating,timestamp)
    #[arg(long)]
    ratings: PathBuf,

    /// OMDb API key; without one, movies are stored unenriched
    #[arg(long, env = "OMDB_API_KEY", hide_env_values = true)]
    apikey: Option<String>,

    /// SQLite database file (created if missing)
    #[arg(long, env = "MOVIELENS_DB")]
    db: PathBuf,

    #[arg(long, default_value = "schema.sql")]
    schema: PathBuf,

    /// Lookup cache, rewritten at the end of the movie phase
    #[arg(long, env = "OMDB_CACHE_FILE", default_value = "omdb_cache.json")]
    cache: PathBuf,

    #[arg(long, env = "OMDB_BASE_URL", default_value = OMDB_API_BASE)]
    omdb_url: String,

    /// Pause after each successful OMDb lookup, in milliseconds
    #[arg(long, default_value = "200")]
    delay_ms: u64,

    /// Hide progress bars and log periodic progress lines instead
    #[arg(long)]
    log_only: bool,

    /// Write run statistics as JSON to this file
    #[arg(long)]
    stats: Option<PathBuf>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,movielens_etl=info")),
        )
        .with_writer(std::io::stderr)
        .init();
    set_log_only(args.log_only);

    let start = Instant::now();

    let schema_sql = read_schema(&args.schema)?;
    validate_cache_path(&args.cache, &[&args.movies, &args.ratings, &args.schema, &args.db])?;

    println!("Opening database: {:?}", args.db);
    let mut store = MovieStore::open(&args.db)
        .with_context(|| format!("Failed to open database {}", args.db.display()))?;
    store.ensure_schema(&schema_sql).context("Failed to apply schema")?;
    tracing::info!(schema = %args.schema.display(), "schema ensured");

    println!("Reading movies CSV: {:?}", args.movies);
    let movies = read_movies(&args.movies)?;
    println!("Reading ratings CSV: {:?}", args.ratings);
    let ratings = read_ratings(&args.ratings)?;

    let client = match args.apikey.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => Some(OmdbClient::new(key, &args.omdb_url).context("Failed to build HTTP client")?),
        None => None,
    };
    let lookup = client.as_ref().map(|c| c as &dyn MetadataLookup);

    let options = RunOptions {
        cache_path: args.cache.clone(),
        politeness_delay: Duration::from_millis(args.delay_ms),
    };
    let stats = run(&mut store, lookup, &options, &movies, &ratings);

    stats.log_summary();
    if let Some(path) = &args.stats {
        stats
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats to {}", path.display()))?;
    }

    println!("\n{:=<60}", "");
    println!("Load complete!");
    println!("  Movies in store: {}", table_count(&store, Table::Movies));
    println!("  Genres in store: {}", table_count(&store, Table::Genres));
    println!("  Ratings in store: {}", table_count(&store, Table::Ratings));
    println!("  Enriched this run: {:.1}%", stats.enrichment_rate());
    println!("  Elapsed: {:.2}s", start.elapsed().as_secs_f64());
    println!("{:=<60}", "");

    println!("ETL finished successfully");
    Ok(())
}

/// Row count for the summary; the load is already done, so a failed count
/// is only logged.
fn table_count(store: &MovieStore, table: Table) -> String {
    match store.count(table) {
        Ok(n) => n.to_string(),
        Err(e) => {
            tracing::warn!(?table, error = %e, "could not count rows");
            "?".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_count_falls_back_when_table_is_missing() {
        let store = MovieStore::open_in_memory().unwrap();
        assert_eq!(table_count(&store, Table::Ratings), "?");

        let mut store = MovieStore::open_in_memory().unwrap();
        store.ensure_schema(include_str!("../schema.sql")).unwrap();
        assert_eq!(table_count(&store, Table::Movies), "0");
    }
}
