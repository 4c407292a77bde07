//! Startup checks run before anything touches the database.
//!
//! The lookup cache file is overwritten at the end of every run, so it must
//! never point at one of the inputs or at the database itself.

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Read the schema script. A missing file is fatal.
pub fn read_schema(path: &Path) -> Result<String> {
    if !path.is_file() {
        bail!("Missing schema file: {}", path.display());
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file {}", path.display()))
}

/// Validates that the cache path is safe to overwrite.
///
/// # Arguments
/// * `cache` - The lookup cache path that will be rewritten
/// * `protected` - Inputs, schema and database paths that must not match it
pub fn validate_cache_path(cache: &Path, protected: &[&Path]) -> Result<()> {
    for path in protected {
        if same_file(cache, path) {
            bail!(
                "Safety check failed: cache file '{}' cannot be the same as '{}'",
                cache.display(),
                path.display()
            );
        }
    }

    let is_csv_or_sql = cache
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "csv" | "sql" | "sqlite" | "sqlite3" | "db"))
        .unwrap_or(false);
    if is_csv_or_sql {
        bail!(
            "Safety check failed: cache file '{}' looks like a data file, expected a .json path",
            cache.display()
        );
    }

    Ok(())
}

/// Same path, or both exist and canonicalize to the same file.
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_schema_is_fatal() {
        let result = read_schema(Path::new("/nonexistent/schema.sql"));
        assert!(result.unwrap_err().to_string().contains("Missing schema file"));
    }

    #[test]
    fn test_read_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.sql");
        std::fs::write(&path, "CREATE TABLE IF NOT EXISTS t (x INTEGER);").unwrap();
        assert!(read_schema(&path).unwrap().contains("CREATE TABLE"));
    }

    #[test]
    fn test_valid_cache_path() {
        let cache = PathBuf::from("/tmp/omdb_cache.json");
        let movies = PathBuf::from("/data/movies.csv");
        let db = PathBuf::from("/data/movielens.sqlite3");
        assert!(validate_cache_path(&cache, &[&movies, &db]).is_ok());
    }

    #[test]
    fn test_cache_equals_input() {
        let path = PathBuf::from("/data/ratings.json");
        let result = validate_cache_path(&path, &[&path]);
        assert!(result.unwrap_err().to_string().contains("cannot be the same as"));
    }

    #[test]
    fn test_cache_equals_input_through_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.json");
        std::fs::write(&input, "{}").unwrap();
        let indirect = dir.path().join(".").join("data.json");
        assert!(validate_cache_path(&indirect, &[&input]).is_err());
    }

    #[test]
    fn test_data_extension_blocked() {
        let cache = PathBuf::from("/tmp/movies.csv");
        assert!(validate_cache_path(&cache, &[]).is_err());
    }
}
