//! Title, year and genre normalization for MovieLens rows.
//!
//! MovieLens embeds the release year in the title ("Toy Story (1995)").
//! The cleaned title and the year are what gets sent to OMDb and what the
//! lookup cache is keyed on.

use once_cell::sync::Lazy;
use regex::Regex;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Parenthesized 4-digit year anywhere in the title: "(1995)".
pub static MOVIE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d{4})\)").unwrap());

/// Placeholder MovieLens uses for movies without genres.
pub const NO_GENRES_LISTED: &str = "(no genres listed)";

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Year from the first "(dddd)" group in the title.
/// Returns None when there is no such group or the digits don't parse.
pub fn parse_year(title: &str) -> Option<i32> {
    let caps = MOVIE_YEAR.captures(title)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Title with the first "(dddd)" group removed, trimmed.
pub fn clean_title(title: &str) -> String {
    MOVIE_YEAR.replace(title, "").trim().to_string()
}

/// Genres from the pipe-delimited field, in order.
/// Empty segments and the "(no genres listed)" placeholder are dropped.
pub fn parse_genres(raw: &str) -> Vec<String> {
    raw.split('|')
        .filter(|g| !g.is_empty() && *g != NO_GENRES_LISTED)
        .map(str::to_string)
        .collect()
}

/// Key for the lookup cache: cleaned title immediately followed by the year.
///
/// There is no separator, so e.g. ("Matrix 1", None) and ("Matrix ", Some(1))
/// would share a key. Existing cache files depend on this exact form.
pub fn cache_key(clean_title: &str, year: Option<i32>) -> String {
    match year {
        Some(y) => format!("{}{}", clean_title, y),
        None => clean_title.to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_year_basic() {
        assert_eq!(parse_year("Toy Story (1995)"), Some(1995));
        assert_eq!(parse_year("Jumanji (1995) "), Some(1995));
        assert_eq!(parse_year("Toy Story"), None);
        assert_eq!(parse_year(""), None);
    }

    #[test]
    fn test_parse_year_ignores_non_year_parentheses() {
        assert_eq!(parse_year("City of Lost Children, The (Cité des enfants perdus, La) (1995)"), Some(1995));
        assert_eq!(parse_year("Hyperspace (95)"), None);
        assert_eq!(parse_year("Number (12345)"), None);
        assert_eq!(parse_year("Year 1995"), None);
    }

    #[test]
    fn test_parse_year_first_match_wins() {
        assert_eq!(parse_year("Remake (2010) of (1960)"), Some(2010));
    }

    #[test]
    fn test_parse_year_unparseable_digits() {
        // Arabic-Indic digits match \d but are not an i32
        assert_eq!(parse_year("Film (١٩٩٥)"), None);
    }

    #[test]
    fn test_clean_title_basic() {
        assert_eq!(clean_title("Toy Story (1995)"), "Toy Story");
        assert_eq!(clean_title("  Heat (1995)  "), "Heat");
        assert_eq!(clean_title("Untitled"), "Untitled");
        assert_eq!(clean_title("  Untitled  "), "Untitled");
    }

    #[test]
    fn test_clean_title_removes_only_first_year() {
        assert_eq!(clean_title("Remake (2010) of (1960)"), "Remake  of (1960)");
        assert_eq!(
            clean_title("American President, The (1995)"),
            "American President, The"
        );
    }

    #[test]
    fn test_parse_genres() {
        assert_eq!(parse_genres("Action|Comedy|(no genres listed)"), vec!["Action", "Comedy"]);
        assert_eq!(parse_genres("Adventure|Animation|Children"), vec!["Adventure", "Animation", "Children"]);
        assert_eq!(parse_genres("(no genres listed)"), Vec::<String>::new());
        assert_eq!(parse_genres(""), Vec::<String>::new());
        assert_eq!(parse_genres("Drama||"), vec!["Drama"]);
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("Toy Story", Some(1995)), "Toy Story1995");
        assert_eq!(cache_key("Toy Story", None), "Toy Story");
        // No separator between title and year
        assert_eq!(cache_key("Matrix 1", None), cache_key("Matrix ", Some(1)));
    }
}
