//! Relevance scoring for `deps search`.

/// A scored search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub name: String,
    pub description: String,
    pub score: u32,
}

pub const EXACT_NAME: u32 = 1000;
pub const NAME_PREFIX: u32 = 500;
pub const NAME_SUBSTRING: u32 = 100;
pub const EXACT_KEYWORD: u32 = 75;
pub const DESCRIPTION_SUBSTRING: u32 = 50;
pub const KEYWORD_SUBSTRING: u32 = 25;

/// Score a package name alone. Returns 0 when the name does not match.
pub fn score_name(name: &str, query: &str) -> u32 {
    let name = name.to_lowercase();
    let query = query.to_lowercase();

    if name == query {
        EXACT_NAME
    } else if name.starts_with(&query) {
        NAME_PREFIX
    } else if name.contains(&query) {
        NAME_SUBSTRING
    } else {
        0
    }
}

/// Score description and keywords; the best single match wins.
pub fn score_metadata(description: &str, keywords: &[String], query: &str) -> u32 {
    let query = query.to_lowercase();

    let mut score = 0;
    if description.to_lowercase().contains(&query) {
        score = DESCRIPTION_SUBSTRING;
    }

    for keyword in keywords {
        let keyword = keyword.to_lowercase();
        if keyword == query {
            score = score.max(EXACT_KEYWORD);
        } else if keyword.contains(&query) {
            score = score.max(KEYWORD_SUBSTRING);
        }
    }

    score
}

/// Highest score first; equal scores sort by name.
pub fn rank(hits: &mut Vec<SearchHit>, limit: usize) {
    hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    hits.truncate(limit);
}
