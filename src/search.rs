//! Fuzzy filtering over the script catalog.
//!
//! Presentation-side list filtering: given a query, return ranked matches
//! with the matched character positions in the script name so a renderer
//! can highlight them.

use nucleo_matcher::pattern::{CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Config, Matcher, Utf32Str};

use crate::scripts::{Script, ScriptCatalog};

/// A catalog entry that matched the query.
#[derive(Debug)]
pub struct SearchMatch<'a> {
    pub script: &'a Script,
    pub score: u32,
    /// Character indices in the script name that matched, for highlighting.
    pub name_indices: Vec<u32>,
}

/// Rank catalog entries against `query`.
///
/// Name matches outweigh description matches. An empty query returns the
/// whole catalog in its existing order with no highlights.
pub fn filter_catalog<'a>(catalog: &'a ScriptCatalog, query: &str) -> Vec<SearchMatch<'a>> {
    if query.trim().is_empty() {
        return catalog
            .iter()
            .map(|script| SearchMatch {
                script,
                score: 0,
                name_indices: Vec::new(),
            })
            .collect();
    }

    let pattern = Pattern::parse(query, CaseMatching::Ignore, Normalization::Smart);
    let mut matcher = Matcher::new(Config::DEFAULT);
    let mut buf = Vec::with_capacity(64);

    let mut matches: Vec<SearchMatch<'a>> = catalog
        .iter()
        .filter_map(|script| {
            buf.clear();
            let name = Utf32Str::new(&script.name, &mut buf);
            let mut name_indices = Vec::new();
            let name_score = pattern.indices(name, &mut matcher, &mut name_indices);

            let score = match name_score {
                // Name hits dominate description hits
                Some(score) => Some(score.saturating_mul(2)),
                None => {
                    buf.clear();
                    let description = Utf32Str::new(&script.description, &mut buf);
                    name_indices.clear();
                    pattern.score(description, &mut matcher)
                }
            };

            score.map(|score| SearchMatch {
                script,
                score,
                name_indices,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.script.name.to_lowercase().cmp(&b.script.name.to_lowercase()))
    });
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with(names_and_descriptions: &[(&str, &str)]) -> ScriptCatalog {
        let scripts = names_and_descriptions
            .iter()
            .map(|(name, description)| {
                let mut script = Script::new(&format!("/s/{}", name));
                script.description = description.to_string();
                script
            })
            .collect();
        ScriptCatalog::new(scripts)
    }

    #[test]
    fn test_empty_query_returns_everything_unranked() {
        let catalog = catalog_with(&[("backup.sh", ""), ("deploy.sh", "")]);
        let matches = filter_catalog(&catalog, "  ");
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.score == 0 && m.name_indices.is_empty()));
    }

    #[test]
    fn test_name_match_filters_and_reports_indices() {
        let catalog = catalog_with(&[("backup.sh", ""), ("deploy.sh", "")]);
        let matches = filter_catalog(&catalog, "backup");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].script.name, "backup.sh");
        assert!(!matches[0].name_indices.is_empty());
    }

    #[test]
    fn test_description_match_has_no_name_highlights() {
        let catalog = catalog_with(&[("cryptic.sh", "rotates the logs"), ("other.sh", "")]);
        let matches = filter_catalog(&catalog, "rotates");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].script.name, "cryptic.sh");
        assert!(matches[0].name_indices.is_empty());
    }

    #[test]
    fn test_fuzzy_subsequence_matches() {
        let catalog = catalog_with(&[("deploy-staging.sh", ""), ("backup.sh", "")]);
        let matches = filter_catalog(&catalog, "dstg");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].script.name, "deploy-staging.sh");
    }

    #[test]
    fn test_name_match_outranks_description_match() {
        let catalog = catalog_with(&[
            ("notes.sh", "handles deploy notes"),
            ("deploy.sh", "pushes to production"),
        ]);
        let matches = filter_catalog(&catalog, "deploy");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].script.name, "deploy.sh");
    }

    #[test]
    fn test_no_match_is_empty() {
        let catalog = catalog_with(&[("backup.sh", "copies files")]);
        assert!(filter_catalog(&catalog, "zzzzzz").is_empty());
    }
}
