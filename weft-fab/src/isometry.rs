//! Meme isometry: stemming-based affinity scoring between meme sets
//!
//! Meme names are normalized (trimmed, lowercased) and reduced to their
//! morphological root with the Snowball English stemmer, so "cats" and
//! "cat" score as the same theme. Scoring counts stem equalities between
//! source and target; duplicate source stems each contribute
//! independently.

use rust_stemmers::{Algorithm, Stemmer};

/// Affinity scorer seeded with a source set of meme names.
pub struct MemeIsometry {
    stemmer: Stemmer,
    source_stems: Vec<String>,
}

impl MemeIsometry {
    /// Build from source meme names.
    pub fn of<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let stemmer = Stemmer::create(Algorithm::English);
        let source_stems = sources
            .into_iter()
            .filter_map(|name| stem(&stemmer, name.as_ref()))
            .collect();
        Self {
            stemmer,
            source_stems,
        }
    }

    /// Build from a comma-separated list of source meme names.
    pub fn of_csv(csv: &str) -> Self {
        Self::of(split_csv(csv))
    }

    /// Score a comma-separated list of target meme names: +1 for every
    /// (source stem, target stem) equality. Empty or disjoint inputs
    /// score 0.
    pub fn score_csv(&self, target_csv: &str) -> u32 {
        self.score(split_csv(target_csv))
    }

    /// Score target meme names against the sources.
    pub fn score<I, S>(&self, targets: I) -> u32
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut total = 0;
        for target in targets {
            if let Some(target_stem) = stem(&self.stemmer, target.as_ref()) {
                total += self
                    .source_stems
                    .iter()
                    .filter(|s| **s == target_stem)
                    .count() as u32;
            }
        }
        total
    }

    /// Number of (non-empty) source stems.
    pub fn source_count(&self) -> usize {
        self.source_stems.len()
    }
}

fn stem(stemmer: &Stemmer, raw: &str) -> Option<String> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        None
    } else {
        Some(stemmer.stem(&normalized).into_owned())
    }
}

fn split_csv(csv: &str) -> impl Iterator<Item = &str> {
    csv.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stemming_unifies_plurals() {
        let isometry = MemeIsometry::of(["cats"]);
        assert!(isometry.score_csv("cat") >= 1);
    }

    #[test]
    fn disjoint_sets_score_zero() {
        let isometry = MemeIsometry::of(["fire", "water"]);
        assert_eq!(isometry.score_csv("earth,wind"), 0);
    }

    #[test]
    fn duplicate_sources_contribute_independently() {
        let doubled = MemeIsometry::of(["storm", "storms"]);
        // Both sources stem to "storm", so one matching target scores 2
        assert_eq!(doubled.score_csv("storm"), 2);
    }

    #[test]
    fn empty_inputs_score_zero() {
        let empty = MemeIsometry::of(Vec::<String>::new());
        assert_eq!(empty.score_csv("anything"), 0);
        let nonempty = MemeIsometry::of(["cool"]);
        assert_eq!(nonempty.score_csv(""), 0);
        assert_eq!(nonempty.score_csv(" , ,"), 0);
    }

    #[test]
    fn case_and_whitespace_are_normalized() {
        let isometry = MemeIsometry::of(["  Tension "]);
        assert!(isometry.score_csv("TENSION") >= 1);
    }
}
