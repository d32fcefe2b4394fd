//! Glob-style matching of names against `*` wildcard patterns
//!
//! Patterns are compiled once into literal tokens by splitting on runs of
//! `*`. Empty leading/trailing tokens are kept: they mark a pattern that
//! starts or ends with a wildcard.
//!
//! | pattern        | tokens                     | matches                          |
//! |----------------|----------------------------|----------------------------------|
//! | `logs`         | `["logs"]`                 | exactly `logs`                   |
//! | `logs-*`       | `["logs-", ""]`            | anything starting with `logs-`   |
//! | `*logstash-*`  | `["", "logstash-", ""]`    | anything containing `logstash-`  |
//! | `*`            | `["", ""]`                 | everything                       |
//! | ``             | `[""]`                     | only the empty string            |

use std::collections::{BTreeSet, HashSet};
use std::hash::Hash;

/// A compiled set of wildcard patterns
///
/// # Examples
///
/// ```
/// use warden_acl::matcher::MatcherWithWildcards;
///
/// let matcher = MatcherWithWildcards::new(["logs-*", "metrics"]);
/// assert!(matcher.matches("logs-2020.01.01"));
/// assert!(matcher.matches("metrics"));
/// assert!(!matcher.matches("metrics-1"));
/// ```
#[derive(Debug, Clone)]
pub struct MatcherWithWildcards {
    patterns: BTreeSet<String>,
    compiled: Vec<Vec<String>>,
}

impl MatcherWithWildcards {
    /// Compile a set of patterns
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: BTreeSet<String> = patterns.into_iter().map(Into::into).collect();
        let compiled = patterns.iter().map(|p| tokenize(p)).collect();

        Self { patterns, compiled }
    }

    /// Original patterns
    pub fn patterns(&self) -> &BTreeSet<String> {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `candidate` matches at least one pattern
    pub fn matches(&self, candidate: &str) -> bool {
        self.compiled.iter().any(|tokens| glob(tokens, candidate))
    }

    /// Subset of `candidates` that match
    pub fn filter<I, S>(&self, candidates: I) -> HashSet<S>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str> + Eq + Hash,
    {
        candidates
            .into_iter()
            .filter(|c| self.matches(c.as_ref()))
            .collect()
    }

    /// Patterns that match at least one of `candidates`
    pub fn matching_patterns<I, S>(&self, candidates: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let candidates: Vec<S> = candidates.into_iter().collect();

        self.patterns
            .iter()
            .zip(&self.compiled)
            .filter(|(_, tokens)| candidates.iter().any(|c| glob(tokens, c.as_ref())))
            .map(|(pattern, _)| pattern.clone())
            .collect()
    }
}

/// Split on maximal runs of `*`, keeping boundary tokens
fn tokenize(pattern: &str) -> Vec<String> {
    let parts: Vec<&str> = pattern.split('*').collect();
    let last = parts.len() - 1;

    parts
        .iter()
        .enumerate()
        // an empty interior part comes from consecutive stars
        .filter(|(idx, part)| *idx == 0 || *idx == last || !part.is_empty())
        .map(|(_, part)| part.to_string())
        .collect()
}

fn glob(tokens: &[String], candidate: &str) -> bool {
    match tokens {
        [] => candidate.is_empty(),
        [only] => candidate == only,
        [first, interior @ .., last] => {
            if !candidate.starts_with(first.as_str()) {
                return false;
            }

            let mut idx = first.len();
            for token in interior {
                match candidate[idx..].find(token.as_str()) {
                    Some(found) => idx += found + token.len(),
                    None => return false,
                }
            }

            // the last token is checked against the whole candidate
            candidate.ends_with(last.as_str())
        }
    }
}
