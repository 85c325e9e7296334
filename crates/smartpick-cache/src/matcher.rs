use crate::index::{IndexStorage, QueryRecord};
use crate::keywords::KeywordExtractor;
use smartpick_core::SmartpickResult;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// A top score at or above this is reused outright.
pub const HIGH_CONFIDENCE: f64 = 0.75;
/// A lead over the runner-up at least this large also picks the top match.
pub const CLEAR_MARGIN: f64 = 0.15;
/// Below this top score nothing is considered confident enough to reuse.
pub const MIN_CONFIDENCE: f64 = 0.6;

/// What to match against the index.
#[derive(Debug, Clone, Copy)]
pub enum MatchInput<'a> {
    /// Free text; keywords are extracted first.
    Text(&'a str),
    /// Keywords already extracted by the caller.
    Keywords(&'a BTreeSet<String>),
}

/// A stored query and how well it matched.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    /// Id of the stored query.
    pub query_id: String,
    /// Share of the incoming query's keyword weight found in this query.
    pub score: f64,
    /// The stored query record.
    pub record: QueryRecord,
}

/// Weighted keyword-overlap matcher over an [`IndexStorage`].
pub struct QueryMatcher<'a> {
    extractor: &'a KeywordExtractor,
    index: &'a IndexStorage,
}

impl<'a> QueryMatcher<'a> {
    /// Match with `extractor` weights against `index`.
    pub fn new(extractor: &'a KeywordExtractor, index: &'a IndexStorage) -> Self {
        Self { extractor, index }
    }

    /// Stored queries matching `input`, best first.
    ///
    /// Each candidate scores `Σ weight(shared) / Σ weight(query keywords)`;
    /// candidates below `min_score` are dropped. Then:
    ///
    /// - top ≥ [`HIGH_CONFIDENCE`], or a runner-up exists and the lead is at
    ///   least [`CLEAR_MARGIN`]: only the top match;
    /// - top < [`MIN_CONFIDENCE`]: nothing;
    /// - otherwise up to `max_results` matches.
    pub fn find_matching(
        &self,
        input: MatchInput<'_>,
        min_score: f64,
        max_results: usize,
    ) -> SmartpickResult<Vec<QueryMatch>> {
        let extracted;
        let keywords = match input {
            MatchInput::Text(text) => {
                extracted = self.extractor.extract(text);
                &extracted
            }
            MatchInput::Keywords(keywords) => keywords,
        };
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let total_weight: u32 = keywords.iter().map(|k| self.extractor.weight(k)).sum();
        let mut match_weights: HashMap<&str, u32> = HashMap::new();
        for keyword in keywords {
            let weight = self.extractor.weight(keyword);
            for query_id in self.index.queries_by_keyword(keyword)? {
                *match_weights.entry(query_id.as_str()).or_insert(0) += weight;
            }
        }
        if match_weights.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches = Vec::with_capacity(match_weights.len());
        for (query_id, match_weight) in match_weights {
            let score = if total_weight > 0 {
                f64::from(match_weight) / f64::from(total_weight)
            } else {
                0.0
            };
            if score < min_score {
                continue;
            }
            if let Some(record) = self.index.query_info(query_id)? {
                matches.push(QueryMatch {
                    query_id: query_id.to_string(),
                    score,
                    record: record.clone(),
                });
            }
        }
        matches.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.query_id.cmp(&b.query_id))
        });

        let Some(top) = matches.first().map(|m| m.score) else {
            return Ok(matches);
        };
        let second = matches.get(1).map(|m| m.score);

        if top >= HIGH_CONFIDENCE || second.is_some_and(|s| top - s >= CLEAR_MARGIN) {
            matches.truncate(1);
        } else if top < MIN_CONFIDENCE {
            debug!(top, "best match below confidence floor");
            matches.clear();
        } else {
            matches.truncate(max_results);
        }
        Ok(matches)
    }
}
