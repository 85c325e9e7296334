use crate::vocabulary::{VocabularyConfig, WeightConfig};
use regex::Regex;
use serde::{Deserialize, Serialize};
use smartpick_core::{SmartpickError, SmartpickResult};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Popularity tier of a vocabulary keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// The 20 most popular keywords.
    Top20,
    /// Ranked 21 to 40.
    Top40,
    /// Ranked 41 to 80.
    Top80,
}

/// Keywords grouped by cumulative tier: `top80` holds every tiered keyword,
/// `top40` the ones in the top 40, `top20` the ones in the top 20.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierMatch {
    /// Keywords in the top 20.
    pub top20: Vec<String>,
    /// Keywords in the top 40.
    pub top40: Vec<String>,
    /// Keywords in any tier.
    pub top80: Vec<String>,
}

/// Extracts, classifies and weights keywords using a [`VocabularyConfig`].
///
/// All vocabulary terms are lowercased once at construction; extracted
/// keywords are lowercase too, so matching is case-insensitive.
pub struct KeywordExtractor {
    token_re: Regex,
    category_names: Vec<String>,
    category_of: HashMap<String, usize>,
    tier_of: HashMap<String, Tier>,
    synonyms: HashMap<String, String>,
    stopwords: HashSet<String>,
    /// Longest first, so `에서` is tried before `에`.
    particles: Vec<String>,
    weights: WeightConfig,
}

impl KeywordExtractor {
    /// Build an extractor, lowercasing every vocabulary term.
    pub fn new(vocabulary: &VocabularyConfig) -> SmartpickResult<Self> {
        let token_re = Regex::new(r"[\p{L}\p{N}]+(?:-[\p{L}\p{N}]+)*")
            .map_err(|e| SmartpickError::Config(format!("Invalid token pattern: {e}")))?;

        let mut category_of = HashMap::new();
        for (idx, category) in vocabulary.categories.iter().enumerate() {
            for keyword in &category.keywords {
                category_of.entry(keyword.to_lowercase()).or_insert(idx);
            }
        }

        let mut tier_of = HashMap::new();
        for (tier, list) in [
            (Tier::Top20, &vocabulary.tiers.top20),
            (Tier::Top40, &vocabulary.tiers.top40),
            (Tier::Top80, &vocabulary.tiers.top80),
        ] {
            for keyword in list {
                tier_of.entry(keyword.to_lowercase()).or_insert(tier);
            }
        }

        let mut particles: Vec<String> = vocabulary.particles.iter().map(|p| p.to_lowercase()).collect();
        particles.sort_by_key(|p| std::cmp::Reverse(p.chars().count()));

        Ok(Self {
            token_re,
            category_names: vocabulary.categories.iter().map(|c| c.name.clone()).collect(),
            category_of,
            tier_of,
            synonyms: vocabulary
                .synonyms
                .iter()
                .map(|(from, to)| (from.to_lowercase(), to.to_lowercase()))
                .collect(),
            stopwords: vocabulary.stopwords.iter().map(|s| s.to_lowercase()).collect(),
            particles,
            weights: vocabulary.weights,
        })
    }

    /// Extractor over the built-in tablet vocabulary.
    pub fn tablet() -> SmartpickResult<Self> {
        Self::new(&VocabularyConfig::tablet_defaults())
    }

    /// Content-bearing keywords of `text`, canonicalized and de-duplicated.
    pub fn extract(&self, text: &str) -> BTreeSet<String> {
        let mut keywords = BTreeSet::new();
        for m in self.token_re.find_iter(text) {
            let mut token = m.as_str().to_lowercase();

            if !self.is_vocabulary(&token) {
                if let Some(stem) = self.strip_particle(&token) {
                    token = stem;
                }
            }
            if self.stopwords.contains(&token) {
                continue;
            }
            if token.chars().count() < 2 && !self.is_vocabulary(&token) {
                continue;
            }

            let canonical = self.synonyms.get(&token).cloned().unwrap_or(token);
            keywords.insert(canonical);
        }
        keywords
    }

    /// Group `keywords` by category. Every configured category is present,
    /// possibly empty.
    pub fn categorize<'k>(
        &self,
        keywords: impl IntoIterator<Item = &'k String>,
    ) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = self
            .category_names
            .iter()
            .map(|name| (name.clone(), Vec::new()))
            .collect();
        for keyword in keywords {
            if let Some(&idx) = self.category_of.get(keyword) {
                if let Some(list) = out.get_mut(&self.category_names[idx]) {
                    list.push(keyword.clone());
                }
            }
        }
        out
    }

    /// Cumulative tier membership of `keywords`.
    pub fn tiers<'k>(&self, keywords: impl IntoIterator<Item = &'k String>) -> TierMatch {
        let mut out = TierMatch::default();
        for keyword in keywords {
            let Some(&tier) = self.tier_of.get(keyword) else {
                continue;
            };
            out.top80.push(keyword.clone());
            if tier <= Tier::Top40 {
                out.top40.push(keyword.clone());
            }
            if tier == Tier::Top20 {
                out.top20.push(keyword.clone());
            }
        }
        out
    }

    /// Tier `keyword` first appears in, if any.
    pub fn tier_of(&self, keyword: &str) -> Option<Tier> {
        self.tier_of.get(keyword).copied()
    }

    /// `category·[in any category] + tier bonus`, never below the floor.
    pub fn weight(&self, keyword: &str) -> u32 {
        let mut weight = 0;
        if self.category_of.contains_key(keyword) {
            weight += self.weights.category;
        }
        weight += match self.tier_of.get(keyword) {
            Some(Tier::Top20) => self.weights.top20,
            Some(Tier::Top40) => self.weights.top40,
            Some(Tier::Top80) => self.weights.top80,
            None => 0,
        };
        weight.max(self.weights.floor)
    }

    fn is_vocabulary(&self, token: &str) -> bool {
        self.category_of.contains_key(token)
            || self.tier_of.contains_key(token)
            || self.synonyms.contains_key(token)
    }

    fn strip_particle(&self, token: &str) -> Option<String> {
        let len = token.chars().count();
        self.particles.iter().find_map(|particle| {
            let stem = token.strip_suffix(particle.as_str())?;
            (len - particle.chars().count() >= 2).then(|| stem.to_string())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn extractor() -> KeywordExtractor {
        KeywordExtractor::tablet().unwrap()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_extract_strips_particles_and_stopwords() {
        let kw = extractor().extract("배터리 수명이 긴 태블릿 추천");
        assert_eq!(kw, set(&["배터리", "수명", "태블릿"]));
    }

    #[test]
    fn test_extract_applies_synonyms() {
        let kw = extractor().extract("그림 그리기 좋은 패드, 모니터는 커야 함");
        assert!(kw.contains("드로잉"));
        assert!(kw.contains("아이패드"));
        assert!(kw.contains("화면"));
        assert!(!kw.contains("그림"));
        assert!(!kw.contains("좋은"));
    }

    #[test]
    fn test_extract_keeps_hyphenated_and_lowercases() {
        let kw = extractor().extract("USB-C 충전, Wi-Fi 모델 / LG");
        assert!(kw.contains("usb-c"));
        assert!(kw.contains("wi-fi"));
        assert!(kw.contains("lg"));
        assert!(kw.contains("충전"));
    }

    #[test]
    fn test_vocabulary_terms_are_not_stripped() {
        // 어린이 ends with the particle 이 but is a vocabulary term.
        let kw = extractor().extract("어린이 노트북");
        assert_eq!(kw, set(&["어린이", "노트북"]));
    }

    #[test]
    fn test_single_char_vocabulary_kept() {
        let kw = extractor().extract("램 큰 거");
        assert_eq!(kw, set(&["램"]));
    }

    #[test]
    fn test_short_stem_not_stripped() {
        let kw = extractor().extract("사용");
        assert_eq!(kw, set(&["사용"]));
    }

    #[test]
    fn test_weights() {
        let ex = extractor();
        assert_eq!(ex.weight("배터리"), 6); // category + top20
        assert_eq!(ex.weight("화질"), 5); // category + top40
        assert_eq!(ex.weight("웹툰"), 4); // category + top80
        assert_eq!(ex.weight("애니메이션"), 3); // category only
        assert_eq!(ex.weight("펜"), 3); // top20 only
        assert_eq!(ex.weight("amoled"), 1); // top80 only
        assert_eq!(ex.weight("태블릿"), 1); // floor
    }

    #[test]
    fn test_synonym_targets_keep_their_weight() {
        let vocabulary = VocabularyConfig::tablet_defaults();
        let ex = KeywordExtractor::new(&vocabulary).unwrap();
        for (from, to) in &vocabulary.synonyms {
            assert!(
                ex.weight(to) >= ex.weight(from),
                "{from} ({}) -> {to} ({})",
                ex.weight(from),
                ex.weight(to)
            );
        }
        assert_eq!(ex.weight("개발"), ex.weight("프로그래밍"));
        assert_eq!(ex.weight("드로잉"), 6);
        assert_eq!(ex.extract("코딩용 태블릿"), set(&["개발", "태블릿"]));
    }

    #[test]
    fn test_categorize_and_tiers() {
        let ex = extractor();
        let kw = set(&["배터리", "게임", "아이패드", "가성비", "화질", "웹툰", "태블릿"]);
        let cats = ex.categorize(&kw);
        assert_eq!(cats["features"], vec!["배터리", "화질"]);
        assert_eq!(cats["usage"], vec!["게임", "웹툰"]);
        assert_eq!(cats["brands"], vec!["아이패드"]);
        assert_eq!(cats["others"], vec!["가성비"]);

        let tiers = ex.tiers(&kw);
        assert_eq!(tiers.top20.len(), 4);
        assert_eq!(tiers.top40.len(), 5);
        assert_eq!(tiers.top80.len(), 6);
        assert_eq!(ex.tier_of("웹툰"), Some(Tier::Top80));
    }
}
