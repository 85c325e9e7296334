use serde::{Deserialize, Serialize};
use smartpick_core::{SmartpickError, SmartpickResult};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Hand-curated vocabulary driving keyword extraction and weighting.
///
/// Loadable from TOML so a deployment can swap the domain without a rebuild;
/// [`VocabularyConfig::tablet_defaults`] is the built-in tablet vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyConfig {
    /// Tokens that never become keywords.
    #[serde(default)]
    pub stopwords: Vec<String>,
    /// Trailing particles stripped from non-vocabulary tokens.
    #[serde(default)]
    pub particles: Vec<String>,
    /// Category vocabularies, checked in order; a keyword belongs to the
    /// first category listing it.
    #[serde(default)]
    pub categories: Vec<CategoryVocabulary>,
    /// Popularity tiers.
    #[serde(default)]
    pub tiers: TierVocabulary,
    /// Surface form → canonical keyword.
    #[serde(default)]
    pub synonyms: BTreeMap<String, String>,
    /// Weight components.
    #[serde(default)]
    pub weights: WeightConfig,
}

/// One named category and its keywords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryVocabulary {
    /// Category name, e.g. `features`.
    pub name: String,
    /// Keywords in the category.
    pub keywords: Vec<String>,
}

/// Popularity tiers. Each list holds only the keywords new to that tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierVocabulary {
    /// The 20 most popular keywords.
    #[serde(default)]
    pub top20: Vec<String>,
    /// Keywords ranked 21 to 40.
    #[serde(default)]
    pub top40: Vec<String>,
    /// Keywords ranked 41 to 80.
    #[serde(default)]
    pub top80: Vec<String>,
}

/// Keyword weight components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightConfig {
    /// Added when the keyword is in any category.
    #[serde(default = "default_category_weight")]
    pub category: u32,
    /// Bonus for top-20 keywords.
    #[serde(default = "default_top20_bonus")]
    pub top20: u32,
    /// Bonus for top-40 keywords.
    #[serde(default = "default_top40_bonus")]
    pub top40: u32,
    /// Bonus for top-80 keywords.
    #[serde(default = "default_top80_bonus")]
    pub top80: u32,
    /// Minimum weight of any keyword.
    #[serde(default = "default_floor")]
    pub floor: u32,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            category: default_category_weight(),
            top20: default_top20_bonus(),
            top40: default_top40_bonus(),
            top80: default_top80_bonus(),
            floor: default_floor(),
        }
    }
}

fn default_category_weight() -> u32 {
    3
}
fn default_top20_bonus() -> u32 {
    3
}
fn default_top40_bonus() -> u32 {
    2
}
fn default_top80_bonus() -> u32 {
    1
}
fn default_floor() -> u32 {
    1
}

impl VocabularyConfig {
    /// Parse a vocabulary from TOML text.
    pub fn from_toml_str(s: &str) -> SmartpickResult<Self> {
        let vocabulary: VocabularyConfig = toml::from_str(s)?;
        if vocabulary.weights.floor == 0 {
            return Err(SmartpickError::Config(
                "vocabulary weights.floor must be at least 1".to_string(),
            ));
        }
        Ok(vocabulary)
    }

    /// Read a vocabulary TOML file.
    pub fn load(path: &Path) -> SmartpickResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SmartpickError::Config(format!(
                "Failed to read vocabulary '{}': {e}",
                path.display()
            ))
        })?;
        let vocabulary = Self::from_toml_str(&raw)?;
        debug!(
            path = %path.display(),
            categories = vocabulary.categories.len(),
            "vocabulary loaded"
        );
        Ok(vocabulary)
    }

    /// The tablet-recommendation vocabulary.
    pub fn tablet_defaults() -> Self {
        Self {
            categories: vec![
                category(
                    "features",
                    &[
                        "성능", "배터리", "화면", "무게", "휴대성", "저장용량", "속도", "램",
                        "칩셋", "화질", "해상도", "주사율", "발열", "멀티태스킹", "충전",
                        "키보드", "카메라", "스피커", "음질", "밝기", "디자인", "내구성", "방수",
                    ],
                ),
                category(
                    "usage",
                    &[
                        "공부", "필기", "그림", "영상", "영화", "게임", "웹서핑", "독서",
                        "전자책", "웹툰", "드로잉", "애니메이션", "프로그래밍", "개발", "인터넷", "인강",
                        "유튜브", "넷플릭스", "OTT", "카카오톡", "문서", "어린이", "영상통화",
                        "학습", "노트북",
                    ],
                ),
                category(
                    "brands",
                    &[
                        "아이패드", "갤럭시탭", "애플", "삼성", "레노버", "샤오미", "화웨이", "LG",
                        "서피스", "안드로이드", "iOS",
                    ],
                ),
                category(
                    "others",
                    &[
                        "가성비", "가격", "S펜", "애플펜슬", "생태계", "연동", "호환성",
                        "업데이트", "AS", "Wi-Fi", "LTE", "SD카드", "USB-C", "필압", "필기감",
                        "인치", "크기", "메모리", "렉", "터치",
                    ],
                ),
            ],
            tiers: TierVocabulary {
                top20: strings(&[
                    "성능", "배터리", "화면", "가격", "가성비", "무게", "휴대성", "저장용량",
                    "공부", "필기", "드로잉", "영상", "게임", "아이패드", "갤럭시탭", "삼성", "애플",
                    "영화", "유튜브", "펜",
                ]),
                top40: strings(&[
                    "화질", "해상도", "주사율", "램", "칩셋", "발열", "멀티태스킹", "충전",
                    "키보드", "디스플레이", "디자인", "S펜", "애플펜슬", "레노버", "샤오미",
                    "서피스", "안드로이드", "iOS", "넷플릭스", "인강",
                ]),
                top80: strings(&[
                    "화웨이", "LG", "웹서핑", "독서", "전자책", "웹툰", "카카오톡", "내구성",
                    "연동", "SD카드", "USB-C", "스피커", "생태계", "속도", "밝기", "호환성",
                    "업데이트", "노트북", "LTE", "OTT", "카메라", "인치", "AMOLED", "IPS", "크기",
                    "메모리", "음질", "렉", "터치", "필압", "이북", "AS", "Wi-Fi", "방수", "필기감",
                    "강의", "어린이", "문서", "학습", "영상통화",
                ]),
            },
            synonyms: [
                ("그림", "드로잉"),
                ("그리기", "드로잉"),
                ("아트", "드로잉"),
                ("패드", "아이패드"),
                ("디스플레이", "화면"),
                ("모니터", "화면"),
                ("스크린", "화면"),
                ("랩탭", "노트북"),
                ("게이밍", "게임"),
                ("프로그래밍", "개발"),
                ("코딩", "개발"),
                ("작은", "소형"),
                ("전자책", "독서"),
                ("이북", "독서"),
            ]
            .into_iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect(),
            stopwords: strings(&[
                "추천", "추천해줘", "추천해주세요", "해주세요", "알려줘", "알려주세요", "좀",
                "어떤", "무슨", "뭐", "뭐가", "있나요", "있을까요", "싶어요", "싶은", "좋은",
                "괜찮은", "제품", "요즘",
            ]),
            particles: strings(&[
                "에서", "으로", "이랑", "에게", "까지", "부터", "보다", "처럼", "하고", "이", "가",
                "은", "는", "을", "를", "의", "에", "로", "와", "과", "도", "만", "용",
            ]),
            weights: WeightConfig::default(),
        }
    }
}

fn category(name: &str, keywords: &[&str]) -> CategoryVocabulary {
    CategoryVocabulary {
        name: name.to_string(),
        keywords: strings(keywords),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tablet_defaults_shape() {
        let v = VocabularyConfig::tablet_defaults();
        let names: Vec<&str> = v.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["features", "usage", "brands", "others"]);
        assert_eq!(v.tiers.top20.len(), 20);
        assert_eq!(v.tiers.top40.len(), 20);
        assert_eq!(v.tiers.top80.len(), 40);
        assert_eq!(v.synonyms.get("코딩").map(String::as_str), Some("개발"));
        assert_eq!(v.weights, WeightConfig::default());
    }

    #[test]
    fn test_toml_vocabulary() {
        let v = VocabularyConfig::from_toml_str(
            r#"
            stopwords = ["please"]
            particles = []

            [[categories]]
            name = "features"
            keywords = ["battery", "screen"]

            [tiers]
            top20 = ["battery"]

            [synonyms]
            display = "screen"

            [weights]
            category = 2
            "#,
        )
        .unwrap();
        assert_eq!(v.categories[0].keywords, vec!["battery", "screen"]);
        assert_eq!(v.tiers.top20, vec!["battery"]);
        assert!(v.tiers.top80.is_empty());
        assert_eq!(v.weights.category, 2);
        assert_eq!(v.weights.top20, 3);
    }

    #[test]
    fn test_zero_floor_rejected() {
        let err = VocabularyConfig::from_toml_str("[weights]\nfloor = 0\n").unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_load_missing_vocabulary() {
        let tmp = tempfile::tempdir().unwrap();
        let err = VocabularyConfig::load(&tmp.path().join("nope.toml")).unwrap_err();
        assert!(err.is_config());
    }
}
