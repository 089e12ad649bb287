//! Emotion and harassment classification: tiers, traits, and the lexicon
//! classifiers used when no model backend is wired in.
//!
//! Classifiers are deterministic and side-effect-free. Empty or
//! whitespace-only text short-circuits to a neutral/zero result.

use serde::{Deserialize, Serialize};

/// Boolean harassment flag threshold. Independent of the tier boundary at
/// 0.6: a score in [0.55, 0.6) is flagged as harassment while the tier stays
/// Medium. Both values are intentional and must not be unified.
pub const HARASSMENT_FLAG_THRESHOLD: f32 = 0.55;

/// Discrete severity bucket derived from a continuous harassment score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SeverityTier {
    Low,
    Medium,
    High,
}

impl SeverityTier {
    /// Tier from a harassment score: < 0.3 Low, < 0.6 Medium, else High.
    pub fn from_score(score: f32) -> Self {
        if score < 0.3 {
            SeverityTier::Low
        } else if score < 0.6 {
            SeverityTier::Medium
        } else {
            SeverityTier::High
        }
    }

    /// Case-insensitive parse of "low" / "medium" / "high".
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" => Some(SeverityTier::Low),
            "medium" => Some(SeverityTier::Medium),
            "high" => Some(SeverityTier::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityTier::Low => "Low",
            SeverityTier::Medium => "Medium",
            SeverityTier::High => "High",
        }
    }
}

impl std::fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request classification output. Not persisted beyond the analytics
/// entry for the request.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    pub emotion: String,
    pub score: f32,
    pub tier: SeverityTier,
    pub keywords: Vec<String>,
}

/// Maps text to an emotion label (happy, sad, angry, fear, anxiety, calm,
/// neutral). Must be deterministic and side-effect-free.
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, text: &str) -> String;
}

/// Maps text to a harassment score in [0.0, 1.0] and extracts matched
/// keywords. Must be deterministic and side-effect-free.
pub trait HarassmentClassifier: Send + Sync {
    /// Harassment probability score, 0.0 for empty input.
    fn score(&self, text: &str) -> f32;

    /// Severity tier plus the matched keyword list (deduplicated,
    /// first-seen order).
    fn analyze(&self, text: &str) -> (SeverityTier, Vec<String>);
}

// ---------------------------------------------------------------------------
// Lexicon classifiers
// ---------------------------------------------------------------------------

const ANXIETY_KEYWORDS: &[&str] = &[
    "anxious", "anxiety", "worried", "worry", "nervous", "panic", "stressed", "stress",
];

const EMOTION_LEXICON: &[(&str, &[&str])] = &[
    ("happy", &["happy", "glad", "joy", "excited", "wonderful", "grateful", "thankful", "great"]),
    ("sad", &["sad", "depressed", "lonely", "crying", "cried", "miserable", "heartbroken", "hopeless"]),
    ("angry", &["angry", "furious", "hate", "annoyed", "mad", "disgusted", "disgusting"]),
    ("fear", &["afraid", "scared", "terrified", "fear", "frightened", "dread"]),
    ("calm", &["calm", "relaxed", "peaceful", "relieved", "okay"]),
];

/// Keyword-lexicon emotion classifier. Anxiety keywords override a fear or
/// neutral reading, matching the behavior of the fine-tuned model it stands
/// in for.
#[derive(Debug, Default)]
pub struct LexiconEmotionClassifier;

impl LexiconEmotionClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl EmotionClassifier for LexiconEmotionClassifier {
    fn classify(&self, text: &str) -> String {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return "neutral".to_string();
        }

        let mut emotion = "neutral";
        for &(label, keywords) in EMOTION_LEXICON {
            if keywords.iter().any(|kw| text.contains(kw)) {
                emotion = label;
                break;
            }
        }

        let has_anxiety = ANXIETY_KEYWORDS.iter().any(|kw| text.contains(kw));
        if has_anxiety && (emotion == "fear" || emotion == "neutral") {
            emotion = "anxiety";
        }

        emotion.to_string()
    }
}

/// Explicit content: any hit floors the score at 0.75.
const EXPLICIT_KEYWORDS: &[&str] = &[
    "sex", "sexual", "harass", "harassment", "molest", "explicit", "rape", "stalking",
    "abuse", "inappropriate", "touch",
];

/// Direct aggression: each hit contributes 0.35.
const STRONG_KEYWORDS: &[&str] = &[
    "threat", "threaten", "stalk", "blackmail", "intimidat", "violence", "forced", "assault",
];

/// Demeaning language: each hit contributes 0.15.
const MILD_KEYWORDS: &[&str] = &[
    "insult", "stupid", "idiot", "shut up", "loser", "ugly", "worthless", "pathetic",
];

/// Keywords extracted for the response payload.
const EXTRACTION_KEYWORDS: &[&str] = &[
    "abuse", "abusive", "threat", "threaten", "harass", "harassment", "violence", "stalk",
    "stalking", "blackmail", "insult", "touch", "sex", "sexual", "explicit", "remarks",
    "favour", "woman", "modesty", "unwanted", "coworker", "colleague", "stop", "intimidat",
    "forced",
];

/// Keyword-lexicon harassment scorer with an explicit-keyword floor.
#[derive(Debug, Default)]
pub struct LexiconHarassmentClassifier;

impl LexiconHarassmentClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl HarassmentClassifier for LexiconHarassmentClassifier {
    fn score(&self, text: &str) -> f32 {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return 0.0;
        }

        let mut score = 0.0_f32;
        for kw in STRONG_KEYWORDS {
            if text.contains(kw) {
                score += 0.35;
            }
        }
        for kw in MILD_KEYWORDS {
            if text.contains(kw) {
                score += 0.15;
            }
        }
        if EXPLICIT_KEYWORDS.iter().any(|kw| text.contains(kw)) {
            score = score.max(0.75);
        }
        score.min(1.0)
    }

    fn analyze(&self, text: &str) -> (SeverityTier, Vec<String>) {
        let tier = SeverityTier::from_score(self.score(text));
        let lower = text.trim().to_lowercase();

        let mut keywords: Vec<String> = Vec::new();
        for kw in EXTRACTION_KEYWORDS {
            if lower.contains(kw) && !keywords.iter().any(|k| k == kw) {
                keywords.push((*kw).to_string());
            }
        }
        (tier, keywords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundaries_are_monotonic() {
        assert_eq!(SeverityTier::from_score(0.0), SeverityTier::Low);
        assert_eq!(SeverityTier::from_score(0.29), SeverityTier::Low);
        assert_eq!(SeverityTier::from_score(0.3), SeverityTier::Medium);
        assert_eq!(SeverityTier::from_score(0.59), SeverityTier::Medium);
        assert_eq!(SeverityTier::from_score(0.6), SeverityTier::High);
        assert_eq!(SeverityTier::from_score(1.0), SeverityTier::High);
    }

    #[test]
    fn flag_threshold_is_independent_of_tier_boundary() {
        // 0.5: Medium tier, not flagged.
        assert_eq!(SeverityTier::from_score(0.5), SeverityTier::Medium);
        assert!(0.5 < HARASSMENT_FLAG_THRESHOLD);
        // 0.57: still Medium, but flagged.
        assert_eq!(SeverityTier::from_score(0.57), SeverityTier::Medium);
        assert!(0.57 >= HARASSMENT_FLAG_THRESHOLD);
    }

    #[test]
    fn tier_ordering_follows_severity() {
        assert!(SeverityTier::Low < SeverityTier::Medium);
        assert!(SeverityTier::Medium < SeverityTier::High);
    }

    #[test]
    fn empty_text_short_circuits_to_neutral_zero() {
        let emotions = LexiconEmotionClassifier::new();
        let harassment = LexiconHarassmentClassifier::new();
        assert_eq!(emotions.classify("   "), "neutral");
        assert_eq!(harassment.score(""), 0.0);
        let (tier, keywords) = harassment.analyze("  \t ");
        assert_eq!(tier, SeverityTier::Low);
        assert!(keywords.is_empty());
    }

    #[test]
    fn anxiety_keywords_override_fear_and_neutral() {
        let emotions = LexiconEmotionClassifier::new();
        assert_eq!(emotions.classify("I feel anxious about my exam"), "anxiety");
        assert_eq!(emotions.classify("I am scared and so worried"), "anxiety");
        // Anxiety does not override a clear non-fear emotion.
        assert_eq!(emotions.classify("I am furious and stressed"), "angry");
    }

    #[test]
    fn explicit_keywords_floor_the_score() {
        let harassment = LexiconHarassmentClassifier::new();
        let score = harassment.score("he keeps stalking me");
        assert!(score >= 0.75);
        assert_eq!(SeverityTier::from_score(score), SeverityTier::High);
    }

    #[test]
    fn benign_text_scores_low() {
        let harassment = LexiconHarassmentClassifier::new();
        let score = harassment.score("I feel anxious about my exam");
        assert_eq!(SeverityTier::from_score(score), SeverityTier::Low);
        assert!(score < HARASSMENT_FLAG_THRESHOLD);
    }

    #[test]
    fn analyze_extracts_deduplicated_keywords() {
        let harassment = LexiconHarassmentClassifier::new();
        let (tier, keywords) = harassment.analyze("He made a threat, then another threat, stalking me");
        assert!(tier >= SeverityTier::Medium);
        assert_eq!(
            keywords,
            vec!["threat".to_string(), "stalk".to_string(), "stalking".to_string()]
        );
    }

    #[test]
    fn from_label_parses_case_insensitively() {
        assert_eq!(SeverityTier::from_label("high"), Some(SeverityTier::High));
        assert_eq!(SeverityTier::from_label(" Medium "), Some(SeverityTier::Medium));
        assert_eq!(SeverityTier::from_label("none"), None);
    }
}
