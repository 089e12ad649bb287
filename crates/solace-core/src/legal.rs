//! Legal reference matcher: keyword rules over a static section dataset,
//! with a best-effort LLM suggestion when no rule matches.
//!
//! Shallow keyword matching only — annotations are informational, never
//! legal reasoning. Absence of annotations is always a valid outcome.

use crate::generate::{GenerationBackend, SamplingParams};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

/// Keyword rules per section, checked in declaration order (not
/// severity-ranked).
const SECTION_KEYWORDS: &[(&str, &[&str])] = &[
    ("354A", &["sexual", "harassment", "unwelcome", "advances", "favours", "explicit"]),
    ("354D", &["stalk", "stalking", "follow", "following", "repeatedly"]),
    ("499", &["defame", "defamation", "reputation", "false", "statement"]),
    ("503", &["threat", "threaten", "intimidate", "injury", "alarm"]),
    ("504", &["insult", "provoke", "breach", "peace", "intentionally"]),
    ("506", &["criminal", "intimidation", "punishment"]),
    ("509", &["modesty", "woman", "word", "gesture", "insult"]),
];

const SUGGESTION_PARAMS: SamplingParams =
    SamplingParams { temperature: 0.3, max_tokens: 128, top_p: None };

/// One entry of the section dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct LegalSection {
    pub section: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SectionBody {
    title: String,
    description: String,
}

/// A section identifier plus its rendered human-readable annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalAnnotation {
    /// Identifier used for the verbatim-duplicate check against the reply.
    pub section: String,
    pub rendered: String,
}

/// Keyword matcher over the section dataset. An empty dataset makes every
/// operation a no-op.
#[derive(Debug, Default)]
pub struct LegalMatcher {
    sections: Vec<LegalSection>,
}

impl LegalMatcher {
    pub fn from_sections(sections: Vec<LegalSection>) -> Self {
        Self { sections }
    }

    /// Loads the dataset from a JSON file: either a list of
    /// `{section, title, description}` or a map of `section -> {title,
    /// description}`. A missing or unreadable file is non-fatal and yields an
    /// empty (no-op) matcher.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(target: "solace::legal", "Legal dataset not loaded from {}: {} (annotation disabled)", path.display(), e);
                return Self::default();
            }
        };

        if let Ok(list) = serde_json::from_str::<Vec<LegalSection>>(&raw) {
            return Self::from_sections(list);
        }
        match serde_json::from_str::<std::collections::BTreeMap<String, SectionBody>>(&raw) {
            Ok(map) => Self::from_sections(
                map.into_iter()
                    .map(|(section, body)| LegalSection {
                        section,
                        title: body.title,
                        description: body.description,
                    })
                    .collect(),
            ),
            Err(e) => {
                warn!(target: "solace::legal", "Legal dataset format unknown in {}: {} (annotation disabled)", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Sections whose keyword set matches the message (case-insensitive
    /// substring), rendered in rule declaration order.
    pub fn match_sections(&self, message: &str) -> Vec<LegalAnnotation> {
        if self.sections.is_empty() {
            return Vec::new();
        }
        let lower = message.to_lowercase();
        let mut matches = Vec::new();
        for (section_num, keywords) in SECTION_KEYWORDS {
            if !keywords.iter().any(|kw| lower.contains(kw)) {
                continue;
            }
            if let Some(data) = self.sections.iter().find(|s| s.section == *section_num) {
                matches.push(LegalAnnotation {
                    section: data.section.clone(),
                    rendered: format!(
                        "⚖️ IPC Section {}: {} — {}",
                        data.section, data.title, data.description
                    ),
                });
            }
        }
        matches
    }

    /// Best-effort single-shot LLM suggestion when no rule matched. The raw
    /// output is an opaque, non-authoritative string; every backend error is
    /// swallowed.
    pub async fn suggest(
        &self,
        message: &str,
        backend: &dyn GenerationBackend,
    ) -> Option<LegalAnnotation> {
        if self.sections.is_empty() {
            return None;
        }
        let known: Vec<&str> = self.sections.iter().map(|s| s.section.as_str()).collect();
        let prompt = format!(
            "Which Indian IPC sections ({}) might apply to this situation: '{}'? \
             Respond with only the section number(s) and brief title, e.g., '354A: Sexual harassment'.",
            known.join(", "),
            message
        );
        match backend.complete(&prompt, SUGGESTION_PARAMS).await {
            Ok(text) => {
                let suggestion = text.trim();
                if suggestion.is_empty() {
                    return None;
                }
                let identifier = suggestion
                    .split(|c: char| c == ':' || c.is_whitespace())
                    .next()
                    .unwrap_or(suggestion)
                    .to_string();
                Some(LegalAnnotation {
                    section: identifier,
                    rendered: format!("⚖️ Suggested IPC: {suggestion}"),
                })
            }
            Err(e) => {
                warn!(target: "solace::legal", "IPC suggestion error (ignored): {}", e);
                None
            }
        }
    }
}

/// Appends annotations to the reply, skipping any whose section identifier
/// already appears verbatim in the text. Re-running is a no-op for sections
/// already present.
pub fn append_annotations(reply: &mut String, annotations: &[LegalAnnotation]) {
    for annotation in annotations {
        if reply.contains(&annotation.section) {
            continue;
        }
        reply.push_str("\n\n");
        reply.push_str(&annotation.rendered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::MockBackend;

    fn test_sections() -> Vec<LegalSection> {
        vec![
            LegalSection {
                section: "354D".into(),
                title: "Stalking".into(),
                description: "Following or contacting a person despite clear disinterest".into(),
            },
            LegalSection {
                section: "503".into(),
                title: "Criminal intimidation".into(),
                description: "Threatening injury to person, reputation or property".into(),
            },
        ]
    }

    #[test]
    fn keyword_rules_match_in_declaration_order() {
        let matcher = LegalMatcher::from_sections(test_sections());
        let annotations = matcher.match_sections("He keeps stalking me and made a threat");
        let sections: Vec<&str> = annotations.iter().map(|a| a.section.as_str()).collect();
        assert_eq!(sections, vec!["354D", "503"]);
        assert!(annotations[0].rendered.starts_with("⚖️ IPC Section 354D: Stalking"));
    }

    #[test]
    fn unmatched_message_yields_no_annotations() {
        let matcher = LegalMatcher::from_sections(test_sections());
        assert!(matcher.match_sections("I feel anxious about my exam").is_empty());
    }

    #[test]
    fn missing_dataset_is_a_noop() {
        let matcher = LegalMatcher::load("does/not/exist.json");
        assert!(matcher.is_empty());
        assert!(matcher.match_sections("stalking threat").is_empty());
    }

    #[test]
    fn dataset_accepts_list_and_map_forms() {
        let dir = tempfile::tempdir().unwrap();
        let list_path = dir.path().join("list.json");
        std::fs::write(
            &list_path,
            r#"[{"section":"354D","title":"Stalking","description":"d"}]"#,
        )
        .unwrap();
        let map_path = dir.path().join("map.json");
        std::fs::write(
            &map_path,
            r#"{"503":{"title":"Criminal intimidation","description":"d"}}"#,
        )
        .unwrap();

        assert_eq!(LegalMatcher::load(&list_path).len(), 1);
        assert_eq!(LegalMatcher::load(&map_path).len(), 1);
    }

    #[test]
    fn append_skips_sections_already_in_reply() {
        let matcher = LegalMatcher::from_sections(test_sections());
        let annotations = matcher.match_sections("stalking and a threat");

        let mut reply = "Section 354D already covers stalking.".to_string();
        append_annotations(&mut reply, &annotations);
        assert_eq!(reply.matches("354D").count(), 1);
        assert!(reply.contains("503"));

        // Re-running annotation does not duplicate anything.
        let before = reply.clone();
        append_annotations(&mut reply, &annotations);
        assert_eq!(reply, before);
    }

    #[tokio::test]
    async fn suggestion_errors_are_swallowed() {
        let matcher = LegalMatcher::from_sections(test_sections());
        let backend = MockBackend::always_failing();
        assert!(matcher.suggest("an odd situation", &backend).await.is_none());
    }

    #[tokio::test]
    async fn suggestion_wraps_raw_backend_text() {
        let matcher = LegalMatcher::from_sections(test_sections());
        let backend = MockBackend::new();
        let annotation = matcher.suggest("an odd situation", &backend).await.unwrap();
        assert!(annotation.rendered.starts_with("⚖️ Suggested IPC: "));
    }
}
