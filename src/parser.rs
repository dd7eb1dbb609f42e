//! Heuristic extraction of a structured [`Analysis`] from freeform model
//! output.
//!
//! The model is asked for four headed bullet sections plus a closing
//! paragraph, but nothing guarantees it complies. The parser is therefore
//! deliberately low precision / high availability: it scans for known
//! header keywords, collects list items, and substitutes fixed fallback
//! text for anything it cannot find. It never fails.

use serde::{Deserialize, Serialize};

const NEGATIVE_FALLBACK: &str = "No specific negative patterns stood out this time.";
const POSITIVE_FALLBACK: &str =
    "You showed up and reflected honestly - that itself is a strength.";
const AFFIRMATION_FALLBACK: &str = "I am allowed to take this one day at a time.";
const ACTIONABLE_FALLBACK: &str =
    "Keep journaling regularly and revisit this reflection in a few days.";
const ENCOURAGEMENT_FALLBACK: &str =
    "Thank you for taking the time to reflect. Every session like this is a step toward knowing yourself better.";

// Header keywords per section, matched case-insensitively as substrings.
const NEGATIVE_KEYWORDS: &[&str] = &["negative patterns", "patterns to address", "challenges"];
const POSITIVE_KEYWORDS: &[&str] = &["positive patterns", "strengths", "what's working"];
const AFFIRMATION_KEYWORDS: &[&str] = &["affirmations"];
const ACTIONABLE_KEYWORDS: &[&str] = &["actionable steps", "action steps", "next steps", "suggestions"];

/// Structured self-reflection derived once from a single raw model response.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Analysis {
    pub negative_patterns: Vec<String>,
    pub positive_patterns: Vec<String>,
    pub affirmations: Vec<String>,
    pub actionable_steps: Vec<String>,
    pub encouragement: String,
}

impl Default for Analysis {
    /// The all-fallback analysis; every field is non-empty.
    fn default() -> Self {
        Analysis {
            negative_patterns: vec![NEGATIVE_FALLBACK.to_string()],
            positive_patterns: vec![POSITIVE_FALLBACK.to_string()],
            affirmations: vec![AFFIRMATION_FALLBACK.to_string()],
            actionable_steps: vec![ACTIONABLE_FALLBACK.to_string()],
            encouragement: ENCOURAGEMENT_FALLBACK.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Negative,
    Positive,
    Affirmations,
    Actionable,
}

fn detect_section(line: &str) -> Option<Section> {
    let lower = line.to_lowercase();
    for (keywords, section) in [
        (NEGATIVE_KEYWORDS, Section::Negative),
        (POSITIVE_KEYWORDS, Section::Positive),
        (AFFIRMATION_KEYWORDS, Section::Affirmations),
        (ACTIONABLE_KEYWORDS, Section::Actionable),
    ] {
        if keywords.iter().any(|k| lower.contains(k)) {
            return Some(section);
        }
    }
    None
}

/// Strip a leading `-`, `•`, or `N.` list marker; None if the line isn't a
/// list item.
fn strip_list_marker(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();

    if let Some(rest) = trimmed.strip_prefix('-') {
        return Some(rest.trim());
    }
    if let Some(rest) = trimmed.strip_prefix('•') {
        return Some(rest.trim());
    }

    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        if let Some(rest) = trimmed[digits..].strip_prefix('.') {
            return Some(rest.trim());
        }
    }

    None
}

/// Last non-empty blank-line-delimited paragraph of the raw text.
fn last_paragraph(raw: &str) -> Option<String> {
    let mut paragraphs: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs
        .last()
        .map(|lines| lines.join("\n").trim().to_string())
        .filter(|p| !p.is_empty())
}

/// Parse a raw analysis response into an [`Analysis`].
///
/// Total: arbitrary input (including the empty string) yields a well-formed
/// result with every field non-empty.
pub fn parse_analysis(raw: &str) -> Analysis {
    let mut negative: Vec<String> = Vec::new();
    let mut positive: Vec<String> = Vec::new();
    let mut affirmations: Vec<String> = Vec::new();
    let mut actionable: Vec<String> = Vec::new();

    let mut current: Option<Section> = None;

    for line in raw.lines() {
        // Header detection wins over item-ness: a new section header stops
        // collection for the previous section.
        if let Some(section) = detect_section(line) {
            current = Some(section);
            continue;
        }

        let Some(section) = current else { continue };
        let Some(item) = strip_list_marker(line) else { continue };
        if item.is_empty() {
            continue;
        }

        match section {
            Section::Negative => negative.push(item.to_string()),
            Section::Positive => positive.push(item.to_string()),
            Section::Affirmations => affirmations.push(item.to_string()),
            Section::Actionable => actionable.push(item.to_string()),
        }
    }

    let defaults = Analysis::default();

    Analysis {
        negative_patterns: if negative.is_empty() { defaults.negative_patterns } else { negative },
        positive_patterns: if positive.is_empty() { defaults.positive_patterns } else { positive },
        affirmations: if affirmations.is_empty() { defaults.affirmations } else { affirmations },
        actionable_steps: if actionable.is_empty() { defaults.actionable_steps } else { actionable },
        encouragement: last_paragraph(raw).unwrap_or(defaults.encouragement),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        name: &'static str,
        raw: &'static str,
        negative: &'static [&'static str],
        positive: &'static [&'static str],
        affirmations: &'static [&'static str],
        actionable: &'static [&'static str],
        encouragement: &'static str,
    }

    fn assert_section(name: &str, field: &str, got: &[String], want: &[&str]) {
        let got: Vec<&str> = got.iter().map(String::as_str).collect();
        assert_eq!(got, want, "{}: {} mismatch", name, field);
    }

    #[test]
    fn test_representative_model_outputs() {
        let fixtures = [
            Fixture {
                name: "plain dash sections",
                raw: "Negative patterns:\n- overthinking\n- avoidance\n\nPositive patterns:\n- resilience\n\nFinal thoughts.",
                negative: &["overthinking", "avoidance"],
                positive: &["resilience"],
                affirmations: &[AFFIRMATION_FALLBACK],
                actionable: &[ACTIONABLE_FALLBACK],
                encouragement: "Final thoughts.",
            },
            Fixture {
                name: "numbered and bullet markers, alternate headers",
                raw: "Here is your reflection.\n\nPatterns to Address:\n1. staying up too late\n2. skipping meals\n\nStrengths:\n• you reach out to friends\n\nNext steps:\n- take one walk\n\nYou are doing better than you think.",
                negative: &["staying up too late", "skipping meals"],
                positive: &["you reach out to friends"],
                affirmations: &[AFFIRMATION_FALLBACK],
                actionable: &["take one walk"],
                encouragement: "You are doing better than you think.",
            },
            Fixture {
                name: "markdown-decorated headers",
                raw: "**Negative Patterns:**\n- self-criticism\n\n## Affirmations\n- I am learning\n- I am patient\n\n**Actionable Steps**\n- write each morning\n\nKeep going - you're close.",
                negative: &["self-criticism"],
                positive: &[POSITIVE_FALLBACK],
                affirmations: &["I am learning", "I am patient"],
                actionable: &["write each morning"],
                encouragement: "Keep going - you're close.",
            },
            Fixture {
                name: "prose between items is skipped",
                raw: "Challenges:\nI noticed a few recurring things.\n- perfectionism\nSome of these are old habits.\n- comparing yourself to others\n\nWhat's working:\n- morning pages\n\nSuggestions:\n- set a phone curfew\n- tell a friend your plan\n\nBe gentle with yourself this week.",
                negative: &["perfectionism", "comparing yourself to others"],
                positive: &["morning pages"],
                affirmations: &[AFFIRMATION_FALLBACK],
                actionable: &["set a phone curfew", "tell a friend your plan"],
                encouragement: "Be gentle with yourself this week.",
            },
            Fixture {
                name: "headers without items fall back",
                raw: "Negative patterns:\n\nPositive patterns:\nnothing else to add.",
                negative: &[NEGATIVE_FALLBACK],
                positive: &[POSITIVE_FALLBACK],
                affirmations: &[AFFIRMATION_FALLBACK],
                actionable: &[ACTIONABLE_FALLBACK],
                encouragement: "Positive patterns:\nnothing else to add.",
            },
        ];

        for fixture in &fixtures {
            let analysis = parse_analysis(fixture.raw);
            assert_section(fixture.name, "negative", &analysis.negative_patterns, fixture.negative);
            assert_section(fixture.name, "positive", &analysis.positive_patterns, fixture.positive);
            assert_section(fixture.name, "affirmations", &analysis.affirmations, fixture.affirmations);
            assert_section(fixture.name, "actionable", &analysis.actionable_steps, fixture.actionable);
            assert_eq!(
                analysis.encouragement, fixture.encouragement,
                "{}: encouragement mismatch",
                fixture.name
            );
        }
    }

    #[test]
    fn test_empty_input_yields_all_defaults() {
        let analysis = parse_analysis("");
        assert_eq!(analysis, Analysis::default());
    }

    #[test]
    fn test_every_field_is_always_non_empty() {
        let inputs = [
            "",
            "just some prose with no structure at all",
            "-\n•\n3.\n\n\n",
            "Negative patterns: Positive patterns: Affirmations:",
            "🙂\n- 🙂\n\nbe well",
        ];

        for raw in inputs {
            let analysis = parse_analysis(raw);
            assert!(!analysis.negative_patterns.is_empty(), "input {:?}", raw);
            assert!(!analysis.positive_patterns.is_empty(), "input {:?}", raw);
            assert!(!analysis.affirmations.is_empty(), "input {:?}", raw);
            assert!(!analysis.actionable_steps.is_empty(), "input {:?}", raw);
            assert!(!analysis.encouragement.is_empty(), "input {:?}", raw);
        }
    }

    #[test]
    fn test_same_header_repeated_keeps_collecting() {
        let raw = "Challenges:\n- one\n\nChallenges:\n- two\n\ndone.";
        let analysis = parse_analysis(raw);
        assert_section("repeat", "negative", &analysis.negative_patterns, &["one", "two"]);
    }

    #[test]
    fn test_marker_only_lines_are_ignored() {
        let raw = "Next steps:\n-\n- breathe\n•";
        let analysis = parse_analysis(raw);
        assert_section("markers", "actionable", &analysis.actionable_steps, &["breathe"]);
    }
}
