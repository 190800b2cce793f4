//! Keyword line scan over free-form analysis text.
//!
//! A weak heuristic kept isolated as a pure function. Each non-blank line lands
//! in at most one list, checked in this order:
//!
//! | contains                  | list            |
//! |---------------------------|-----------------|
//! | `recommend`               | recommendations |
//! | `finding` or `important`  | key findings    |
//! | `next` or `step`          | next steps      |

use super::DomainProfile;

/// Lists pulled out of an analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedSections {
    pub key_findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub next_steps: Vec<String>,
}

impl ExtractedSections {
    /// Number of lists with at least one entry.
    pub fn populated(&self) -> usize {
        [&self.key_findings, &self.recommendations, &self.next_steps]
            .iter()
            .filter(|list| !list.is_empty())
            .count()
    }
}

/// Scan `text` line by line and sort lines into the three lists.
pub fn extract_sections(text: &str) -> ExtractedSections {
    let mut sections = ExtractedSections::default();

    for line in text.lines() {
        let cleaned = clean_bullet(line);
        if cleaned.is_empty() {
            continue;
        }
        let lower = line.to_lowercase();

        if lower.contains("recommend") {
            sections.recommendations.push(cleaned);
        } else if lower.contains("finding") || lower.contains("important") {
            sections.key_findings.push(cleaned);
        } else if lower.contains("next") || lower.contains("step") {
            sections.next_steps.push(cleaned);
        }
    }

    sections
}

/// Remove list markers, numbering and light markdown from a line.
pub fn clean_bullet(line: &str) -> String {
    let mut rest = line.trim().trim_start_matches('#').trim_start();

    if let Some(stripped) = rest.strip_prefix(['-', '•', '*', '○', '➢', '→']) {
        rest = stripped.trim_start();
    }

    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let after = &rest[digits..];
        if let Some(stripped) = after.strip_prefix(['.', ')']) {
            rest = stripped.trim_start();
        }
    }

    rest.trim_matches('*').trim().to_string()
}

/// Fill empty lists with the profile's placeholders.
///
/// Returns the completed sections and the number of lists that came from the
/// text itself.
pub fn apply_fallbacks(
    mut sections: ExtractedSections,
    profile: &DomainProfile,
) -> (ExtractedSections, usize) {
    let extracted = sections.populated();

    if sections.key_findings.is_empty() {
        sections.key_findings.push(profile.finding_placeholder());
    }
    if sections.recommendations.is_empty() {
        sections.recommendations.push(profile.recommendation_placeholder());
    }
    if sections.next_steps.is_empty() {
        sections.next_steps.push(profile.next_step_placeholder());
    }

    (sections, extracted)
}
