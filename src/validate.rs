//! Response validation.
//!
//! A cheap heuristic check that the completion actually used the search
//! content it was given: numbers, dollar amounts, and month/year dates
//! are extracted from the search text and looked up verbatim in the
//! completion. The score is the matched fraction scaled to 0..=100.
//!
//! A score below the configured threshold triggers exactly one
//! regeneration, driven by the pipeline. The validator itself never
//! loops.

use crate::models::{SearchEngine, SearchOutcome, ValidationScore};

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Score how well `completion` grounds itself in `search` content.
///
/// Returns score 0 with no issues when the search chain fell back to the
/// static templated answer or produced nothing — there is nothing to
/// validate, and that is not treated as a failure.
///
/// When search content exists but yields no extractable facts (no
/// numbers, no dates), the completion is accepted with a full score.
pub fn score_grounding(search: &SearchOutcome, completion: &str) -> ValidationScore {
    if search.engine == SearchEngine::Fallback || search.content.trim().is_empty() {
        return ValidationScore {
            score: 0,
            issues: Vec::new(),
        };
    }

    let facts = extract_facts(&search.content);
    if facts.is_empty() {
        return ValidationScore {
            score: 100,
            issues: Vec::new(),
        };
    }

    let completion_lower = completion.to_lowercase();
    let mut matched = 0usize;
    let mut issues = Vec::new();

    for fact in &facts {
        if completion_lower.contains(&fact.to_lowercase()) {
            matched += 1;
        } else {
            issues.push(format!("missing fact from research: \"{}\"", fact));
        }
    }

    let score = ((matched * 100) / facts.len()) as u8;
    ValidationScore { score, issues }
}

/// Whether the pipeline should force a regeneration.
///
/// The fallback path (score 0 with no issues) never regenerates.
pub fn needs_regeneration(search: &SearchOutcome, score: &ValidationScore, threshold: u8) -> bool {
    if search.engine == SearchEngine::Fallback || search.content.trim().is_empty() {
        return false;
    }
    score.score < threshold && !score.issues.is_empty()
}

/// Build the forced-regeneration prompt: the original system prompt plus
/// the validator's specific complaints.
pub fn regeneration_prompt(original_prompt: &str, score: &ValidationScore) -> String {
    let mut out = String::with_capacity(original_prompt.len() + 256);
    out.push_str(original_prompt);
    out.push_str("\n\n## Revision required\n");
    out.push_str(
        "Your previous answer did not use the research provided. Rewrite it, \
         incorporating these specific facts:\n",
    );
    for issue in &score.issues {
        out.push_str("- ");
        out.push_str(issue);
        out.push('\n');
    }
    out
}

/// Pull matchable facts out of search text: tokens containing digits
/// (amounts, years, percentages) and "Month Year" date phrases.
fn extract_facts(content: &str) -> Vec<String> {
    let mut facts = Vec::new();

    let tokens: Vec<&str> = content.split_whitespace().collect();
    for (i, raw) in tokens.iter().enumerate() {
        let token = raw.trim_matches(|c: char| {
            c == '.' || c == ',' || c == ';' || c == ':' || c == '(' || c == ')' || c == '"'
        });
        if token.is_empty() {
            continue;
        }

        if token.chars().any(|c| c.is_ascii_digit()) {
            // "March 2024" beats a bare "2024" when the month precedes it.
            if is_year(token) && i > 0 {
                let prev = tokens[i - 1]
                    .trim_matches(|c: char| !c.is_ascii_alphabetic())
                    .to_lowercase();
                if MONTHS.contains(&prev.as_str()) {
                    facts.push(format!("{} {}", capitalize(&prev), token));
                    continue;
                }
            }
            facts.push(token.to_string());
        }
    }

    facts.sort();
    facts.dedup();
    facts
}

fn is_year(token: &str) -> bool {
    token.len() == 4
        && token.chars().all(|c| c.is_ascii_digit())
        && (token.starts_with("19") || token.starts_with("20"))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
