//! Summary section splitter
//!
//! Splits a generated campaign report into the five fixed sections. A heading is
//! recognised when its text is followed (after optional `*` emphasis markers) by a
//! colon or a line break. Each section runs from its heading to the next recognised
//! heading of any section, or the end of text. Markdown decoration in front of the
//! next heading (`## 3.`, `- **`) is not part of the captured text.

use serde::{Deserialize, Serialize};

pub const TARGET_AUDIENCE: &str = "Target Audience";
pub const COMPETITIVE_ADVANTAGE: &str = "Competitive Advantage";
pub const OFFER_DEVELOPMENT: &str = "Offer Development";
pub const DESIGN_RECOMMENDATIONS: &str = "Design Recommendations";
pub const CAMPAIGN_TIMING: &str = "Campaign Timing";

/// Headings in report order
pub const SECTION_HEADINGS: [&str; 5] = [
    TARGET_AUDIENCE,
    COMPETITIVE_ADVANTAGE,
    OFFER_DEVELOPMENT,
    DESIGN_RECOMMENDATIONS,
    CAMPAIGN_TIMING,
];

/// Named sections of a campaign report; a missing heading leaves its field empty
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sections {
    pub target_audience: String,
    pub competitive_advantage: String,
    pub offers: String,
    pub design: String,
    pub timing: String,
}

#[derive(Debug, Clone, Copy)]
struct HeadingMatch {
    /// Where the text preceding this heading ends
    cut: usize,
    /// First byte after the heading's `:` or line break
    content_start: usize,
}

fn is_decoration(c: char) -> bool {
    c.is_whitespace() || c.is_ascii_digit() || matches!(c, '#' | '*' | '-' | '_' | '>' | '.' | ')')
}

/// First occurrence of `heading` at or after `from` that is followed by `:` or `\n`
fn find_heading(text: &str, heading: &str, from: usize) -> Option<HeadingMatch> {
    for (offset, _) in text[from..].match_indices(heading) {
        let pos = from + offset;
        let after = pos + heading.len();
        let rest = &text[after..];
        let stars = rest.len() - rest.trim_start_matches('*').len();

        if !matches!(rest[stars..].chars().next(), Some(':' | '\n')) {
            continue;
        }

        let line_start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
        let cut = if text[line_start..pos].chars().all(is_decoration) {
            line_start
        } else {
            pos
        };

        return Some(HeadingMatch {
            cut,
            content_start: after + stars + 1,
        });
    }
    None
}

/// Text belonging to `heading`, or `""` if the heading never appears
pub fn extract_section(text: &str, heading: &str) -> String {
    let Some(found) = find_heading(text, heading, 0) else {
        return String::new();
    };

    let end = SECTION_HEADINGS
        .iter()
        .filter_map(|next| find_heading(text, next, found.content_start))
        .map(|next| next.cut.max(found.content_start))
        .min()
        .unwrap_or(text.len());

    text[found.content_start..end]
        .trim_start_matches(|c: char| c == '*' || c.is_whitespace())
        .trim_end()
        .to_string()
}

/// Split a report into its five sections
pub fn split_sections(text: &str) -> Sections {
    Sections {
        target_audience: extract_section(text, TARGET_AUDIENCE),
        competitive_advantage: extract_section(text, COMPETITIVE_ADVANTAGE),
        offers: extract_section(text, OFFER_DEVELOPMENT),
        design: extract_section(text, DESIGN_RECOMMENDATIONS),
        timing: extract_section(text, CAMPAIGN_TIMING),
    }
}
