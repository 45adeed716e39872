//! Daily report section extraction.
//!
//! A daily report is free text with labelled sections:
//!
//! ```text
//! やったこと
//! - 〇〇の実装
//! - レビュー対応
//! 次にやること
//! - テスト追加
//! ```
//!
//! [`SectionExtractor::extract`] returns the body of the "accomplishments"
//! section (between the start label and the next section label, or the end of
//! the message). [`split_lines`] turns that body into the individual entries
//! written to the document store.
//!
//! # Normalization
//!
//! - The start label may be followed by spaces, tabs, or full-width spaces.
//! - Labels match case-insensitively.
//! - Runs of three or more newlines collapse to one blank line.
//! - Each line is stripped of whitespace and bullet markers (`-`, `・`, `　`).

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

/// Characters stripped from both ends of every extracted line, in addition
/// to whitespace.
pub const BULLET_MARKERS: &[char] = &['-', '・', '\u{3000}'];

/// Section labels recognised in a report.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SectionLabels {
    /// Label opening the accomplishments section.
    #[serde(default = "default_start_label")]
    pub start_label: String,
    /// Labels that end it when they begin a line.
    #[serde(default = "default_stop_labels")]
    pub stop_labels: Vec<String>,
}

fn default_start_label() -> String {
    "やったこと".to_string()
}

fn default_stop_labels() -> Vec<String> {
    vec!["次にやること".to_string(), "ひとこと".to_string()]
}

impl Default for SectionLabels {
    fn default() -> Self {
        Self {
            start_label: default_start_label(),
            stop_labels: default_stop_labels(),
        }
    }
}

/// Compiled extractor for one set of [`SectionLabels`].
#[derive(Debug, Clone)]
pub struct SectionExtractor {
    section: Regex,
    blank_runs: Regex,
}

impl SectionExtractor {
    pub fn new(labels: &SectionLabels) -> Result<Self> {
        let start = regex::escape(labels.start_label.trim());
        let stops: Vec<String> = labels
            .stop_labels
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(regex::escape)
            .collect();

        // A stop label ends the section only at the start of a line, which
        // may be the line right after the start label.
        let terminator = if stops.is_empty() {
            r"\z".to_string()
        } else {
            format!(r"(?m:^)(?:{})\b|\z", stops.join("|"))
        };
        let pattern = format!(r"(?i){}[\t \x{{3000}}]*\n([\s\S]*?)(?:{})", start, terminator);

        let section = Regex::new(&pattern)
            .with_context(|| format!("Invalid section labels: {:?}", labels))?;
        let blank_runs = Regex::new(r"\n{3,}").context("Invalid blank-run pattern")?;
        Ok(Self {
            section,
            blank_runs,
        })
    }

    /// Extract the normalized accomplishments section, or an empty string
    /// when the start label is absent.
    pub fn extract(&self, text: &str) -> String {
        let Some(caps) = self.section.captures(text) else {
            return String::new();
        };
        let body = caps.get(1).map(|m| m.as_str()).unwrap_or_default().trim();
        self.blank_runs.replace_all(body, "\n\n").trim().to_string()
    }

    /// [`extract`](Self::extract) followed by [`split_lines`].
    pub fn extract_lines(&self, text: &str) -> Vec<String> {
        split_lines(&self.extract(text))
    }
}

/// Split an extracted section into non-empty, bullet-stripped lines.
pub fn split_lines(section: &str) -> Vec<String> {
    section
        .split('\n')
        .map(|line| {
            line.trim_matches(|c: char| c.is_whitespace() || BULLET_MARKERS.contains(&c))
        })
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> SectionExtractor {
        SectionExtractor::new(&SectionLabels::default()).unwrap()
    }

    #[test]
    fn test_extracts_until_next_label() {
        let ex = extractor();
        let lines = ex.extract_lines("やったこと\nA\nB\n次にやること\nC");
        assert_eq!(lines, vec!["A", "B"]);
    }

    #[test]
    fn test_empty_section_stops_at_next_label() {
        let ex = extractor();
        assert!(ex.extract_lines("やったこと\n次にやること\nC").is_empty());
        assert!(ex.extract_lines("やったこと　\nひとこと\n眠い").is_empty());
    }

    #[test]
    fn test_stop_label_mid_line_does_not_end_section() {
        let ex = extractor();
        let lines = ex.extract_lines("やったこと\nA 次にやること B\n次にやること\nC");
        assert_eq!(lines, vec!["A 次にやること B"]);
    }

    #[test]
    fn test_missing_label_yields_nothing() {
        let ex = extractor();
        assert_eq!(ex.extract("今日は特になし\n次にやること\nC"), "");
        assert!(ex.extract_lines("hello world").is_empty());
    }

    #[test]
    fn test_extracts_to_end_of_text() {
        let ex = extractor();
        assert_eq!(ex.extract("やったこと\n- 設計\n- 実装\n"), "- 設計\n- 実装");
    }

    #[test]
    fn test_stops_at_hitokoto() {
        let ex = extractor();
        let lines = ex.extract_lines("やったこと\n・資料作成\nひとこと\n眠い");
        assert_eq!(lines, vec!["資料作成"]);
    }

    #[test]
    fn test_trailing_full_width_space_after_label() {
        let ex = extractor();
        let lines = ex.extract_lines("やったこと　 \t\n- テスト\n次にやること\n- リリース");
        assert_eq!(lines, vec!["テスト"]);
    }

    #[test]
    fn test_label_must_end_line() {
        let ex = extractor();
        assert_eq!(ex.extract("やったこと: 実装\n次にやること\nC"), "");
    }

    #[test]
    fn test_stop_label_needs_word_boundary() {
        let ex = extractor();
        let lines = ex.extract_lines("やったこと\nA\nひとことメモ\nB");
        assert_eq!(lines, vec!["A", "ひとことメモ", "B"]);
    }

    #[test]
    fn test_collapses_blank_runs() {
        let ex = extractor();
        assert_eq!(ex.extract("やったこと\nA\n\n\n\nB\n次にやること"), "A\n\nB");
    }

    #[test]
    fn test_case_insensitive_labels() {
        let labels = SectionLabels {
            start_label: "Done".to_string(),
            stop_labels: vec!["Next".to_string()],
        };
        let ex = SectionExtractor::new(&labels).unwrap();
        let lines = ex.extract_lines("standup\nDONE\n- shipped it\nnext\n- more");
        assert_eq!(lines, vec!["shipped it"]);
    }

    #[test]
    fn test_no_stop_labels_reads_to_end() {
        let labels = SectionLabels {
            start_label: "Done".to_string(),
            stop_labels: vec![],
        };
        let ex = SectionExtractor::new(&labels).unwrap();
        assert_eq!(ex.extract_lines("Done\na\nb"), vec!["a", "b"]);
    }

    #[test]
    fn test_split_lines_strips_bullets_and_drops_empty() {
        let lines = split_lines("- A \n\n・B\n　C　\n-\n  \n--D--");
        assert_eq!(lines, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_labels_are_literal() {
        let labels = SectionLabels {
            start_label: "Done (today)".to_string(),
            stop_labels: vec!["Next steps".to_string()],
        };
        let ex = SectionExtractor::new(&labels).unwrap();
        assert_eq!(ex.extract_lines("Done (today)\nx\nNext steps\ny"), vec!["x"]);
        assert!(ex.extract("Done today\nx").is_empty());
    }
}
