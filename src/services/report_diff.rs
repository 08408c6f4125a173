use serde::Serialize;

/// Line-level diff summary between the generated report and the reviewer's
/// edited version. Stored as an edit feedback signal for prompt tuning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportDiff {
    pub lines_unchanged: usize,
    pub lines_added: usize,
    pub lines_removed: usize,
    /// Share of the original that survived the edit, in [0, 1].
    pub similarity: f64,
}

pub fn diff_reports(original: &str, edited: &str) -> ReportDiff {
    let original_lines: Vec<&str> = original.lines().collect();
    let edited_lines: Vec<&str> = edited.lines().collect();

    let unchanged = lcs_len(&original_lines, &edited_lines);
    let removed = original_lines.len() - unchanged;
    let added = edited_lines.len() - unchanged;

    let similarity = if original_lines.is_empty() {
        if edited_lines.is_empty() { 1.0 } else { 0.0 }
    } else {
        unchanged as f64 / original_lines.len() as f64
    };

    ReportDiff {
        lines_unchanged: unchanged,
        lines_added: added,
        lines_removed: removed,
        similarity,
    }
}

/// Longest common subsequence over lines, rolling single-row DP. Reports are
/// at most a few hundred lines so the quadratic scan is fine.
fn lcs_len(a: &[&str], b: &[&str]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];

    for line_a in a {
        for (j, line_b) in b.iter().enumerate() {
            current[j + 1] = if line_a == line_b {
                prev[j] + 1
            } else {
                prev[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut prev, &mut current);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_reports_have_full_similarity() {
        let text = "line one\nline two\nline three";
        let diff = diff_reports(text, text);
        assert_eq!(diff.lines_unchanged, 3);
        assert_eq!(diff.lines_added, 0);
        assert_eq!(diff.lines_removed, 0);
        assert_eq!(diff.similarity, 1.0);
    }

    #[test]
    fn counts_added_and_removed_lines() {
        let original = "intro\nthe class covered fractions\nclosing";
        let edited = "intro\nthe class covered fractions and decimals\nextra note\nclosing";
        let diff = diff_reports(original, edited);
        assert_eq!(diff.lines_unchanged, 2);
        assert_eq!(diff.lines_removed, 1);
        assert_eq!(diff.lines_added, 2);
        assert!((diff.similarity - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn full_rewrite_has_zero_similarity() {
        let diff = diff_reports("alpha\nbeta", "gamma\ndelta");
        assert_eq!(diff.lines_unchanged, 0);
        assert_eq!(diff.similarity, 0.0);
    }

    #[test]
    fn reordered_lines_are_not_all_unchanged() {
        let diff = diff_reports("a\nb\nc", "c\na\nb");
        assert_eq!(diff.lines_unchanged, 2);
    }

    #[test]
    fn empty_original_edge_cases() {
        assert_eq!(diff_reports("", "").similarity, 1.0);
        let diff = diff_reports("", "new line");
        assert_eq!(diff.similarity, 0.0);
        assert_eq!(diff.lines_added, 1);
    }
}
