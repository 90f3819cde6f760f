use crate::models::{ChangeClassification, PathDiff};
use similar::{ChangeTag, TextDiff};

/// Line-level view of a [`PathDiff`].
#[derive(Debug, Clone)]
pub struct FileDiff {
    pub path: String,
    pub classification: ChangeClassification,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
    /// Either side is present but not valid UTF-8.
    pub binary: bool,
    /// SHA-256 of each side, for telling binary revisions apart.
    pub old_digest: Option<String>,
    pub new_digest: Option<String>,
    pub diff_lines: Vec<DiffLine>,
}

#[derive(Debug, Clone)]
pub struct DiffLine {
    pub line_type: DiffLineType,
    pub content: String,
    pub old_line_number: Option<usize>,
    pub new_line_number: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineType {
    Context,
    Addition,
    Deletion,
}

impl FileDiff {
    /// An added path diffs against empty text, a deleted path against
    /// empty text on the other side.
    pub fn from_path_diff(diff: &PathDiff) -> Self {
        let old_content = decode(diff.previous.as_deref());
        let new_content = decode(diff.current.as_deref());
        let binary = (diff.previous.is_some() && old_content.is_none())
            || (diff.current.is_some() && new_content.is_none());

        let diff_lines = if binary {
            Vec::new()
        } else {
            Self::compute_diff(
                old_content.as_deref().unwrap_or(""),
                new_content.as_deref().unwrap_or(""),
            )
        };

        FileDiff {
            path: diff.path.clone(),
            classification: diff.classification,
            old_content,
            new_content,
            binary,
            old_digest: diff.previous_digest(),
            new_digest: diff.current_digest(),
            diff_lines,
        }
    }

    fn compute_diff(old_text: &str, new_text: &str) -> Vec<DiffLine> {
        let diff = TextDiff::from_lines(old_text, new_text);
        let mut lines = Vec::new();
        let mut old_line_num = 1;
        let mut new_line_num = 1;

        for change in diff.iter_all_changes() {
            let (line_type, old_num, new_num) = match change.tag() {
                ChangeTag::Delete => {
                    old_line_num += 1;
                    (DiffLineType::Deletion, Some(old_line_num - 1), None)
                }
                ChangeTag::Insert => {
                    new_line_num += 1;
                    (DiffLineType::Addition, None, Some(new_line_num - 1))
                }
                ChangeTag::Equal => {
                    old_line_num += 1;
                    new_line_num += 1;
                    (
                        DiffLineType::Context,
                        Some(old_line_num - 1),
                        Some(new_line_num - 1),
                    )
                }
            };

            lines.push(DiffLine {
                line_type,
                content: change.to_string(),
                old_line_number: old_num,
                new_line_number: new_num,
            });
        }

        lines
    }

    pub fn additions(&self) -> usize {
        self.count(DiffLineType::Addition)
    }

    pub fn deletions(&self) -> usize {
        self.count(DiffLineType::Deletion)
    }

    fn count(&self, line_type: DiffLineType) -> usize {
        self.diff_lines
            .iter()
            .filter(|l| l.line_type == line_type)
            .count()
    }

    /// Unified diff text with `context_lines` of context per hunk.
    pub fn format_unified(&self, context_lines: usize) -> String {
        if self.binary {
            return format!(
                "Binary file {} differs ({} -> {})\n",
                self.path,
                short_digest(self.old_digest.as_deref()),
                short_digest(self.new_digest.as_deref())
            );
        }

        let old_header = match self.classification {
            ChangeClassification::Added => "/dev/null".to_string(),
            _ => format!("a/{}", self.path),
        };
        let new_header = match self.classification {
            ChangeClassification::Deleted => "/dev/null".to_string(),
            _ => format!("b/{}", self.path),
        };

        TextDiff::from_lines(
            self.old_content.as_deref().unwrap_or(""),
            self.new_content.as_deref().unwrap_or(""),
        )
        .unified_diff()
        .context_radius(context_lines)
        .header(&old_header, &new_header)
        .to_string()
    }
}

/// First 12 hex digits, or `none` for a missing side.
pub fn short_digest(digest: Option<&str>) -> &str {
    match digest {
        Some(digest) => digest.get(..12).unwrap_or(digest),
        None => "none",
    }
}

fn decode(bytes: Option<&[u8]>) -> Option<String> {
    bytes.and_then(|b| String::from_utf8(b.to_vec()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content_digest;
    use similar_asserts::assert_eq;

    fn path_diff(previous: Option<&str>, current: Option<&str>) -> PathDiff {
        PathDiff {
            path: "notes.md".to_string(),
            current: current.map(|c| c.as_bytes().to_vec()),
            previous: previous.map(|p| p.as_bytes().to_vec()),
            classification: ChangeClassification::from_presence(
                previous.is_some(),
                current.is_some(),
            )
            .unwrap(),
        }
    }

    #[test]
    fn test_modified_lines() {
        let diff = FileDiff::from_path_diff(&path_diff(
            Some("line 1\nline 2\nline 3\n"),
            Some("line 1\nline 2 modified\nline 3\nline 4\n"),
        ));

        assert_eq!(diff.classification, ChangeClassification::Modified);
        assert_eq!(diff.additions(), 2);
        assert_eq!(diff.deletions(), 1);
        let deleted = diff
            .diff_lines
            .iter()
            .find(|l| l.line_type == DiffLineType::Deletion)
            .unwrap();
        assert_eq!(deleted.old_line_number, Some(2));
    }

    #[test]
    fn test_added_file_unified() {
        let diff = FileDiff::from_path_diff(&path_diff(None, Some("Hello\nWorld\n")));

        assert_eq!(diff.additions(), 2);
        let text = diff.format_unified(3);
        assert!(text.starts_with("--- /dev/null\n+++ b/notes.md\n"));
        assert!(text.ends_with("+Hello\n+World\n"));
    }

    #[test]
    fn test_deleted_file() {
        let diff = FileDiff::from_path_diff(&path_diff(Some("gone\n"), None));
        assert_eq!(diff.deletions(), 1);
        assert!(diff.format_unified(3).starts_with("--- a/notes.md\n+++ /dev/null\n"));
    }

    #[test]
    fn test_binary_content() {
        let diff = FileDiff::from_path_diff(&PathDiff {
            path: "notes.md".to_string(),
            current: Some(b"text\n".to_vec()),
            previous: Some(vec![0xff, 0xfe]),
            classification: ChangeClassification::Modified,
        });
        assert!(diff.binary);
        assert!(diff.diff_lines.is_empty());
        let old = content_digest(&[0xff, 0xfe]);
        let new = content_digest(b"text\n");
        assert_eq!(diff.old_digest.as_deref(), Some(old.as_str()));
        assert_eq!(diff.new_digest.as_deref(), Some(new.as_str()));
        assert_eq!(
            diff.format_unified(3),
            format!("Binary file notes.md differs ({} -> {})\n", &old[..12], &new[..12])
        );
    }
}
