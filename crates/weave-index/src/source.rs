// source.rs — Locating a fragment's text on disk.
//
// Whole-file fragments (template sources) are read entirely; everything
// else is cut out of its file by 1-based inclusive line numbers, keeping
// the original line endings.

use std::fs;
use std::path::Path;

use crate::error::IndexError;
use crate::inventory::FragmentInfo;

/// Extract lines `start..=end` (1-based, inclusive) from `text`.
///
/// Returns `None` unless `1 <= start <= end <= line_count`.
pub fn extract_line_range(text: &str, start: usize, end: usize) -> Option<String> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    if start == 0 || start > lines.len() || end < start || end > lines.len() {
        return None;
    }
    Some(lines[start - 1..end].concat())
}

/// Read the current text of a fragment from `root`.
///
/// Missing metadata, an unreadable file, or a line range that does not fit
/// the file are all errors.
pub fn read_fragment_source(
    root: &Path,
    id: &str,
    info: &FragmentInfo,
) -> Result<String, IndexError> {
    let rel = info.source_path().ok_or_else(|| IndexError::MissingField {
        id: id.to_string(),
        field: "actual_source_path",
    })?;
    let path = root.join(rel);
    let text = fs::read_to_string(&path).map_err(|source| IndexError::IoError {
        path: path.clone(),
        source,
    })?;

    if info.is_templ_source {
        return Ok(text);
    }

    let (start, end) = match (info.start_line, info.end_line) {
        (Some(s), Some(e)) => (s, e),
        _ => {
            return Err(IndexError::MissingField {
                id: id.to_string(),
                field: "start_line/end_line",
            })
        }
    };
    extract_line_range(&text, start, end).ok_or_else(|| IndexError::InvalidLineRange {
        line_count: text.split_inclusive('\n').count(),
        path,
        start,
        end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FILE: &str = "package main\n\nfunc A() {\n\treturn\n}\n";

    #[test]
    fn extracts_inclusive_range_with_line_endings() {
        assert_eq!(
            extract_line_range(FILE, 3, 5).as_deref(),
            Some("func A() {\n\treturn\n}\n")
        );
        assert_eq!(extract_line_range(FILE, 1, 1).as_deref(), Some("package main\n"));
    }

    #[test]
    fn rejects_out_of_bounds_ranges() {
        assert!(extract_line_range(FILE, 0, 2).is_none());
        assert!(extract_line_range(FILE, 4, 3).is_none());
        assert!(extract_line_range(FILE, 2, 6).is_none());
        assert!(extract_line_range(FILE, 6, 6).is_none());
        assert!(extract_line_range("", 1, 1).is_none());
    }

    #[test]
    fn last_line_without_newline_is_kept() {
        assert_eq!(extract_line_range("a\nb", 2, 2).as_deref(), Some("b"));
    }

    #[test]
    fn whole_file_fragment_reads_everything() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("page.templ"), "templ Page() {}\n").unwrap();
        let info = FragmentInfo {
            actual_source_path: Some("page.templ".into()),
            is_templ_source: true,
            ..Default::default()
        };
        let text = read_fragment_source(dir.path(), "page", &info).unwrap();
        assert_eq!(text, "templ Page() {}\n");
    }

    #[test]
    fn bad_range_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.go"), FILE).unwrap();
        let info = FragmentInfo {
            original_path: Some("main.go".into()),
            start_line: Some(4),
            end_line: Some(40),
            ..Default::default()
        };
        let err = read_fragment_source(dir.path(), "A", &info).unwrap_err();
        assert!(matches!(
            err,
            IndexError::InvalidLineRange { line_count: 5, .. }
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let info = FragmentInfo {
            original_path: Some("gone.go".into()),
            start_line: Some(1),
            end_line: Some(1),
            ..Default::default()
        };
        let err = read_fragment_source(dir.path(), "gone", &info).unwrap_err();
        assert!(matches!(err, IndexError::IoError { .. }));
    }
}
