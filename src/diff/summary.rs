use super::{Change, ChangeKind};

/// How many significant changes are spelled out in a summary.
const MAX_HIGHLIGHTS: usize = 3;

/// Path fragments that always make a change worth mentioning.
const SIGNIFICANT_FIELDS: [&str; 3] = ["sections", "title", "layout"];

/// Human-readable summary of a change list.
///
/// `"2 changes detected: 1 additions, 1 modifications. Key changes: title changed, hero added"`
pub fn summarize(changes: &[Change]) -> String {
    if changes.is_empty() {
        return "No changes detected".to_string();
    }

    let count = |kind: ChangeKind| changes.iter().filter(|c| c.kind == kind).count();
    let counts = [
        (count(ChangeKind::Added), "additions"),
        (count(ChangeKind::Removed), "removals"),
        (count(ChangeKind::Modified), "modifications"),
    ];
    let breakdown: Vec<String> = counts
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, label)| format!("{} {}", n, label))
        .collect();

    let mut summary = format!(
        "{} changes detected: {}",
        changes.len(),
        breakdown.join(", ")
    );

    let significant: Vec<&Change> = changes.iter().filter(|c| is_significant(&c.path)).collect();
    if !significant.is_empty() {
        let highlights: Vec<String> = significant
            .iter()
            .take(MAX_HIGHLIGHTS)
            .map(|c| format!("{} {}", leaf_name(&c.path), verb(c.kind)))
            .collect();
        summary.push_str(". Key changes: ");
        summary.push_str(&highlights.join(", "));
        if significant.len() > MAX_HIGHLIGHTS {
            summary.push_str(&format!(" and {} others", significant.len() - MAX_HIGHLIGHTS));
        }
    }

    summary
}

fn verb(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Added => "added",
        ChangeKind::Removed => "removed",
        ChangeKind::Modified => "changed",
    }
}

/// A change is significant when its path is at most two segments deep, or
/// when it touches a `SIGNIFICANT_FIELDS` entry anywhere in the path.
///
/// Depth counts path segments as produced by `segments`: every `.key` and
/// every `[i]` index is one segment, so `title` has depth 1, `sections[0]`
/// depth 2 and `a[0][1]` depth 3.
fn is_significant(path: &str) -> bool {
    segments(path).len() <= 2 || SIGNIFICANT_FIELDS.iter().any(|field| path.contains(field))
}

/// Split `a.b[0].c` into `["a", "b", "[0]", "c"]`.
fn segments(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, ch) in path.char_indices() {
        match ch {
            '.' => {
                if start < i {
                    out.push(&path[start..i]);
                }
                start = i + 1;
            }
            '[' => {
                if start < i {
                    out.push(&path[start..i]);
                }
                start = i;
            }
            ']' => {
                out.push(&path[start..=i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < path.len() {
        out.push(&path[start..]);
    }
    out
}

/// Last named segment of a path, keeping a trailing index so that
/// `sections[2]` reads better than a bare `[2]`.
fn leaf_name(path: &str) -> String {
    let parts = segments(path);
    match parts.as_slice() {
        [] => "document".to_string(),
        [.., parent, last] if last.starts_with('[') && !parent.starts_with('[') => {
            format!("{}{}", parent, last)
        }
        [.., last] => last.to_string(),
    }
}
