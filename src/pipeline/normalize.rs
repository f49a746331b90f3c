//! Branch name to URL path segment conversion.

/// Replace every `/` and `.` in `branch` with `_`.
///
/// The result is safe to embed as a single path segment (and as a file stem)
/// in a content-store URL.  No other characters are touched, so the output
/// has exactly as many characters as the input.
pub fn normalize(branch: &str) -> String {
    branch
        .chars()
        .map(|c| match c {
            '/' | '.' => '_',
            other => other,
        })
        .collect()
}
