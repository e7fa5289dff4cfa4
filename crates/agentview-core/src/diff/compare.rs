use similar::TextDiff;

/// Lines of context kept around each change.
pub const CONTEXT_LINES: usize = 3;

/// Line-based unified diff of two texts, headed `--- left` / `+++ right`.
/// Identical inputs produce an empty string.
pub fn unified_diff(left_path: &str, right_path: &str, left: &str, right: &str) -> String {
    TextDiff::from_lines(left, right)
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(left_path, right_path)
        .to_string()
}
