//! Compiles a rule's search criteria into a Gmail query string

use crate::rules::Criterion;

/// Render one criterion as `key:value`, quoting values with whitespace.
///
/// The value is passed through verbatim: Gmail grammar embedded in a
/// value (e.g. `"github_ OR something"`) is the user's business. OR
/// across different keys is deliberately not expressible here.
fn render(criterion: &Criterion) -> String {
    if criterion.value.chars().any(char::is_whitespace) {
        format!("{}:\"{}\"", criterion.key, criterion.value)
    } else {
        format!("{}:{}", criterion.key, criterion.value)
    }
}

/// Compile search criteria into a Gmail query string.
///
/// Criteria are joined with single spaces in their original order;
/// Gmail treats space-separated terms as an implicit AND. The result
/// is deterministic for a given criteria sequence, but must be
/// recompiled each run since operators like `older_than` are relative
/// to the current time on the provider side.
pub fn compile(criteria: &[Criterion]) -> String {
    criteria.iter().map(render).collect::<Vec<_>>().join(" ")
}
