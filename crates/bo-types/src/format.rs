//! Fixed-precision rendering of query vectors and scalars for diagnostics.

use std::fmt::Write;

/// Render `values` as `"[v0, v1, ...]"` with exactly `precision` decimals per
/// value. An empty slice renders as `"[]"`.
pub fn format_vector(values: &[f64], precision: usize) -> String {
    let mut out = String::with_capacity(2 + values.len() * (precision + 4));
    out.push('[');
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        // Writing into a String cannot fail.
        let _ = write!(out, "{value:.precision$}");
    }
    out.push(']');
    out
}

/// Render a single value with exactly `precision` decimals.
pub fn format_scalar(value: f64, precision: usize) -> String {
    format!("{value:.precision$}")
}
