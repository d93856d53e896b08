//! Constant-time comparison helpers.

use subtle::ConstantTimeEq;

/// Compare two strings without leaking where they differ.
///
/// The length check is not constant-time with respect to the lengths
/// themselves; only contents are protected.
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    let len_eq = (a.len() as u64).ct_eq(&(b.len() as u64));
    if !bool::from(len_eq) {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
