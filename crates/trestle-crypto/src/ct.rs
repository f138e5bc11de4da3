//! Constant time comparison.

use subtle::ConstantTimeEq as _;

/// Compares `a` and `b` without leaking where they differ.
///
/// Slices of different lengths compare unequal immediately; length
/// is not treated as secret.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
