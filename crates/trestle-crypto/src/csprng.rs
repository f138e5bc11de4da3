//! Randomness from the platform CSPRNG.

use crate::error::RandomError;

/// Fills `dst` with cryptographically secure random octets.
///
/// Filling an empty slice is a no-op and always succeeds.
pub fn fill_random(dst: &mut [u8]) -> Result<(), RandomError> {
    getrandom::getrandom(dst).map_err(RandomError)
}
