//! Debug formatting helpers for [`custom_debug_derive`].

use std::fmt;

/// Prints `<redacted>` in place of a secret.
///
/// Use with `#[debug(with = crate::fmt::redacted)]` on credential fields.
pub fn redacted<T>(_: &T, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("<redacted>")
}
