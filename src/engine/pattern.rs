//! Wildcard bit patterns for the dispatch table.
//!
//! An instruction encoding is described by a pattern string of `0`, `1` and
//! `?` characters, most significant bit first, with spaces allowed as field
//! separators. `0`/`1` are literal bits, `?` matches either value.

use thiserror::Error;

/// Construction-time dispatch-table defects. These are caught while the
/// table is built, before any instruction executes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("pattern for '{name}' has {got} significant characters, expected 32")]
    BadLength { name: &'static str, got: usize },

    #[error("pattern for '{name}' contains invalid character {ch:?}")]
    BadChar { name: &'static str, ch: char },

    #[error("dispatch table must end with an all-wildcard catch-all entry")]
    MissingCatchAll,

    #[error("entry '{name}' is unreachable: every word it matches is claimed by '{shadowed_by}'")]
    Unreachable {
        name: &'static str,
        shadowed_by: &'static str,
    },
}

/// A compiled 32-bit match pattern: a word matches iff all bits selected by
/// `mask` equal the corresponding bits of `expected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pattern {
    mask: u32,
    expected: u32,
}

impl Pattern {
    /// Compile a pattern string. `name` is only used in error reports.
    pub fn parse(name: &'static str, text: &str) -> Result<Pattern, TableError> {
        let mut mask: u64 = 0;
        let mut expected: u64 = 0;
        let mut len = 0usize;
        for ch in text.chars() {
            match ch {
                ' ' => continue,
                '0' | '1' | '?' => {
                    mask <<= 1;
                    expected <<= 1;
                    if ch != '?' {
                        mask |= 1;
                        if ch == '1' {
                            expected |= 1;
                        }
                    }
                    len += 1;
                    if len > 32 {
                        // Keep counting would overflow the accumulators.
                        return Err(TableError::BadLength {
                            name,
                            got: text.chars().filter(|c| *c != ' ').count(),
                        });
                    }
                }
                _ => return Err(TableError::BadChar { name, ch }),
            }
        }
        if len != 32 {
            return Err(TableError::BadLength { name, got: len });
        }
        Ok(Pattern {
            mask: mask as u32,
            expected: expected as u32,
        })
    }

    /// True iff every literal bit of the pattern equals the corresponding
    /// bit of `word`.
    #[inline]
    pub fn matches(self, word: u32) -> bool {
        word & self.mask == self.expected
    }

    /// True for the all-wildcard pattern that matches every word.
    pub fn is_catch_all(self) -> bool {
        self.mask == 0
    }

    /// True iff `self` matches every word that `other` matches, i.e. `self`
    /// fixes a subset of `other`'s bits and agrees with it on all of them.
    /// An earlier shadowing entry makes a later one unreachable.
    pub fn shadows(self, other: Pattern) -> bool {
        self.mask & !other.mask == 0 && other.expected & self.mask == self.expected
    }
}
