//! Decode machinery: bit-field extraction, formats, patterns and the
//! dispatch table.

pub mod bits;
pub mod decode;
pub mod pattern;
pub(crate) mod table;
