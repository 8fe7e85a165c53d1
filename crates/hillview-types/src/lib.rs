//! Shared vocabulary for the Hillview crates: errors, column kinds, cell
//! values, and bitsets.

pub mod bitset;
pub mod error;
pub mod kind;
pub mod value;
