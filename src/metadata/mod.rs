//! Format-level building blocks of ECMA-335 metadata.
//!
//! Everything in this module speaks the physical format: tokens, table ids and rows, the four
//! heaps and the width arithmetic of the `#~` stream. Nothing here knows about the object
//! model being emitted; that translation lives in [`crate::writer`].

pub mod heaps;
pub mod sizes;
pub mod tables;
pub mod token;
