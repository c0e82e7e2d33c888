//! Variant injection: the page-side runtime that applies variant content
//! to the live DOM through a resolved selector map.

pub mod agent;
pub mod payload;
