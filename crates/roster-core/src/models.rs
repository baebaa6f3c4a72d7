//! Domain models for roster.
//!
//! Backend records (`Identity`, `Group`, `Role`), the canonical upstream
//! feed records and the quota vocabulary shared by all crates.

pub mod feed;
pub mod group;
pub mod identity;
pub mod quota;
pub mod role;
