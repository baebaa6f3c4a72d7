//! Roster Core: shared domain types, error taxonomy and the backend
//! traits the reconciliation and quota engines are written against.

pub mod error;
pub mod models;
pub mod repository;
