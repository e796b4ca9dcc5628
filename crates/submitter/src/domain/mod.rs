//! Core domain types: submittable items, rules, and errors.

pub mod errors;
pub mod model;
pub mod rules;
