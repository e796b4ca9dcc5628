//! Application layer: assignment targets, packaging and delivery.

pub mod manifest;
pub mod packager;
pub mod protocol;
pub mod scan;
pub mod target;
pub mod traversal;
