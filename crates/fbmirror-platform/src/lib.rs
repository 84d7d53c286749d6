//! Collaborator contracts consumed by the mirror pipeline.

pub mod cursor;
pub mod screen;
pub mod sink;
