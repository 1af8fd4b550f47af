//! Processing programs built on the vector data model.

pub mod vector;
