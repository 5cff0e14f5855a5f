//! Persistence for cached course outlines, confirmed progress, the lesson
//! sync journal and the stored login.

pub mod repository;
pub mod sqlite;
