//! Repository layer for database operations

pub mod id_mappings;
