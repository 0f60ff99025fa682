// Services shared by the CLI commands
//
// Org housekeeping (cleanup, storage, comparison against the snapshot) and
// the ID mapping cache used by upload and cleanup.

pub mod cleanup;
pub mod compare;
pub mod id_map;
pub mod storage;

pub use id_map::IdMapStore;
