//! File system utilities.
//!
//! - [`atomic`] - crash-safe writes used for every persisted record
//! - [`dirs`] - directory creation, best-effort removal, permission-preserving copies

pub mod atomic;
pub mod dirs;

pub use atomic::{atomic_write, write_json_file};
pub use dirs::{copy_with_permissions, ensure_dir, ensure_parent_dir, remove_dir_best_effort};
