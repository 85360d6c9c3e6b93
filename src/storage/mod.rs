//! Filesystem layer
//!
//! Everything in the pipeline that touches the disk goes through the helpers
//! in [`file_io`], so moves, copies and deletes behave the same way whether
//! they are staging, placing or pruning a backup set.

pub mod file_io;

pub use file_io::{
    backup_file, backup_folder, copy_recursive, move_overwrite, move_path, read_json,
    remove_path, write_json_atomic,
};
