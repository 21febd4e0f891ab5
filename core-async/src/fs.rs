//! Async filesystem access.

pub use tokio::fs::{
    create_dir_all, metadata, read, remove_dir_all, remove_file, write, File, OpenOptions,
};
