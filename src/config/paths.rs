//! Well-known directories.
pub mod xdg_root;
