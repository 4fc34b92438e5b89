//! Shared types and error plumbing used across all quill crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, FromMessage},
    types::UserId,
};
