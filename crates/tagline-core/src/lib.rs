//! Tagline core library - shared types, traits, and the tag view model.
//!
//! This crate contains no I/O and can be compiled for any target.

mod confirm;
mod error;
mod service;
mod tag;

pub mod mock;

pub use confirm::{AutoConfirm, ConfirmRequest, ConfirmationSurface};
pub use error::Error;
pub use service::{TagService, ALL_NOTES};
pub use tag::{normalize_tag, TagCount, TagRegistry};
