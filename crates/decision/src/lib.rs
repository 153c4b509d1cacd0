//! Release parsing and quality scoring (C1 + C2): turns a raw release title
//! and search result into a ranked, profile-scored candidate for C4/C11.
//!
//! This crate has no knowledge of indexers, download clients, or storage —
//! it is pure, synchronous, and side-effect free, operating entirely on the
//! value types in `reelforge_core::models`.

pub mod custom_formats;
pub mod parser;
pub mod scoring;

pub use custom_formats::{condition_matches, custom_format_score, format_matches};
pub use parser::parse_release_title;
pub use scoring::{rank, score_release};
