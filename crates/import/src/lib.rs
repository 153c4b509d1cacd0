//! Import pipeline: turns a completed download into a placed library file.
//!
//! Covers C8 (Import Decision Maker), C9 (Episode Matcher), C10 (Upgrade
//! Checker), and placement/move logic, composed in `pipeline::ImportPipeline`
//! which implements `reelforge_core::ports::ImportExecutor`.

pub mod decision;
pub mod episode_matcher;
pub mod file_scanner;
pub mod pipeline;
pub mod placement;
pub mod upgrade;

pub use decision::{FileDecision, ImportDecisionMaker};
pub use episode_matcher::{EpisodeMatch, EpisodeMatcher, EpisodeMatcherConfig, EpisodeRecord};
pub use file_scanner::DiscoveredFile;
pub use pipeline::{ImportPipeline, ImportPipelineConfig};
pub use upgrade::{OldFilePolicy, UpgradeDecision};

pub use reelforge_core::{CoreError, Result};
