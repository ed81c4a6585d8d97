//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the crate:
//! - Collections (multi-value lookup maps)
//! - Flag sets with unbounded indices
//! - Time management
//! - Logging utilities

pub mod collections;
pub mod flags;
pub mod time;
pub mod logging;
