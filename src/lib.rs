//! Hashsweep library crate
//!
//! Scans directory trees and reports files whose MD5, SHA-1 or SHA-256
//! digest appears in a set of Guava-compatible Bloom filter databases.
//! This crate provides both a CLI binary and a library API for programmatic use.

pub mod bloom;
pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod scan_cache;
pub mod scanner;
pub mod signatures;
pub mod utils;
