//! Oximerge: VCDIFF (RFC 3284) delta merging in Rust.
//!
//! Given a chain of xdelta3-family deltas `V0 -> V1 -> ... -> Vn`, the crate
//! composes them into a single equivalent delta `V0 -> Vn` without ever
//! materializing an intermediate version.
//!
//! The crate provides:
//! - Format-level VCDIFF plumbing (`vcdiff`)
//! - The flat "whole-state" delta representation (`whole`)
//! - The merge engine (`merge`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use oximerge::{merge, whole};
//!
//! let a = std::fs::read("v0-to-v1.vcdiff").unwrap();
//! let b = std::fs::read("v1-to-v2.vcdiff").unwrap();
//!
//! let a = whole::decode_whole(&a).unwrap();
//! let b = whole::decode_whole(&b).unwrap();
//! let merged = merge::merge(&a, &b).unwrap();
//!
//! let mut out = Vec::new();
//! whole::encode_whole(&merged, &mut out, &Default::default()).unwrap();
//! std::fs::write("v0-to-v2.vcdiff", &out).unwrap();
//! ```

pub mod io;
pub mod merge;
pub mod vcdiff;
pub mod whole;

#[cfg(feature = "cli")]
pub mod cli;
