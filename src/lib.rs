// src/lib.rs

//! AIP Mirror Library
//!
//! Crawls the Argentine Aeronautical Information Publication, keeps an
//! incremental cache of its PDF documents and assembles them into
//! navigable combined volumes.

pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod testing;
