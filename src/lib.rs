//! Library Scraper
//!
//! Walks media library folders on a schedule, identifies each media file from
//! local NFO sidecars or its file name, and fills in missing metadata.

pub mod cli;
pub mod config;
pub mod jobs;
pub mod services;
