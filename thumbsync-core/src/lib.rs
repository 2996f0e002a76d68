#![doc = "thumbsync-core: matching and upload pipeline for thumbsync."]

//! This crate contains the logic that pairs thumbnails from a CAD export archive with records of a
//! remote table by part number, and uploads them as attachments.
//! Transport and authentication for a concrete store live in the `thumbsync` crate.
//!
//! # Usage
//! Implement [`contract::RecordStore`] for a backend, build a [`pipeline::Pipeline`] with a
//! [`config::PipelineConfig`], and call [`pipeline::Pipeline::run_bytes`] with the archive.

pub mod archive;
pub mod config;
pub mod contract;
pub mod filename;
pub mod matcher;
pub mod pipeline;
pub mod progress;
pub mod schema;
pub mod throttle;
pub mod uploader;

pub use config::PipelineConfig;
pub use pipeline::{Pipeline, PipelineError};
pub use progress::{
    OutcomeStatus, PipelineReport, ProgressState, SkipReason, Summary, UploadOutcome,
};
