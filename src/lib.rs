#![doc = "drive-shorts: fetch videos from a cloud storage folder and publish them as short-form videos."]

//! The pipeline is thin orchestration glue over two external HTTP APIs:
//! a cloud storage service the videos are drained from and a publishing
//! service they are uploaded to, with cached OAuth credentials per service.
//!
//! The seams ([`drive::StorageClient`], [`youtube::PublishClient`],
//! [`auth::AuthorizationFlow`]) are traits with mockall doubles exported
//! through the `test-export-mocks` feature for integration tests.

pub mod auth;
pub mod cli;
pub mod config;
pub mod drive;
pub mod error;
pub mod load_config;
pub mod pipeline;
pub mod transfer;
pub mod youtube;

pub use cli::{run, Cli, Commands};
