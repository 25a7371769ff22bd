pub mod api;
pub mod config;
pub mod downloader;
pub mod events;
pub mod humanize;
pub mod observability;
pub mod queue;
pub mod worker;
