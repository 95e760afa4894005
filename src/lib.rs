pub mod commands;
pub mod configuration;
pub mod downloader;
pub mod errors;
pub mod fal;
pub mod job;
pub mod materialize;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod staging;
pub mod utils;
