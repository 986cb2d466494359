pub mod config;
pub mod db;
pub mod error;
pub mod generate;
pub mod jobs;
pub mod models;
pub mod output;
pub mod render;
pub mod versions;
