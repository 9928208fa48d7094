pub mod config;
pub mod downscale;
pub mod generate;
pub mod gpu;
pub mod models;
pub mod serve;
