pub mod catalog;
pub mod config;
pub mod image;
pub mod paths;
