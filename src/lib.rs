pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
mod config_tests;
