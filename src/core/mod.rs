// src/core/mod.rs
pub mod coordinator;
pub mod driver;
