// src/config/mod.rs
pub mod settings;
