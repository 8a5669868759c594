//! Core services: authentication, session cache, configuration and persistence

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
