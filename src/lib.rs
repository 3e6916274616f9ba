//! Client-side normalization and live synchronization for a question/answer forum.

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod screens;
pub mod sync;
