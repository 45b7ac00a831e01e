//! Edifice - IoT Building Simulation Engine

pub mod alarm;
pub mod behavior;
pub mod config;
pub mod core;
pub mod engine;
pub mod hierarchy;
pub mod resolver;
pub mod schedule;
