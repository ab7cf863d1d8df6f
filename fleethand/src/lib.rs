//! Fleethand Library
//!
//! Core modules for the fleethand machine-room CLI.

pub mod commands;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod provision;
pub mod remote;
pub mod report;
pub mod roster;
pub mod storage;
pub mod tunnel;
pub mod walker;
