//! This crate provides a level 2 reduction dispatcher for PypeIt.
//!
//! Given an instrument and a directory of raw data, it generates PypeIt setup files, discovers
//! one reduction job per instrument configuration and runs the external reduction command for
//! each of them on a bounded pool of workers. Every job writes its output to a log file of its
//! own. Successful reductions are reported to the Keck Observatory Archive's RTI service, on a
//! best-effort basis.
//!
//! The dispatcher is built on top of a number of open source components.
//!
//! * [Tokio](tokio) runs the reduction processes concurrently and bounds them with a semaphore.
//! * [Clap](clap) parses the command line.
//! * [Reqwest](reqwest) sends RTI notifications.
//! * [Serde](serde) serialises the run summary to JSON.
//! * [Tracing](tracing) provides structured logging.

pub mod app;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod notification;
pub mod process;
pub mod resource_manager;
pub mod runner;
pub mod setup;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
