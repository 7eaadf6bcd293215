//! judge-micro: configuration-driven judging service for C/C++ submissions
//!
//! A submission is compiled inside an ephemeral, resource-capped container,
//! its `solve` entry point is invoked by a generated driver, parameter
//! mutations are captured, and a structured verdict comes back. The facade
//! ([`service::JudgeService`]) is what the network layer mounts; the
//! `judge-harness` binary is the in-container driver each language image
//! ships.

pub mod classifier;
pub mod codec;
pub mod config;
pub mod error;
pub mod harness;
pub mod languages;
pub mod orchestrator;
pub mod sandbox;
pub mod service;
pub mod types;

pub use error::JudgeError;
pub use service::JudgeService;
pub use types::{Submission, Verdict, VerdictStatus};
