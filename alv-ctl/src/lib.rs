//! # alv-ctl
//!
//! Command-line driver for the ALV-5000/E correlator. Each invocation
//! links to the correlator window, runs one command and unlinks.
//!
//! With `--simulate` the commands run against an in-process simulated
//! correlator instead of the real application.

pub mod config;
