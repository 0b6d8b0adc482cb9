//! CLI Commands

pub mod features;
pub mod run;
pub mod scenarios;
