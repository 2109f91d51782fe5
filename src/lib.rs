#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod fetch;
pub mod formats;
pub mod gemini;
pub mod generate;
pub mod logging;
pub mod notify;
pub mod run;
pub mod store;
pub mod translate;
pub mod walker;
