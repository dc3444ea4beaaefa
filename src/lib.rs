pub mod api;
pub mod build;
pub mod cli;
pub mod notify;
