pub mod config;
pub mod printer;
