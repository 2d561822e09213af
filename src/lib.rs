pub mod calendar;
pub mod config;
pub mod db;
pub mod flow; // stage functions + conversation orchestrator
pub mod llm;
pub mod models;
pub mod notify;
pub mod parser; // tiered selection parser
