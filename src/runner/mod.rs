pub mod benchmark;
pub mod runner;
pub mod cli;
