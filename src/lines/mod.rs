pub mod decoder;
pub mod batch;
pub mod command;
pub mod processor;
pub mod benchmark;
