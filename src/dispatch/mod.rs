pub mod batch;
pub mod channel;
pub mod scanner;
