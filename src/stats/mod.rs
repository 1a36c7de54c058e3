pub mod histogram;
pub mod rates;
pub mod aggregator;
pub mod reporter;
pub mod result;
