pub mod csv;
pub mod dataset;
pub mod provider;

pub use dataset::Dataset;
pub use provider::{CsvDataProvider, DataProvider};
