// Market data providers
pub mod csv_market_data;
pub mod mock;

// Trained model storage
pub mod persistence;

pub use csv_market_data::CsvMarketDataProvider;
pub use mock::SyntheticMarketData;
pub use persistence::ModelStore;
