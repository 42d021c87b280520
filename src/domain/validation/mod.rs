pub mod data_quality;

pub use data_quality::BarSanitizer;
