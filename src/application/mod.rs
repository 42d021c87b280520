// Technical indicators
pub mod feature_engineering_service;

// Windowing, models and ensembling
pub mod ml;

// End-to-end forecasting flow
pub mod pipeline;
