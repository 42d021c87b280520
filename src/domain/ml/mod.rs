// Model inputs, scaling and evaluation
pub mod dataset;
pub mod feature_registry;
pub mod metrics;
pub mod scaling;
pub mod weights;

pub use dataset::WindowedDataset;
pub use feature_registry::{FEATURE_SCHEMA, FeatureColumn};
pub use metrics::RegressionMetrics;
pub use scaling::ScalingState;
pub use weights::EnsembleWeights;
