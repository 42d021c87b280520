pub mod cross_validation;
pub mod ensemble;
pub mod optimizer;
pub mod predictor;
pub mod recurrent;
pub mod sequence_model;
pub mod tree_model;
pub mod window_builder;

pub use cross_validation::{CrossValidationReport, FoldReport, TimeSeriesSplit};
pub use ensemble::{ComponentPredictions, EnsembleForecaster, ModelPair};
pub use predictor::Regressor;
pub use sequence_model::{SequenceModel, TrainingHistory};
pub use tree_model::{BoostingReport, TreeModel};
pub use window_builder::WindowBuilder;
