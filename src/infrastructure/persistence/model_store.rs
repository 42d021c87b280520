//! Persistence for trained forecasters.
//!
//! One JSON artifact holds the configuration, feature schema, fitted scaling
//! state and both trained models, so a reloaded pipeline predicts exactly
//! like the one that was saved.

use crate::application::ml::{ModelPair, Regressor, SequenceModel, TreeModel};
use crate::application::pipeline::ForecastPipeline;
use crate::config::ForecastConfig;
use crate::domain::ml::{FeatureColumn, ScalingState};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct ArtifactRef<'a> {
    format_version: u32,
    config: &'a ForecastConfig,
    schema: &'a [FeatureColumn],
    scaling: &'a ScalingState,
    models: &'a ModelPair<SequenceModel, TreeModel>,
}

#[derive(Deserialize)]
struct Artifact {
    format_version: u32,
    config: ForecastConfig,
    schema: Vec<FeatureColumn>,
    scaling: ScalingState,
    models: ModelPair<SequenceModel, TreeModel>,
}

/// Handles persistence of a trained pipeline to a single file.
pub struct ModelStore {
    file_path: PathBuf,
}

impl ModelStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn exists(&self) -> bool {
        self.file_path.exists()
    }

    /// Writes the pipeline atomically. Both models and the scaling state
    /// must be present.
    pub fn save(&self, pipeline: &ForecastPipeline<SequenceModel, TreeModel>) -> Result<()> {
        let models = pipeline.forecaster().models();
        if !models.sequence.is_trained() || !models.tree.is_trained() {
            bail!("Refusing to save: models are not trained");
        }
        let scaling = pipeline
            .scaling_state()
            .context("Refusing to save: no fitted scaling state")?;

        let artifact = ArtifactRef {
            format_version: FORMAT_VERSION,
            config: pipeline.config(),
            schema: pipeline.schema(),
            scaling,
            models,
        };

        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).context("Failed to create model directory")?;
            }
        }

        // Atomic write: write to temp file then rename
        let temp_path = self.file_path.with_extension("tmp");
        {
            let file = File::create(&temp_path).context("Failed to create temp model file")?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &artifact).context("Failed to serialize models")?;
            writer.flush().context("Failed to flush model file")?;
        }
        fs::rename(&temp_path, &self.file_path).context("Failed to rename model file")?;

        info!("Saved forecaster to {:?}", self.file_path);
        Ok(())
    }

    pub fn load(&self) -> Result<ForecastPipeline<SequenceModel, TreeModel>> {
        let file = File::open(&self.file_path)
            .with_context(|| format!("Failed to open model file {:?}", self.file_path))?;
        let artifact: Artifact = serde_json::from_reader(BufReader::new(file))
            .context("Failed to parse model JSON")?;

        if artifact.format_version != FORMAT_VERSION {
            bail!(
                "Unsupported model format version {} (expected {})",
                artifact.format_version,
                FORMAT_VERSION
            );
        }

        let pipeline = ForecastPipeline::from_parts(
            artifact.config,
            artifact.schema,
            artifact.scaling,
            artifact.models,
        )
        .context("Stored forecaster is inconsistent")?;

        info!("Loaded forecaster from {:?}", self.file_path);
        Ok(pipeline)
    }
}
