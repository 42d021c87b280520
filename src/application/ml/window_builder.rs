use crate::domain::errors::{ForecastError, Result};
use crate::domain::market::EnrichedBar;
use crate::domain::ml::feature_registry::features_to_vector;
use crate::domain::ml::{FEATURE_SCHEMA, FeatureColumn, ScalingState, WindowedDataset};
use chrono::NaiveDate;
use ndarray::{Array1, Array2, Array3, s};
use tracing::debug;

/// Rows that survived cleaning, with their raw closes and dates.
struct CleanRows {
    features: Array2<f64>,
    closes: Vec<f64>,
    dates: Vec<NaiveDate>,
}

/// Turns enriched bars into scaled sliding windows.
///
/// Window `i` covers clean rows `i..i + L`; its target is the unscaled close
/// of row `i + L`.
#[derive(Debug, Clone)]
pub struct WindowBuilder {
    sequence_length: usize,
    schema: Vec<FeatureColumn>,
}

impl WindowBuilder {
    /// Builder over the standard twelve-column schema.
    pub fn new(sequence_length: usize) -> Result<Self> {
        Self::with_schema(sequence_length, FEATURE_SCHEMA.to_vec())
    }

    pub fn with_schema(sequence_length: usize, schema: Vec<FeatureColumn>) -> Result<Self> {
        if sequence_length == 0 {
            return Err(ForecastError::invalid_config(
                "sequence length must be positive",
            ));
        }
        if schema.is_empty() {
            return Err(ForecastError::invalid_config("feature schema is empty"));
        }
        Ok(Self {
            sequence_length,
            schema,
        })
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn schema(&self) -> &[FeatureColumn] {
        &self.schema
    }

    /// Drops rows with any undefined or non-finite selected field.
    fn clean(&self, rows: &[EnrichedBar]) -> Result<CleanRows> {
        let mut values = Vec::with_capacity(rows.len() * self.schema.len());
        let mut closes = Vec::with_capacity(rows.len());
        let mut dates = Vec::with_capacity(rows.len());

        for row in rows {
            if let Some(vector) = features_to_vector(row, &self.schema) {
                values.extend(vector);
                closes.push(row.close());
                dates.push(row.date());
            }
        }
        debug!(
            "WindowBuilder: kept {} of {} rows after dropping undefined values",
            closes.len(),
            rows.len()
        );

        let features = Array2::from_shape_vec((closes.len(), self.schema.len()), values)
            .map_err(|e| ForecastError::InvalidData {
                reason: format!("feature matrix shape: {}", e),
            })?;
        Ok(CleanRows {
            features,
            closes,
            dates,
        })
    }

    fn ensure_enough(&self, clean: &CleanRows) -> Result<()> {
        if clean.closes.len() <= self.sequence_length {
            return Err(ForecastError::insufficient(
                "windowing",
                self.sequence_length,
                clean.closes.len(),
            ));
        }
        Ok(())
    }

    fn windows(&self, scaled: &Array2<f64>, clean: &CleanRows) -> Result<WindowedDataset> {
        let l = self.sequence_length;
        let n_windows = clean.closes.len() - l;

        let mut x = Array3::<f64>::zeros((n_windows, l, self.schema.len()));
        for i in 0..n_windows {
            x.slice_mut(s![i, .., ..])
                .assign(&scaled.slice(s![i..i + l, ..]));
        }
        let y = Array1::from(clean.closes[l..].to_vec());
        WindowedDataset::new(x, y, clean.dates[l..].to_vec())
    }

    /// Fits the scaler on all clean rows and windows them.
    pub fn fit_transform(&self, rows: &[EnrichedBar]) -> Result<(WindowedDataset, ScalingState)> {
        let clean = self.clean(rows)?;
        self.ensure_enough(&clean)?;

        let scaling = ScalingState::fit(&clean.features)?;
        let scaled = scaling.transform(&clean.features)?;
        let dataset = self.windows(&scaled, &clean)?;
        Ok((dataset, scaling))
    }

    /// Windows `rows` with an existing scaling state; never refits.
    pub fn transform(&self, rows: &[EnrichedBar], scaling: &ScalingState) -> Result<WindowedDataset> {
        let clean = self.clean(rows)?;
        self.ensure_enough(&clean)?;

        let scaled = scaling.transform(&clean.features)?;
        self.windows(&scaled, &clean)
    }

    /// The most recent `sequence_length` clean rows as a single
    /// (1, L, features) window, for next-day prediction. Also returns the
    /// date of the last row in the window.
    pub fn latest_window(
        &self,
        rows: &[EnrichedBar],
        scaling: &ScalingState,
    ) -> Result<(Array3<f64>, NaiveDate)> {
        let clean = self.clean(rows)?;
        let l = self.sequence_length;
        let available = clean.closes.len();
        if available < l {
            return Err(ForecastError::insufficient("latest window", l - 1, available));
        }

        let scaled = scaling.transform(&clean.features.slice(s![available - l.., ..]).to_owned())?;
        let window = scaled.insert_axis(ndarray::Axis(0));
        Ok((window, clean.dates[available - 1]))
    }
}
