//! Seasonal ARIMA (1,1,1)(1,1,1,s)
//!
//! Estimation and forecasting are delegated to `anofox_forecast`'s SARIMA.
//! The persisted artifact holds the order and the fitting window; a loaded
//! model is refitted on that window before its first forecast.

use std::fmt;
use std::path::Path;

use anofox_forecast::core::TimeSeries;
use anofox_forecast::models::arima::SARIMA;
use anofox_forecast::models::Forecaster;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifacts::{schema_hash, Artifact, ArtifactKind};
use crate::error::{PipelineError, Result};

/// Order (1,1,1)(1,1,1,s); only the season length varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonalOrder {
    pub season_length: usize,
}

impl fmt::Display for SeasonalOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SARIMA(1,1,1)(1,1,1,{})", self.season_length)
    }
}

impl SeasonalOrder {
    /// Observations needed to fit: four seasons plus slack for the
    /// regular and seasonal differences and the ARMA lags.
    pub fn min_observations(&self) -> usize {
        4 * self.season_length + 16
    }

    fn estimator(&self) -> SARIMA {
        SARIMA::new(1, 1, 1, 1, 1, 1, self.season_length)
    }
}

#[derive(Serialize, Deserialize)]
pub struct SarimaModel {
    pub order: SeasonalOrder,
    pub n_obs: usize,
    pub last_timestamp: DateTime<Utc>,
    history: Vec<f64>,
    #[serde(skip)]
    fitted: Option<SARIMA>,
}

impl fmt::Debug for SarimaModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SarimaModel")
            .field("order", &self.order)
            .field("n_obs", &self.n_obs)
            .field("last_timestamp", &self.last_timestamp)
            .field("fitted", &self.fitted.is_some())
            .finish()
    }
}

/// Hourly series ending at `last_timestamp`.
fn hourly_series(values: &[f64], last_timestamp: DateTime<Utc>) -> Result<TimeSeries> {
    let n = values.len() as i64;
    let timestamps = (0..n)
        .map(|i| last_timestamp - Duration::hours(n - 1 - i))
        .collect();
    TimeSeries::univariate(timestamps, values.to_vec()).map_err(PipelineError::model)
}

fn fit_estimator(order: SeasonalOrder, values: &[f64], last_timestamp: DateTime<Utc>) -> Result<SARIMA> {
    let series = hourly_series(values, last_timestamp)?;
    let mut estimator = order.estimator();
    estimator
        .fit(&series)
        .map_err(|e| PipelineError::Model(format!("{} failed to fit: {}", order, e)))?;
    Ok(estimator)
}

impl SarimaModel {
    pub fn fit(y: &[f64], order: SeasonalOrder, last_timestamp: DateTime<Utc>) -> Result<Self> {
        if order.season_length < 2 {
            return Err(PipelineError::InvalidConfig(format!(
                "season length must be at least 2, got {}",
                order.season_length
            )));
        }
        if y.len() < order.min_observations() {
            return Err(PipelineError::InsufficientData {
                required: order.min_observations(),
                actual: y.len(),
            });
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::Model("series contains non-finite values".to_string()));
        }

        let estimator = fit_estimator(order, y, last_timestamp)?;
        debug!(order = %order, observations = y.len(), "fitted seasonal model");
        Ok(Self {
            order,
            n_obs: y.len(),
            last_timestamp,
            history: y.to_vec(),
            fitted: Some(estimator),
        })
    }

    /// Forecast `horizon` steps past the last observation. A loaded model
    /// is refitted on its history first.
    pub fn forecast(&mut self, horizon: usize) -> Result<Vec<f64>> {
        if self.fitted.is_none() {
            self.fitted = Some(fit_estimator(self.order, &self.history, self.last_timestamp)?);
        }
        let estimator = self
            .fitted
            .as_mut()
            .ok_or_else(|| PipelineError::Model(format!("{} has not been fitted", self.order)))?;

        let forecast = estimator
            .predict(horizon)
            .map_err(|e| PipelineError::Model(format!("{} failed to forecast: {}", self.order, e)))?
            .primary()
            .to_vec();
        if forecast.len() != horizon {
            return Err(PipelineError::Model(format!(
                "{} returned {} steps for a horizon of {}",
                self.order,
                forecast.len(),
                horizon
            )));
        }
        if forecast.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::Model(format!("{} produced a non-finite forecast", self.order)));
        }
        Ok(forecast)
    }

    /// The observations the model was fitted on.
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        Artifact::new(
            ArtifactKind::SeasonalModel,
            self.order.to_string(),
            series_schema_hash(),
            self,
        )
        .save(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Artifact::<Self>::load_matching(path, ArtifactKind::SeasonalModel, &series_schema_hash())?.payload)
    }
}

fn series_schema_hash() -> String {
    schema_hash(&["time", crate::data::TARGET_COLUMN])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const DAY: usize = 24;

    fn order() -> SeasonalOrder {
        SeasonalOrder { season_length: DAY }
    }

    fn end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 1, 21, 23, 0, 0).unwrap()
    }

    fn noisy_daily_series(days: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..days * DAY)
            .map(|t| {
                let phase = (t % DAY) as f64 / DAY as f64 * std::f64::consts::TAU;
                25_000.0 + 4_000.0 * phase.sin() + 1_500.0 * (2.0 * phase).cos() + rng.gen_range(-50.0..50.0)
            })
            .collect()
    }

    fn mape(forecast: &[f64], actual: &[f64]) -> f64 {
        forecast
            .iter()
            .zip(actual)
            .map(|(f, a)| ((f - a) / a).abs())
            .sum::<f64>()
            / actual.len() as f64
            * 100.0
    }

    #[test]
    fn test_noisy_daily_series_forecasts_held_out_day() {
        let y = noisy_daily_series(22, 42);
        let n = y.len() - DAY;

        let mut model = SarimaModel::fit(&y[..n], order(), end()).unwrap();
        let forecast = model.forecast(DAY).unwrap();
        assert_eq!(forecast.len(), DAY);
        assert!(mape(&forecast, &y[n..]) < 5.0);
    }

    #[test]
    fn test_short_series_rejected() {
        let y = vec![1.0; order().min_observations() - 1];
        let err = SarimaModel::fit(&y, order(), end()).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { required, .. } if required == 4 * DAY + 16));
    }

    #[test]
    fn test_non_finite_series_rejected() {
        let mut y = noisy_daily_series(10, 7);
        y[50] = f64::NAN;
        let err = SarimaModel::fit(&y, order(), end()).unwrap_err();
        assert!(matches!(err, PipelineError::Model(_)));
    }

    #[test]
    fn test_season_length_must_be_seasonal() {
        let err = SarimaModel::fit(&[1.0; 200], SeasonalOrder { season_length: 1 }, end()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_loaded_model_refits_and_forecasts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sarima_model.bin");
        let y = noisy_daily_series(10, 3);
        let mut model = SarimaModel::fit(&y, order(), end()).unwrap();
        model.save(&path).unwrap();

        let mut loaded = SarimaModel::load(&path).unwrap();
        assert_eq!(loaded.order, model.order);
        assert_eq!(loaded.n_obs, y.len());
        assert_eq!(loaded.last_timestamp, end());
        assert_eq!(loaded.history(), &y[..]);

        let original = model.forecast(3).unwrap();
        let restored = loaded.forecast(3).unwrap();
        for (a, b) in original.iter().zip(&restored) {
            assert!((a - b).abs() < 1e-6 * a.abs().max(1.0), "{} vs {}", a, b);
        }
    }
}
