use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use super::{ApiError, AppState, ModelSlot};
use crate::features::Season;
use crate::ml::LoadQuery;

/// One hourly record to score. Quantities are MW.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PredictionRequest {
    #[validate(range(min = 0.0, max = 50000.0))]
    pub generation_biomass: f64,
    #[validate(range(min = 0.0, max = 50000.0))]
    pub generation_fossil_brown_coal_lignite: f64,
    #[validate(range(min = 0.0, max = 50000.0))]
    pub generation_fossil_coal_derived_gas: f64,
    #[validate(range(min = 0.0, max = 50000.0))]
    pub generation_fossil_gas: f64,
    #[validate(range(min = 0.0, max = 50000.0))]
    pub generation_fossil_hard_coal: f64,
    #[validate(range(min = 0.0, max = 50000.0))]
    pub generation_fossil_oil: f64,
    #[validate(range(min = 0.0, max = 50000.0))]
    pub generation_geothermal: f64,
    #[validate(range(min = 0.0, max = 50000.0))]
    pub generation_hydro_pumped_storage_consumption: f64,
    #[validate(range(min = 0.0, max = 50000.0))]
    pub generation_hydro_run_of_river_and_poundage: f64,
    #[validate(range(min = 0.0, max = 50000.0))]
    pub generation_hydro_water_reservoir: f64,
    #[validate(range(min = 0.0, max = 50000.0))]
    pub generation_solar: f64,
    #[validate(range(min = 0.0, max = 50000.0))]
    pub generation_wind_onshore: f64,
    #[validate(range(min = 0.0, max = 50000.0))]
    pub forecast_solar_day_ahead: f64,
    #[validate(range(min = 0.0, max = 50000.0))]
    pub forecast_wind_onshore_day_ahead: f64,
    #[validate(range(min = 0.0, max = 100000.0))]
    pub total_load_forecast: f64,
    #[validate(range(max = 23))]
    pub hour: u32,
    /// Monday = 0
    #[validate(range(max = 6))]
    pub day_of_week: u32,
    #[validate(range(min = 1, max = 12))]
    pub month: u32,
    #[validate(range(max = 1))]
    pub is_weekend: u8,
    /// 0 = Fall, 1 = Spring, 2 = Summer, 3 = Winter
    #[validate(range(max = 3))]
    pub season: u8,
}

impl PredictionRequest {
    /// Quantities under their dataset column names.
    pub fn quantities(&self) -> Vec<(String, f64)> {
        [
            ("generation biomass", self.generation_biomass),
            ("generation fossil brown coal/lignite", self.generation_fossil_brown_coal_lignite),
            ("generation fossil coal-derived gas", self.generation_fossil_coal_derived_gas),
            ("generation fossil gas", self.generation_fossil_gas),
            ("generation fossil hard coal", self.generation_fossil_hard_coal),
            ("generation fossil oil", self.generation_fossil_oil),
            ("generation geothermal", self.generation_geothermal),
            (
                "generation hydro pumped storage consumption",
                self.generation_hydro_pumped_storage_consumption,
            ),
            (
                "generation hydro run-of-river and poundage",
                self.generation_hydro_run_of_river_and_poundage,
            ),
            ("generation hydro water reservoir", self.generation_hydro_water_reservoir),
            ("generation solar", self.generation_solar),
            ("generation wind onshore", self.generation_wind_onshore),
            ("forecast solar day ahead", self.forecast_solar_day_ahead),
            ("forecast wind onshore day ahead", self.forecast_wind_onshore_day_ahead),
            ("total load forecast", self.total_load_forecast),
        ]
        .into_iter()
        .map(|(column, value)| (column.to_string(), value))
        .collect()
    }

    pub fn to_query(&self) -> Result<LoadQuery, ApiError> {
        let season = Season::from_code(self.season as usize)
            .ok_or_else(|| ApiError::ValidationError(format!("season: unknown code {}", self.season)))?;
        Ok(LoadQuery {
            quantities: self.quantities(),
            hour: self.hour,
            day_of_week: self.day_of_week,
            month: self.month,
            is_weekend: self.is_weekend == 1,
            season,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: f64,
}

/// POST /predict
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let Json(request) = payload?;
    request.validate()?;

    let predictor = match state.model.as_ref() {
        ModelSlot::Ready(predictor) => predictor,
        ModelSlot::Unavailable(reason) => return Err(ApiError::ModelUnavailable(reason.clone())),
    };

    let prediction = predictor.predict(&request.to_query()?)?;
    debug!(prediction, hour = request.hour, season = request.season, "prediction served");
    Ok(Json(PredictionResponse { prediction }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> PredictionRequest {
        PredictionRequest {
            generation_biomass: 400.0,
            generation_fossil_brown_coal_lignite: 300.0,
            generation_fossil_coal_derived_gas: 0.0,
            generation_fossil_gas: 5000.0,
            generation_fossil_hard_coal: 4000.0,
            generation_fossil_oil: 200.0,
            generation_geothermal: 0.0,
            generation_hydro_pumped_storage_consumption: 500.0,
            generation_hydro_run_of_river_and_poundage: 1000.0,
            generation_hydro_water_reservoir: 3000.0,
            generation_solar: 1500.0,
            generation_wind_onshore: 6000.0,
            forecast_solar_day_ahead: 1400.0,
            forecast_wind_onshore_day_ahead: 5800.0,
            total_load_forecast: 26000.0,
            hour: 15,
            day_of_week: 2,
            month: 12,
            is_weekend: 0,
            season: 3,
        }
    }

    #[test]
    fn test_reference_record_is_valid() {
        assert!(reference().validate().is_ok());
        let query = reference().to_query().unwrap();
        assert_eq!(query.season, Season::Winter);
        assert!(!query.is_weekend);
        assert_eq!(query.quantities.len(), 15);
        assert!(query
            .quantities
            .contains(&("generation fossil brown coal/lignite".to_string(), 300.0)));
    }

    #[test]
    fn test_out_of_range_fields_rejected() {
        let mut request = reference();
        request.hour = 24;
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("hour"));

        let mut request = reference();
        request.season = 4;
        assert!(request.validate().is_err());

        let mut request = reference();
        request.generation_solar = -1.0;
        assert!(request.validate().is_err());

        let mut request = reference();
        request.total_load_forecast = 60000.0;
        assert!(request.validate().is_ok());
    }
}
