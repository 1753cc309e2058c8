#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::Path;

use chrono::{Datelike, Duration, TimeZone, Timelike, Utc};
use energy_load_forecaster::config::Config;
use energy_load_forecaster::features::Season;
use energy_load_forecaster::ml::LoadQuery;
use energy_load_forecaster::pipeline;
use energy_load_forecaster::tracking::Trackers;
use tempfile::TempDir;

pub const HOURS: i64 = 14 * 24;
/// Line index (0-based data row) carrying a negative generation value.
pub const BAD_ROW: i64 = 100;

const ENERGY_HEADER: &str = "time,generation biomass,generation fossil gas,generation fossil hard coal,\
generation solar,generation wind onshore,forecast solar day ahead,forecast wind onshore day ahead,\
total load forecast,total load actual,price actual";

fn daily_profile(hour: u32) -> f64 {
    [0.0, -400.0, -700.0, -800.0, -700.0, -300.0, 400.0, 1200.0, 1800.0, 2100.0, 2200.0, 2300.0,
     2400.0, 2300.0, 2100.0, 2000.0, 2100.0, 2400.0, 2800.0, 3000.0, 2600.0, 1900.0, 1000.0, 400.0][hour as usize]
}

/// Two weeks of hourly grid records with a daily load cycle and a weekend dip.
pub fn energy_csv() -> String {
    let start = Utc.with_ymd_and_hms(2015, 1, 5, 0, 0, 0).unwrap();
    let mut out = String::from(ENERGY_HEADER);
    out.push('\n');
    for t in 0..HOURS {
        let ts = start + Duration::hours(t);
        let weekend = ts.weekday().num_days_from_monday() >= 5;
        let load = 25000.0 + daily_profile(ts.hour()) - if weekend { 2500.0 } else { 0.0 };
        let solar = if (8..18).contains(&ts.hour()) { 600.0 + 50.0 * ts.hour() as f64 } else { 0.0 };
        let wind = 4000.0 + ((t * 37) % 11) as f64 * 150.0;
        let gas = load * 0.3;
        let coal = load * 0.2;
        let solar_cell = if t == BAD_ROW { "-5".to_string() } else { format!("{}", solar) };
        let biomass = if t % 29 == 3 { String::new() } else { "400".to_string() };
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{}",
            ts.format("%Y-%m-%d %H:%M:%S%:z"),
            biomass,
            gas,
            coal,
            solar_cell,
            wind,
            solar * 0.95,
            wind * 0.97,
            load + 150.0,
            load,
            45.0 + (ts.hour() as f64) * 0.5,
        )
        .unwrap();
    }
    out
}

pub fn weather_csv() -> String {
    let start = Utc.with_ymd_and_hms(2015, 1, 5, 0, 0, 0).unwrap();
    let mut out = String::from("dt_iso,city_name,temp,humidity,wind_speed,weather_main\n");
    for t in 0..HOURS {
        let ts = start + Duration::hours(t);
        let city = if t % 2 == 0 { "Valencia" } else { "Madrid" };
        let main = ["clear", "clouds", "rain"][(t % 3) as usize];
        writeln!(
            out,
            "{},{},{},{},{},{}",
            ts.format("%Y-%m-%d %H:%M:%S%:z"),
            city,
            275.0 + (ts.hour() as f64) * 0.4,
            60 + (t % 20),
            (t % 7) as f64 * 0.5,
            main,
        )
        .unwrap();
    }
    out
}

pub fn write_raw_data(raw_dir: &Path) {
    std::fs::create_dir_all(raw_dir).unwrap();
    std::fs::write(raw_dir.join("energy_dataset.csv"), energy_csv()).unwrap();
    std::fs::write(raw_dir.join("weather_features.csv"), weather_csv()).unwrap();
}

/// Defaults with every path under `root` and small search grids.
pub fn test_config(root: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.paths.raw_dir = root.join("data/raw");
    cfg.paths.processed_dir = root.join("data/processed");
    cfg.paths.encoders_dir = root.join("encoders");
    cfg.paths.models_dir = root.join("models");

    cfg.training.forest_grid.n_trees = vec![5, 10];
    cfg.training.forest_grid.max_depth = vec![6];
    cfg.training.forest_grid.min_samples_split = vec![2];
    cfg.training.boosting_grid.n_estimators = vec![10];
    cfg.training.boosting_grid.learning_rate = vec![0.1];
    cfg.training.boosting_grid.max_depth = vec![3];
    cfg
}

/// Raw data written, engineered, preprocessed and trained.
pub fn trained_workspace() -> (TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    write_raw_data(&cfg.paths.raw_dir);

    pipeline::engineer(&cfg).unwrap();
    pipeline::preprocess(&cfg).unwrap();
    pipeline::train(&cfg, &Trackers::from_config(&cfg)).unwrap();
    (dir, cfg)
}

pub fn reference_query() -> LoadQuery {
    LoadQuery {
        quantities: vec![
            ("generation biomass".to_string(), 400.0),
            ("generation fossil gas".to_string(), 5000.0),
            ("generation fossil hard coal".to_string(), 4000.0),
            ("generation solar".to_string(), 1500.0),
            ("generation wind onshore".to_string(), 6000.0),
            ("forecast solar day ahead".to_string(), 1400.0),
            ("forecast wind onshore day ahead".to_string(), 5800.0),
            ("total load forecast".to_string(), 26000.0),
        ],
        hour: 15,
        day_of_week: 2,
        month: 12,
        is_weekend: false,
        season: Season::Winter,
    }
}

pub fn reference_request() -> serde_json::Value {
    serde_json::json!({
        "generation_biomass": 400.0,
        "generation_fossil_brown_coal_lignite": 300.0,
        "generation_fossil_coal_derived_gas": 0.0,
        "generation_fossil_gas": 5000.0,
        "generation_fossil_hard_coal": 4000.0,
        "generation_fossil_oil": 200.0,
        "generation_geothermal": 0.0,
        "generation_hydro_pumped_storage_consumption": 500.0,
        "generation_hydro_run_of_river_and_poundage": 1000.0,
        "generation_hydro_water_reservoir": 3000.0,
        "generation_solar": 1500.0,
        "generation_wind_onshore": 6000.0,
        "forecast_solar_day_ahead": 1400.0,
        "forecast_wind_onshore_day_ahead": 5800.0,
        "total_load_forecast": 26000.0,
        "hour": 15,
        "day_of_week": 2,
        "month": 12,
        "is_weekend": 0,
        "season": 3
    })
}
