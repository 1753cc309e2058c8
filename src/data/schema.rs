//! Declared column schemas of the two source datasets.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Timestamp,
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub required: bool,
    /// Raw values must be >= 0 (generation quantities).
    pub non_negative: bool,
}

const fn timestamp(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        kind: ColumnKind::Timestamp,
        required: true,
        non_negative: false,
    }
}

const fn numeric(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        kind: ColumnKind::Numeric,
        required: false,
        non_negative: false,
    }
}

const fn quantity(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        kind: ColumnKind::Numeric,
        required: false,
        non_negative: true,
    }
}

const fn required_numeric(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        kind: ColumnKind::Numeric,
        required: true,
        non_negative: false,
    }
}

const fn categorical(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        kind: ColumnKind::Categorical,
        required: false,
        non_negative: false,
    }
}

#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    pub timestamp_column: &'static str,
    pub columns: &'static [ColumnSpec],
}

impl Schema {
    pub fn spec(&self, column: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == column)
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.required)
    }
}

pub const TARGET_COLUMN: &str = "total load actual";
pub const PRICE_COLUMN: &str = "price actual";

pub static ENERGY_SCHEMA: Schema = Schema {
    name: "energy",
    timestamp_column: "time",
    columns: &[
        timestamp("time"),
        quantity("generation biomass"),
        quantity("generation fossil brown coal/lignite"),
        quantity("generation fossil coal-derived gas"),
        quantity("generation fossil gas"),
        quantity("generation fossil hard coal"),
        quantity("generation fossil oil"),
        quantity("generation fossil oil shale"),
        quantity("generation fossil peat"),
        quantity("generation geothermal"),
        quantity("generation hydro pumped storage aggregated"),
        quantity("generation hydro pumped storage consumption"),
        quantity("generation hydro run-of-river and poundage"),
        quantity("generation hydro water reservoir"),
        quantity("generation marine"),
        quantity("generation nuclear"),
        quantity("generation other"),
        quantity("generation other renewable"),
        quantity("generation solar"),
        quantity("generation waste"),
        quantity("generation wind offshore"),
        quantity("generation wind onshore"),
        quantity("forecast solar day ahead"),
        quantity("forecast wind offshore eday ahead"),
        quantity("forecast wind onshore day ahead"),
        quantity("total load forecast"),
        required_numeric(TARGET_COLUMN),
        numeric("price day ahead"),
        numeric(PRICE_COLUMN),
    ],
};

pub static WEATHER_SCHEMA: Schema = Schema {
    name: "weather",
    timestamp_column: "dt_iso",
    columns: &[
        timestamp("dt_iso"),
        categorical("city_name"),
        numeric("temp"),
        numeric("temp_min"),
        numeric("temp_max"),
        numeric("pressure"),
        numeric("humidity"),
        numeric("wind_speed"),
        numeric("wind_deg"),
        quantity("rain_1h"),
        quantity("rain_3h"),
        quantity("snow_3h"),
        numeric("clouds_all"),
        numeric("weather_id"),
        categorical("weather_main"),
        categorical("weather_description"),
        categorical("weather_icon"),
    ],
};

/// The two source datasets and their file naming at each pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Energy,
    Weather,
}

impl Dataset {
    pub const ALL: [Dataset; 2] = [Dataset::Energy, Dataset::Weather];

    pub fn schema(self) -> &'static Schema {
        match self {
            Dataset::Energy => &ENERGY_SCHEMA,
            Dataset::Weather => &WEATHER_SCHEMA,
        }
    }

    pub fn name(self) -> &'static str {
        self.schema().name
    }

    pub fn raw_file(self) -> &'static str {
        match self {
            Dataset::Energy => "energy_dataset.csv",
            Dataset::Weather => "weather_features.csv",
        }
    }

    pub fn processed_file(self) -> &'static str {
        match self {
            Dataset::Energy => "processed_energy_data.csv",
            Dataset::Weather => "processed_weather_data.csv",
        }
    }

    pub fn final_file(self) -> &'static str {
        match self {
            Dataset::Energy => "final_energy_data.csv",
            Dataset::Weather => "final_weather_data.csv",
        }
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_schema_requirements() {
        let required: Vec<&str> = ENERGY_SCHEMA.required_columns().map(|c| c.name).collect();
        assert_eq!(required, vec!["time", TARGET_COLUMN]);
        assert!(ENERGY_SCHEMA.spec("generation solar").unwrap().non_negative);
        assert!(!ENERGY_SCHEMA.spec(PRICE_COLUMN).unwrap().non_negative);
    }

    #[test]
    fn test_generation_columns_declared() {
        let generation = ENERGY_SCHEMA
            .columns
            .iter()
            .filter(|c| c.name.contains("generation"))
            .count();
        assert_eq!(generation, 21);
    }

    #[test]
    fn test_dataset_file_names() {
        assert_eq!(Dataset::Energy.raw_file(), "energy_dataset.csv");
        assert_eq!(Dataset::Weather.final_file(), "final_weather_data.csv");
        assert_eq!(Dataset::Weather.schema().timestamp_column, "dt_iso");
        assert_eq!(Dataset::Energy.to_string(), "energy");
    }
}
