use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Locations of the input CSVs.
///
/// Stored as a JSON file on disk; relative paths are resolved against the
/// directory containing it:
/// ```json
/// {
///   "shelter": ["shelter_2021.csv", "shelter_2022.csv"],
///   "crime": "major_crime_indicators.csv.gz",
///   "neighbourhoods": "shelter_neighbourhoods.csv",
///   "weather": "weather_daily.csv",
///   "cpi": "cpi_monthly.csv",
///   "unemployment": "unemployment_monthly.csv"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub shelter: Vec<PathBuf>,
    pub crime: PathBuf,
    pub neighbourhoods: PathBuf,
    pub weather: PathBuf,
    pub cpi: PathBuf,
    pub unemployment: PathBuf,
}

impl SourcesConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read sources file {}", path.display()))?;
        let config: SourcesConfig = serde_json::from_str(&content)
            .with_context(|| format!("invalid sources file {}", path.display()))?;

        let base = path.parent().unwrap_or(Path::new("."));
        Ok(config.resolve(base))
    }

    /// Makes every relative path relative to `base`.
    pub fn resolve(self, base: &Path) -> Self {
        let join = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };
        Self {
            shelter: self.shelter.into_iter().map(join).collect(),
            crime: join(self.crime),
            neighbourhoods: join(self.neighbourhoods),
            weather: join(self.weather),
            cpi: join(self.cpi),
            unemployment: join(self.unemployment),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = env::temp_dir().join("shelter_model_config_test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sources.json");
        fs::write(
            &path,
            r#"{
                "shelter": ["a.csv", "/abs/b.csv"],
                "crime": "crime.csv",
                "neighbourhoods": "map.csv",
                "weather": "weather.csv",
                "cpi": "cpi.csv",
                "unemployment": "unemployment.csv"
            }"#,
        )
        .unwrap();

        let config = SourcesConfig::load(&path).unwrap();
        assert_eq!(config.shelter[0], dir.join("a.csv"));
        assert_eq!(config.shelter[1], PathBuf::from("/abs/b.csv"));
        assert_eq!(config.crime, dir.join("crime.csv"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_rejects_missing_field() {
        let path = env::temp_dir().join("shelter_model_config_bad.json");
        fs::write(&path, r#"{"shelter": []}"#).unwrap();

        assert!(SourcesConfig::load(&path).is_err());
        fs::remove_file(&path).unwrap();
    }
}
