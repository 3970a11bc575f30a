use crate::ingest::*;

/// The ingestion settings, as read from the JSON configuration file.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    #[serde(rename = "minSchemaVersion")]
    pub min_schema_version: Option<u32>,
    #[serde(rename = "legacyEnabled")]
    pub legacy_enabled: Option<bool>,
}

/// The settings after the command line flags have been applied.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct IngestSettings {
    /// Only needed to write sheets.
    pub output_directory: Option<PathBuf>,
    pub min_schema_version: u32,
    pub legacy_enabled: bool,
}

impl IngestSettings {
    pub fn new(output_directory: Option<PathBuf>) -> IngestSettings {
        IngestSettings {
            output_directory,
            min_schema_version: MIN_SCHEMA_VERSION,
            legacy_enabled: true,
        }
    }
}

pub fn read_config(path: &str) -> IngestResult<IngestConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read_config: {:?}", contents);
    let config: IngestConfig = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    Ok(config)
}

/// Builds the settings from the optional configuration file and the
/// `--out` flag, which takes precedence. A relative `outputDirectory` is
/// resolved against the directory of the configuration file.
pub fn read_settings(config_path: Option<&str>, out: Option<&str>) -> IngestResult<IngestSettings> {
    let mut settings = IngestSettings::new(out.map(PathBuf::from));
    if let Some(path) = config_path {
        let config = read_config(path)?;
        info!("read_settings: config: {:?}", config);
        if settings.output_directory.is_none() {
            let root = Path::new(path).parent().unwrap_or_else(|| Path::new(""));
            settings.output_directory = config.output_directory.map(|d| root.join(d));
        }
        if let Some(v) = config.min_schema_version {
            ensure!(
                v >= MIN_SCHEMA_VERSION,
                MinSchemaVersionTooLowSnafu {
                    found: v,
                    min: MIN_SCHEMA_VERSION
                }
            );
            settings.min_schema_version = v;
        }
        if let Some(b) = config.legacy_enabled {
            settings.legacy_enabled = b;
        }
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let js = r#"{"outputDirectory": "sheets", "legacyEnabled": false}"#;
        let config: IngestConfig = serde_json::from_str(js).unwrap();
        assert_eq!(config.output_directory.as_deref(), Some("sheets"));
        assert_eq!(config.min_schema_version, None);
        assert_eq!(config.legacy_enabled, Some(false));

        let settings = read_settings(None, Some("/tmp/out")).unwrap();
        assert_eq!(settings.output_directory, Some(PathBuf::from("/tmp/out")));
        assert_eq!(settings.min_schema_version, 2);
        assert!(settings.legacy_enabled);
    }
}
