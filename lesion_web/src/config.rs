use lesion_prediction::config::{ModelConfig, Validatable};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    #[serde(default)]
    pub uploads: UploadConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

fn default_max_upload_mb() -> usize {
    16
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("static/uploads")
}

fn default_url_prefix() -> String {
    "/static/uploads".to_string()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            url_prefix: default_url_prefix(),
        }
    }
}

impl UploadConfig {
    pub fn validate(&self) -> Result<(), String> {
        let prefix = self.url_prefix.trim_end_matches('/');
        if !prefix.starts_with('/') || prefix.len() < 2 {
            return Err(format!(
                "uploads.url_prefix must be an absolute path below the root, got {:?}",
                self.url_prefix
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("LESION")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;
    validate(&config).map_err(config::ConfigError::Message)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<(), String> {
    config.model.validate()?;
    config.uploads.validate()?;
    if config.server.max_upload_mb == 0 {
        return Err("server.max_upload_mb must be at least 1".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_yaml(yaml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = from_yaml(
            r#"
server:
  host: 127.0.0.1
  port: 5000
log_level: INFO
"#,
        );

        assert_eq!(config.server.get_address(), "127.0.0.1:5000");
        assert_eq!(config.server.max_upload_bytes(), 16 * 1024 * 1024);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.uploads.dir, PathBuf::from("static/uploads"));
        assert_eq!(config.uploads.url_prefix, "/static/uploads");
        assert_eq!(
            config.model.model_id,
            "Jayanth2002/dinov2-base-finetuned-SkinDisease"
        );
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_model_section_overrides() {
        let config = from_yaml(
            r#"
server:
  host: 0.0.0.0
  port: 8080
log_level: debug
model:
  model_id: acme/lesion-vit
  onnx_file: onnx/model.onnx
  allow_download: false
  num_instances: 2
"#,
        );

        assert_eq!(config.model.model_id, "acme/lesion-vit");
        assert_eq!(config.model.onnx_file, "onnx/model.onnx");
        assert!(!config.model.allow_download);
        assert_eq!(config.model.num_instances, 2);
        assert_eq!(config.model.input_name, "pixel_values");
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        let result = config::Config::builder()
            .add_source(config::File::from_str(
                "server:\n  host: a\n  port: 1\nlog_level: trace\n",
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize::<Config>();

        assert!(result.is_err());
    }

    #[test]
    fn test_root_url_prefix_is_rejected() {
        let uploads = UploadConfig {
            url_prefix: "/".to_string(),
            ..UploadConfig::default()
        };

        assert!(uploads.validate().is_err());
    }
}
