use std::path::{Path, PathBuf};
use std::str::FromStr;

use livecheck_core::EvaluatorSettings;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Effective configuration: defaults, then the TOML file, then `LIVECHECK_*`
/// environment overrides.
pub struct Config {
    pub settings: EvaluatorSettings,
    /// TOML file the settings were read from, if any.
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load from `path`, falling back to `LIVECHECK_CONFIG`, then defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let source = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("LIVECHECK_CONFIG").ok().map(PathBuf::from));

        let mut settings = match &source {
            Some(p) => from_file(p)?,
            None => EvaluatorSettings::default(),
        };
        apply_env(&mut settings, |key| std::env::var(key).ok());

        Ok(Self { settings, source })
    }
}

fn from_file(path: &Path) -> Result<EvaluatorSettings, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply `LIVECHECK_*` overrides read through `lookup`.
fn apply_env(settings: &mut EvaluatorSettings, lookup: impl Fn(&str) -> Option<String>) {
    let challenge = &mut settings.challenge;
    override_from(&lookup, "LIVECHECK_TIME_BUDGET_SECS", &mut challenge.time_budget_secs);
    override_from(&lookup, "LIVECHECK_TIMEOUT_POLICY", &mut challenge.timeout_policy);
    override_from(&lookup, "LIVECHECK_CHALLENGE_MODE", &mut challenge.mode);

    let motion = &mut settings.motion;
    override_from(&lookup, "LIVECHECK_MOTION_WINDOW", &mut motion.window);
    override_from(&lookup, "LIVECHECK_MIN_MOTION", &mut motion.min_mean_displacement);
}

/// Replace `target` with the parsed value of `key`. Unparsable values are
/// logged and ignored.
fn override_from<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable environment override"),
    }
}
