//! Optional TOML file overriding engine capacities and level timings.

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use fsm_relay_core::EngineConfig;
use fsm_relay_system_level_flow::LevelConfig;
use serde::Deserialize;

/// Contents of a simulation configuration file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SimulationConfig {
    /// Capacities of the engine tables.
    pub(crate) engine: EngineConfig,
    /// Timings of the scripted level.
    pub(crate) level: LevelConfig,
}

/// Loads the file at `path`, or the defaults when no path is given.
pub(crate) fn load(path: Option<&Path>) -> Result<SimulationConfig> {
    let Some(path) = path else {
        return Ok(SimulationConfig::default());
    };
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read simulation config at {}", path.display()))?;
    parse(&contents).with_context(|| format!("invalid simulation config at {}", path.display()))
}

fn parse(contents: &str) -> Result<SimulationConfig> {
    let config: SimulationConfig =
        toml::from_str(contents).context("failed to parse simulation config toml contents")?;
    if config.level.flash_count < 0 {
        bail!(
            "level.flash_count must not be negative, got {}",
            config.level.flash_count
        );
    }
    if config.engine.timer_count == 0 {
        bail!("engine.timer_count must provide at least the primary timer");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_yields_defaults() {
        let config = load(None).expect("defaults");
        assert_eq!(config, SimulationConfig::default());
        assert_eq!(config.engine.pool_capacity, 5000);
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let config = parse(
            r#"
            [engine]
            pool_capacity = 64

            [level]
            ready_delay = 250
            ghost_count = 2
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.engine.pool_capacity, 64);
        assert_eq!(config.engine.entity_capacity, 100);
        assert_eq!(config.level.ready_delay, 250);
        assert_eq!(config.level.ghost_count, 2);
        assert_eq!(config.level.flash_count, LevelConfig::default().flash_count);
    }

    #[test]
    fn unknown_tables_are_rejected() {
        assert!(parse("[render]\nscale = 2\n").is_err());
    }

    #[test]
    fn negative_flash_count_is_rejected() {
        let err = parse("[level]\nflash_count = -1\n").expect_err("negative count");
        assert!(err.to_string().contains("flash_count"));
    }

    #[test]
    fn unreadable_file_reports_its_path() {
        let err = load(Some(Path::new("/nonexistent/fsm-relay.toml"))).expect_err("missing file");
        assert!(format!("{err:#}").contains("/nonexistent/fsm-relay.toml"));
    }
}
