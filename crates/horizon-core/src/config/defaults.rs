//! Default configuration values

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "horizon.yaml";

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "horizon.toml";

/// Alternative configuration file name
pub const ALT_CONFIG_FILE: &str = ".horizon.yaml";

/// Name given to a horizon that does not declare one
pub const DEFAULT_HORIZON_NAME: &str = "cacheHorizon";

/// Suffix appended to a horizon name to form its gate task name
pub const GATE_TASK_SUFFIX: &str = "IsCached";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_YAML,
        DEFAULT_CONFIG_TOML,
        ALT_CONFIG_FILE,
        ".horizon.toml",
    ]
}

/// Gate task name for a horizon
pub fn gate_task_name(horizon: &str) -> String {
    format!("{}{}", horizon, GATE_TASK_SUFFIX)
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Horizon Configuration

tasks:
  concurrency: 4
  cache:
    enabled: true
    dir: .horizon/cache
  history:
    dir: .horizon/history

packages:
  app:
    tasks:
      compile:
        command: make compile
        inputs: ["src/**/*.c"]
        outputs: ["build/*.o"]
      link:
        command: make link
        depends_on: [compile]
        inputs: ["build/*.o"]
        outputs: ["build/app"]

horizons:
  - name: assemble
    package: app
    members: [compile, link]
    inputs: ["src/**/*.c"]
    outputs: ["build/app"]
"#;
