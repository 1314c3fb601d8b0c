use opal_domain::config::Config;

#[test]
fn default_config_enables_skills_but_not_sub_agents() {
    let config = Config::default();
    assert!(config.features.skills);
    assert!(!config.features.sub_agents);
    assert!(!config.features.mcp);
}

#[test]
fn explicit_toml_overrides_nested_defaults() {
    let toml_str = r#"
[compaction]
auto_compact_threshold = 0.9

[retry]
max_attempts = 3
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.compaction.auto_compact_threshold, 0.9);
    assert_eq!(config.retry.max_attempts, 3);
    // Untouched sections still fall back to their own defaults.
    assert_eq!(config.retry.base_delay_ms, 1000);
}
