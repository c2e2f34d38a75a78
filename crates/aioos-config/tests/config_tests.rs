#[cfg(test)]
mod tests {
    use aioos_config::ConfigLoader;
    use aioos_config::schema::*;
    use std::io::Write;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_aioos_config_defaults() {
        let config = AioosConfig::default();
        assert_eq!(config.storage.db_path, std::path::PathBuf::from("./data/aioos.db"));
        assert_eq!(config.governance.default_permission_level, "execute_with_human");
        assert_eq!(config.identity.default_user, "demo-user-001");
    }

    #[test]
    fn test_governance_config_defaults() {
        let config = GovernanceConfig::default();
        assert_eq!(config.audit_default_limit, 100);
        assert_eq!(config.audit_max_limit, 500);
        assert_eq!(config.task_preview_chars, 100);
    }

    #[test]
    fn test_sweep_and_logging_defaults() {
        let sweep = SweepConfig::default();
        assert!(sweep.enabled);
        assert_eq!(sweep.interval_secs, 60);

        let logging = LoggingConfig::default();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, "pretty");
    }

    #[test]
    fn test_defaults_validate_cleanly() {
        let warnings = AioosConfig::default().validate().unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    // ── TOML tests ─────────────────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = AioosConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: AioosConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.storage.db_path, config.storage.db_path);
        assert_eq!(restored.sweep.interval_secs, config.sweep.interval_secs);
    }

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[governance]
default_permission_level = "advisory_only"

[sweep]
interval_secs = 5
"#;
        let config: AioosConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.governance.default_permission_level, "advisory_only");
        assert_eq!(config.sweep.interval_secs, 5);
        assert!(config.sweep.enabled);
        assert_eq!(config.governance.audit_max_limit, 500);
        assert_eq!(config.logging.format, "pretty");
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_unknown_permission_level_is_error() {
        let mut config = AioosConfig::default();
        config.governance.default_permission_level = "yolo".into();
        let err = config.validate().unwrap_err();
        assert!(err.contains("governance.default_permission_level"));
    }

    #[test]
    fn test_autonomous_default_is_warning() {
        let mut config = AioosConfig::default();
        config.governance.default_permission_level = "autonomous".into();
        let warnings = config.validate().unwrap();
        assert!(warnings
            .iter()
            .any(|w| w.severity == WarningSeverity::Warning
                && w.field == "governance.default_permission_level"));
    }

    #[test]
    fn test_zero_sweep_interval_is_error_only_when_enabled() {
        let mut config = AioosConfig::default();
        config.sweep.interval_secs = 0;
        assert!(config.validate().is_err());
        config.sweep.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_db_path_is_error() {
        let mut config = AioosConfig::default();
        config.storage.db_path = std::path::PathBuf::new();
        assert!(config.validate().unwrap_err().contains("storage.db_path"));
    }

    #[test]
    fn test_unknown_log_format_is_warning() {
        let mut config = AioosConfig::default();
        config.logging.format = "xml".into();
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].to_string().contains("logging.format"));
    }

    #[test]
    fn test_audit_limit_clamping() {
        let config = AioosConfig::default();
        assert_eq!(config.audit_limit(None), 100);
        assert_eq!(config.audit_limit(Some(10)), 10);
        assert_eq!(config.audit_limit(Some(0)), 1);
        assert_eq!(config.audit_limit(Some(10_000)), 500);
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("aioos.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            r#"
[storage]
db_path = "/var/lib/aioos/registry.db"

[governance]
audit_default_limit = 25

[logging]
format = "json"
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let config = loader.get();
        assert_eq!(
            config.storage.db_path,
            std::path::PathBuf::from("/var/lib/aioos/registry.db")
        );
        assert_eq!(config.governance.audit_default_limit, 25);
        assert_eq!(config.logging.format, "json");
        assert_eq!(loader.path(), config_path.as_path());
    }

    #[test]
    fn test_config_loader_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("aioos.toml");
        std::fs::write(
            &config_path,
            r#"
[governance]
default_permission_level = "root"
"#,
        )
        .unwrap();
        assert!(ConfigLoader::load(Some(config_path.as_path())).is_err());
    }

    #[test]
    fn test_config_loader_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("aioos.toml");
        std::fs::write(&config_path, "[storage\ndb_path = ").unwrap();
        let err = ConfigLoader::load(Some(config_path.as_path())).err().unwrap();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn test_config_loader_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("aioos.toml");

        std::fs::write(
            &config_path,
            r#"
[sweep]
interval_secs = 30
"#,
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.get().sweep.interval_secs, 30);

        std::fs::write(
            &config_path,
            r#"
[sweep]
interval_secs = 90
"#,
        )
        .unwrap();

        loader.reload().unwrap();
        assert_eq!(loader.get().sweep.interval_secs, 90);
    }

    #[test]
    fn test_config_loader_reload_keeps_config_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("aioos.toml");
        std::fs::write(&config_path, "[sweep]\ninterval_secs = 30\n").unwrap();
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();

        std::fs::write(&config_path, "[sweep]\ninterval_secs = 0\n").unwrap();
        assert!(loader.reload().is_err());
        assert_eq!(loader.get().sweep.interval_secs, 30);
    }

    #[test]
    fn test_from_config_shares_state() {
        let loader = ConfigLoader::from_config(AioosConfig::default());
        loader.shared().write().sweep.interval_secs = 7;
        assert_eq!(loader.get().sweep.interval_secs, 7);
    }

    // ── JSON roundtrip ─────────────────────────────────────────

    #[test]
    fn test_config_json_roundtrip() {
        let config = AioosConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: AioosConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.identity.default_user, config.identity.default_user);
    }
}
