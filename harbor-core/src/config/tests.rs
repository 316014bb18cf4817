#[cfg(test)]
mod tests {
    use crate::config::model::*;

    #[test]
    fn test_default_settings() {
        let settings = RouterSettings::default();
        assert!(settings.memory_cache_enabled);
        assert_eq!(settings.sync_interval_seconds, 600);
        assert_eq!(settings.expiration_scan_interval_seconds, 300);
        assert!(settings.auto_groups.is_empty());
        assert!(!settings.automatic_disable_enabled);
        assert!(!settings.automatic_enable_enabled);
        assert!(!settings.disable_keywords.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config: RouterConfig = toml::from_str(
            r#"
            [settings]
            sync_interval_seconds = 60
            auto_groups = ["vip", "default"]
            automatic_disable_enabled = true
            automatic_enable_enabled = true

            [model_mapping]
            equivalents = [["gpt-3.5-turbo", "gpt-3.5-turbo-16k"]]
            "gpt-4" = ["gpt-4-turbo", "gpt-4-32k"]
            "claude-2" = ["claude-2-100k"]
            "#,
        )
        .unwrap();

        assert_eq!(config.settings.sync_interval_seconds, 60);
        assert_eq!(config.settings.auto_groups, vec!["vip", "default"]);
        assert!(config.settings.automatic_disable_enabled);

        // equivalents 之外的顶层键都归入单向映射
        assert_eq!(config.model_mapping.equivalents.len(), 1);
        assert_eq!(config.model_mapping.one_way.len(), 2);
        assert_eq!(
            config.model_mapping.one_way["gpt-4"],
            vec!["gpt-4-turbo", "gpt-4-32k"]
        );
        assert_eq!(config.model_mapping.one_way["claude-2"], vec!["claude-2-100k"]);
    }

    #[test]
    fn test_parse_empty_config() {
        let config: RouterConfig = toml::from_str("").unwrap();
        assert!(config.model_mapping.is_empty());
        assert!(config.settings.memory_cache_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_model_mapping_json_shape() {
        // 与配置中心下发的 JSON 形态保持一致
        let mapping: GlobalModelMapping = serde_json::from_str(
            r#"{
                "equivalents": [["a", "b"], ["c", "d"]],
                "gpt-4": ["gpt-4-turbo"]
            }"#,
        )
        .unwrap();
        assert_eq!(mapping.equivalents.len(), 2);
        assert_eq!(mapping.one_way["gpt-4"], vec!["gpt-4-turbo"]);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = RouterConfig::default();
        config.settings.sync_interval_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_auto_in_auto_groups() {
        let mut config = RouterConfig::default();
        config.settings.auto_groups = vec!["auto".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_keyword() {
        let mut config = RouterConfig::default();
        config.settings.disable_keywords = vec![String::new()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_mapping_names() {
        let mut config = RouterConfig::default();
        config
            .model_mapping
            .one_way
            .insert("gpt-4".to_string(), vec![String::new()]);
        assert!(config.validate().is_err());

        let mut config = RouterConfig::default();
        config.model_mapping.equivalents = vec![vec!["a".to_string(), String::new()]];
        assert!(config.validate().is_err());
    }
}
