use crate::config::model::RouterConfig;

pub fn load_config() -> Result<RouterConfig, anyhow::Error> {
    load_config_from_path("config.toml")
}

pub fn load_config_from_path(config_path: &str) -> Result<RouterConfig, anyhow::Error> {
    let config_str = std::fs::read_to_string(config_path)?;
    let config: RouterConfig = toml::from_str(&config_str)?;
    config.validate()?;
    Ok(config)
}
