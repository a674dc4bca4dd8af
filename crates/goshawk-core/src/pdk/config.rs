use std::{
    collections::HashMap,
    fmt::Display,
    path::Path,
    str::FromStr,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result, bail};
use thiserror::Error;
use tokio::sync::watch;

/// Per module configuration
#[derive(Debug, Clone, Default)]
pub struct ModuleConfig {
    inner: HashMap<String, String>,
}

#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("field {field} is required")]
    RequiredValue { field: String },
    #[error("{value} is not a valid value for field {field}: {err}")]
    InvalidValue {
        field: String,
        value: String,
        err: String,
    },
}

impl ModuleConfig {
    /// Inserts a new configuration value.
    pub fn insert(&mut self, key: String, value: String) -> Option<String> {
        self.inner.insert(key, value)
    }

    /// Returns an option of raw configuration value.
    pub fn get_raw(&self, config_name: &str) -> Option<&str> {
        self.inner.get(config_name).map(String::as_str)
    }

    /// Returns a typed configuration value.
    pub fn required<T>(&self, config_name: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        match self.inner.get(config_name) {
            None => Err(ConfigError::RequiredValue {
                field: config_name.to_string(),
            }),
            Some(value) => parse(value, config_name),
        }
    }

    /// Returns a typed configuration value, falling back to the given default
    /// when the field is missing.
    pub fn with_default<T>(&self, config_name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        match self.inner.get(config_name) {
            None => Ok(default),
            Some(value) => parse(value, config_name),
        }
    }

    /// Return a comma separated list of values. Return empty vector if field is missing.
    pub fn get_list<T>(&self, config_name: &str) -> Result<Vec<T>, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        self.inner
            .get(config_name)
            .iter()
            .flat_map(|config| config.split(','))
            .filter(|item| !item.is_empty())
            .map(|item| parse(item.trim(), config_name))
            .collect()
    }

    /// Return a comma separated list of values. Return default vector if field is missing.
    pub fn get_list_with_default<T>(
        &self,
        config_name: &str,
        default: Vec<T>,
    ) -> Result<Vec<T>, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        if self.inner.contains_key(config_name) {
            self.get_list(config_name)
        } else {
            Ok(default)
        }
    }
}

fn parse<T>(value: &str, config_name: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    <T as FromStr>::Err: Display,
{
    T::from_str(value).map_err(|err| ConfigError::InvalidValue {
        field: config_name.to_string(),
        value: value.to_string(),
        err: err.to_string(),
    })
}

/// Global agent configuration manager. Contains configuration for all the
/// modules, one INI section per module.
///
/// It is backed by an `INI` file from which parses the data on its creation.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    inner: Arc<Mutex<AgentConfigInternal>>,
}

#[derive(Debug)]
struct AgentConfigInternal {
    configs: HashMap<String, watch::Sender<ModuleConfig>>,
}

impl AgentConfig {
    /// Construct a new [`AgentConfig`] from a configuration file.
    pub fn from_file(config_file: impl AsRef<Path>) -> Result<Self> {
        let config_file = config_file.as_ref().to_path_buf();
        if !config_file.exists() {
            bail!("Configuration file {} not found", config_file.display());
        }

        let mut configs: HashMap<String, ModuleConfig> = HashMap::new();

        let conf = ini::Ini::load_from_file(&config_file)
            .with_context(|| format!("Error loading configuration from {config_file:?}"))?;

        for (section, prop) in &conf {
            if let Some(section) = section {
                let mod_config = configs.entry(section.to_string()).or_default();
                for (key, value) in prop.iter() {
                    log::debug!("{}.{}={}", section, key, value);
                    mod_config.insert(key.to_string(), value.to_string());
                }
            }
        }

        let configs: HashMap<_, _> = configs
            .into_iter()
            .map(|(module_name, cfg)| {
                let (tx, _) = watch::channel(cfg);
                (module_name, tx)
            })
            .collect();

        Ok(Self {
            inner: Arc::new(Mutex::new(AgentConfigInternal { configs })),
        })
    }

    /// Get [`watch::Receiver`] of a module configuration. This is intended to
    /// be used by modules which want to follow configuration updates.
    pub fn get_watched_module_config(&self, module: &str) -> watch::Receiver<ModuleConfig> {
        self.inner
            .lock()
            .unwrap()
            .configs
            .entry(module.to_string())
            .or_insert_with(|| {
                let (tx, _) = watch::channel(ModuleConfig::default());
                tx
            })
            .subscribe()
    }

    /// Get module configuration. This is intended to be used when a single access is enough.
    pub fn get_module_config(&self, module: &str) -> Option<ModuleConfig> {
        self.inner
            .lock()
            .unwrap()
            .configs
            .get(module)
            .map(|watch_sender| watch_sender.borrow().clone())
    }

    /// Update module configuration. It takes a key and value. Watchers of the
    /// module section observe the new value.
    pub fn update_config(&self, module: &str, key: &str, value: &str) {
        let mut update_ctx = self.inner.lock().unwrap();

        let sender_mod_config = update_ctx
            .configs
            .entry(module.to_string())
            .or_insert_with(|| {
                let (tx, _) = watch::channel(ModuleConfig::default());
                tx
            });

        let mut mod_config = sender_mod_config.borrow().clone();
        mod_config.insert(key.to_string(), value.to_string());
        sender_mod_config.send_replace(mod_config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        let mut config = ModuleConfig::default();
        config.insert("enabled".to_string(), "true".to_string());
        config.insert("codes".to_string(), "4, 11,38".to_string());

        assert_eq!(config.with_default("enabled", false).unwrap(), true);
        assert_eq!(config.with_default("missing", 7u32).unwrap(), 7);
        assert_eq!(config.get_list::<i64>("codes").unwrap(), vec![4, 11, 38]);
        assert!(config.get_list::<i64>("missing").unwrap().is_empty());
        assert!(config.required::<u32>("missing").is_err());
        assert!(config.with_default("enabled", 0u32).is_err());
    }

    #[test]
    fn ini_sections_become_module_configs() {
        let dir = std::env::temp_dir().join("goshawk-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("agent.ini");
        std::fs::write(
            &file,
            "[ownership-monitor]\nchown_policy = accept\nignored_retvals = 4, 11\n",
        )
        .unwrap();

        let config = AgentConfig::from_file(&file).unwrap();
        let module = config.get_module_config("ownership-monitor").unwrap();
        assert_eq!(module.get_raw("chown_policy"), Some("accept"));
        assert!(config.get_module_config("other-module").is_none());

        let mut watched = config.get_watched_module_config("ownership-monitor");
        config.update_config("ownership-monitor", "chown_policy", "discard");
        assert!(watched.has_changed().unwrap());
        assert_eq!(
            watched.borrow_and_update().get_raw("chown_policy"),
            Some("discard")
        );
    }
}
