use crate::{
    config::{CaConfig, NetworkMode},
    paths::CaPaths,
};
use eyre::Context as _;
use std::{fs, path::PathBuf};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

/// Apply environment variable overrides to the config (network selection and API URLs).
fn apply_env_overrides(cfg: &mut CaConfig) {
    /// Helper: if an env var is set and non-empty, apply `setter` with the trimmed value.
    fn apply_env(var: &str, setter: impl FnOnce(&str)) {
        if let Ok(u) = std::env::var(var) {
            let t = u.trim();
            if !t.is_empty() {
                setter(t);
            }
        }
    }

    apply_env("CAWALLET_NETWORK", |v| {
        if let Some(m) = NetworkMode::parse(v) {
            cfg.network_mode = m;
        }
    });
    apply_env("CAWALLET_API_URL_MAINNET", |v| {
        v.clone_into(&mut cfg.api.mainnet_base_url);
    });
    apply_env("CAWALLET_API_URL_TESTNET", |v| {
        v.clone_into(&mut cfg.api.testnet_base_url);
    });
}

impl ConfigStore {
    pub fn new(paths: &CaPaths) -> Self {
        Self {
            path: paths.config_file.clone(),
        }
    }

    pub fn load_or_init_default(&self) -> eyre::Result<CaConfig> {
        if !self.path.exists() {
            // Persist pristine defaults; env overrides stay runtime-only.
            let mut cfg = CaConfig::default();
            self.save(&cfg)?;
            apply_env_overrides(&mut cfg);
            return Ok(cfg);
        }

        let s = fs::read_to_string(&self.path).context("read config.toml")?;
        let mut cfg: CaConfig = toml::from_str(&s).context("parse config.toml")?;
        cfg.polling.validate()?;
        apply_env_overrides(&mut cfg);
        Ok(cfg)
    }

    pub fn save(&self, cfg: &CaConfig) -> eyre::Result<()> {
        let s = toml::to_string_pretty(cfg).context("serialize config.toml")?;
        crate::fsutil::write_private_atomic(&self.path, s.as_bytes())
            .context("write config.toml")?;
        Ok(())
    }
}
