use crate::config::NetworkMode;
use directories::BaseDirs;
use eyre::ContextCompat as _;
use std::path::PathBuf;

/// On-disk layout. Everything lives under one root so `CAWALLET_HOME` can relocate it.
///
/// ```text
/// <root>/config.toml
/// <root>/ca/<network>.keystore.json
/// <root>/data/cawallet.log.jsonl
/// <root>/data/cross_chain_journal.jsonl
/// ```
#[derive(Debug, Clone)]
pub struct CaPaths {
    pub root: PathBuf,
    pub keystore_dir: PathBuf,
    pub data_dir: PathBuf,
    pub config_file: PathBuf,
    pub log_file: PathBuf,
}

impl CaPaths {
    pub fn discover() -> eyre::Result<Self> {
        // Test/CI override knob.
        if let Ok(home) = std::env::var("CAWALLET_HOME") {
            let home = home.trim();
            if !home.is_empty() {
                return Ok(Self::at(PathBuf::from(home)));
            }
        }

        let base = BaseDirs::new().context("failed to resolve home directory")?;
        Ok(Self::at(base.home_dir().join(".cawallet")))
    }

    pub fn at(root: PathBuf) -> Self {
        let keystore_dir = root.join("ca");
        let data_dir = root.join("data");
        let config_file = root.join("config.toml");
        let log_file = data_dir.join("cawallet.log.jsonl");
        Self {
            root,
            keystore_dir,
            data_dir,
            config_file,
            log_file,
        }
    }

    pub fn keystore_file(&self, network: NetworkMode) -> PathBuf {
        self.keystore_dir
            .join(format!("{}.keystore.json", network.as_str()))
    }

    pub fn journal_file(&self) -> PathBuf {
        self.data_dir.join("cross_chain_journal.jsonl")
    }

    pub fn ensure_private_dirs(&self) -> eyre::Result<()> {
        crate::fsutil::ensure_private_dir(&self.root)?;
        crate::fsutil::ensure_private_dir(&self.data_dir)?;
        Ok(())
    }
}
