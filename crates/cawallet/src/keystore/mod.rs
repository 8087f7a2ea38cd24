pub mod crypto;

use crate::{
    config::NetworkMode,
    errors::CaError,
    paths::CaPaths,
    wallet::{CaHandle, WalletIdentity},
};
use crypto::KeystoreBlob;
use eyre::Context as _;
use fs2::FileExt as _;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fs::{self, File, OpenOptions},
    path::PathBuf,
};
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub const PRIVATE_KEY_ENV: &str = "CAWALLET_PRIVATE_KEY";

/// On-disk keystore: plaintext CA metadata next to the encrypted manager secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeystoreFile {
    pub ca_hash: String,
    pub ca_address: String,
    pub origin_chain_id: String,
    pub keystore: KeystoreBlob,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
struct SecretPayload {
    private_key: String,
    mnemonic: String,
}

/// The wallet currently allowed to sign.
#[derive(Debug, Clone)]
pub struct UnlockedWallet {
    pub identity: WalletIdentity,
    pub ca: CaHandle,
    pub network: NetworkMode,
}

/// Holds at most one unlocked wallet. Owned by whoever drives the toolkit (one per CLI
/// invocation, one per MCP connection); never written to disk.
#[derive(Debug, Default)]
pub struct Session {
    unlocked: Option<UnlockedWallet>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn unlocked(&self) -> Option<&UnlockedWallet> {
        self.unlocked.as_ref()
    }

    /// Install `wallet`, evicting any previous occupant regardless of network.
    pub fn put(&mut self, wallet: UnlockedWallet) -> Option<UnlockedWallet> {
        self.unlocked.replace(wallet)
    }

    /// Returns whether anything was unlocked.
    pub fn clear(&mut self) -> bool {
        self.unlocked.take().is_some()
    }
}

/// Everything `save` needs. Blank strings count as missing.
#[derive(Debug)]
pub struct SaveKeystoreRequest {
    pub password: SecretString,
    pub private_key: Zeroizing<String>,
    pub mnemonic: Zeroizing<String>,
    pub ca_hash: String,
    pub ca_address: String,
    pub origin_chain_id: String,
    pub network: Option<NetworkMode>,
}

/// Default origin chain when a caller omits it.
pub const DEFAULT_ORIGIN_CHAIN_ID: &str = "AELF";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletStatus {
    pub exists: bool,
    pub unlocked: bool,
    pub ca_hash: Option<String>,
    pub ca_address: Option<String>,
    pub origin_chain_id: Option<String>,
    /// Manager address, only while unlocked.
    pub address: Option<String>,
    pub network: NetworkMode,
}

fn require(field: &'static str, value: &str) -> Result<(), CaError> {
    if value.trim().is_empty() {
        return Err(CaError::RequiredFieldMissing(field));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct KeystoreManager {
    paths: CaPaths,
}

impl KeystoreManager {
    pub const fn new(paths: CaPaths) -> Self {
        Self { paths }
    }

    pub fn keystore_path(&self, network: NetworkMode) -> PathBuf {
        self.paths.keystore_file(network)
    }

    fn lock_path(&self) -> PathBuf {
        self.paths.keystore_dir.join(".keystore.lock")
    }

    /// Serialize writers across processes. Fails fast rather than blocking a tool call.
    fn acquire_write_lock(&self) -> eyre::Result<File> {
        crate::fsutil::ensure_private_dir(&self.paths.keystore_dir)?;
        let p = self.lock_path();
        let mut oo = OpenOptions::new();
        oo.create(true).read(true).write(true).truncate(false);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt as _;
            oo.mode(crate::fsutil::MODE_FILE_PRIVATE);
        }
        let f = oo.open(&p).context("open keystore lock file")?;
        match f.try_lock_exclusive() {
            Ok(()) => Ok(f),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(CaError::KeystoreBusy.into())
            }
            Err(e) => Err(eyre::Report::new(e).wrap_err("lock keystore")),
        }
    }

    /// Encrypt the manager secrets to the network's keystore file and unlock them into
    /// `session`.
    pub fn save(
        &self,
        req: &SaveKeystoreRequest,
        session: &mut Session,
    ) -> eyre::Result<WalletStatus> {
        require("password", req.password.expose_secret())?;
        require("privateKey", &req.private_key)?;
        require("mnemonic", &req.mnemonic)?;
        require("caHash", &req.ca_hash)?;
        require("caAddress", &req.ca_address)?;
        let network = req.network.ok_or(CaError::RequiredFieldMissing("network"))?;

        let identity = WalletIdentity::from_private_key_hex(&req.private_key)?
            .with_mnemonic(Zeroizing::new(req.mnemonic.trim().to_owned()));
        let origin_chain_id = if req.origin_chain_id.trim().is_empty() {
            DEFAULT_ORIGIN_CHAIN_ID.to_owned()
        } else {
            req.origin_chain_id.trim().to_owned()
        };

        let payload = SecretPayload {
            private_key: identity.private_key_hex().to_string(),
            mnemonic: req.mnemonic.trim().to_owned(),
        };
        let plaintext = Zeroizing::new(serde_json::to_vec(&payload).context("encode secrets")?);
        drop(payload);
        let blob = crypto::seal(&req.password, network, &plaintext)?;

        let file = KeystoreFile {
            ca_hash: req.ca_hash.trim().to_owned(),
            ca_address: req.ca_address.trim().to_owned(),
            origin_chain_id,
            keystore: blob,
        };
        let body = serde_json::to_vec_pretty(&file).context("encode keystore file")?;

        let lock = self.acquire_write_lock()?;
        let path = self.keystore_path(network);
        let written = crate::fsutil::write_private_atomic(&path, &body);
        fs2::FileExt::unlock(&lock).context("unlock keystore")?;
        written.context("write keystore")?;
        info!(network = %network, path = %path.display(), "saved keystore");

        session.put(UnlockedWallet {
            identity,
            ca: CaHandle {
                ca_hash: file.ca_hash,
                ca_address: file.ca_address,
                origin_chain_id: file.origin_chain_id,
            },
            network,
        });
        self.status(network, session)
    }

    pub fn unlock(
        &self,
        password: &SecretString,
        network: NetworkMode,
        session: &mut Session,
    ) -> eyre::Result<WalletStatus> {
        require("password", password.expose_secret())?;
        let path = self.keystore_path(network);
        if !path.exists() {
            return Err(CaError::NoKeystoreFound(network.to_string()).into());
        }
        let raw = fs::read_to_string(&path).context("read keystore")?;
        let file: KeystoreFile =
            serde_json::from_str(&raw).map_err(|_e| CaError::DecryptionFailed)?;
        let plaintext = crypto::open(password, network, &file.keystore)?;
        let payload: SecretPayload =
            serde_json::from_slice(&plaintext).map_err(|_e| CaError::DecryptionFailed)?;

        let mut identity = WalletIdentity::from_private_key_hex(&payload.private_key)
            .map_err(|_e| CaError::DecryptionFailed)?;
        if !payload.mnemonic.is_empty() {
            identity = identity.with_mnemonic(Zeroizing::new(payload.mnemonic.clone()));
        }
        drop(payload);

        let previous = session.put(UnlockedWallet {
            identity,
            ca: CaHandle {
                ca_hash: file.ca_hash,
                ca_address: file.ca_address,
                origin_chain_id: file.origin_chain_id,
            },
            network,
        });
        info!(
            network = %network,
            replaced = previous.is_some(),
            "unlocked keystore"
        );
        self.status(network, session)
    }

    /// Idempotent.
    pub fn lock(session: &mut Session) -> bool {
        let was = session.clear();
        if was {
            info!("locked wallet");
        }
        was
    }

    /// File existence and session occupancy, reported independently. Metadata comes from
    /// the plaintext part of the file; a malformed file reads as existing with no metadata.
    pub fn status(&self, network: NetworkMode, session: &Session) -> eyre::Result<WalletStatus> {
        let path = self.keystore_path(network);
        let exists = path.exists();
        let meta = if exists {
            fs::read_to_string(&path)
                .ok()
                .and_then(|s| serde_json::from_str::<Value>(&s).ok())
        } else {
            None
        };
        let field = |k: &str| -> Option<String> {
            meta.as_ref()
                .and_then(|m| m.get(k))
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
        };

        let active = session.unlocked().filter(|w| w.network == network);
        Ok(WalletStatus {
            exists,
            unlocked: active.is_some(),
            ca_hash: field("caHash"),
            ca_address: field("caAddress"),
            origin_chain_id: field("originChainId"),
            address: active.map(|w| w.identity.address().to_owned()),
            network,
        })
    }
}

/// The signer for write operations: the session's wallet, else a raw key from `env_key`,
/// else [`CaError::NoWalletAvailable`].
pub fn resolve_signing_identity(
    session: &Session,
    env_key: Option<&str>,
) -> Result<WalletIdentity, CaError> {
    if let Some(w) = session.unlocked() {
        return Ok(w.identity.clone());
    }
    match env_key.map(str::trim).filter(|k| !k.is_empty()) {
        Some(k) => WalletIdentity::from_private_key_hex(k),
        None => Err(CaError::NoWalletAvailable),
    }
}

/// [`resolve_signing_identity`] reading [`PRIVATE_KEY_ENV`].
pub fn resolve_signing_identity_from_env(session: &Session) -> Result<WalletIdentity, CaError> {
    let env_key = std::env::var(PRIVATE_KEY_ENV).ok().map(Zeroizing::new);
    resolve_signing_identity(session, env_key.as_deref().map(String::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(td: &tempfile::TempDir) -> KeystoreManager {
        KeystoreManager::new(CaPaths::at(td.path().to_path_buf()))
    }

    fn request(identity: &WalletIdentity, password: &str) -> SaveKeystoreRequest {
        SaveKeystoreRequest {
            password: SecretString::new(password.to_owned().into()),
            private_key: identity.private_key_hex(),
            mnemonic: Zeroizing::new(identity.mnemonic().unwrap_or("").to_owned()),
            ca_hash: "ab".repeat(32),
            ca_address: "2wRDbyVF28VBQoSPgdSEFaL4x7CaXz8TCBujYhgWc9qTMxBE3n".to_owned(),
            origin_chain_id: "tDVV".to_owned(),
            network: Some(NetworkMode::Testnet),
        }
    }

    #[test]
    fn save_status_lock_status() -> eyre::Result<()> {
        let td = tempfile::tempdir()?;
        let ks = manager(&td);
        let mut session = Session::new();
        let w = WalletIdentity::generate()?;
        let req = request(&w, "pw-1");

        let st = ks.save(&req, &mut session)?;
        assert!(st.exists);
        assert!(st.unlocked);
        assert_eq!(st.ca_hash.as_deref(), Some(req.ca_hash.as_str()));
        assert_eq!(st.ca_address.as_deref(), Some(req.ca_address.as_str()));
        assert_eq!(st.address.as_deref(), Some(w.address()));

        assert!(KeystoreManager::lock(&mut session));
        assert!(!KeystoreManager::lock(&mut session));
        let st = ks.status(NetworkMode::Testnet, &session)?;
        assert!(st.exists);
        assert!(!st.unlocked);
        assert_eq!(st.ca_hash.as_deref(), Some(req.ca_hash.as_str()));
        assert_eq!(st.ca_address.as_deref(), Some(req.ca_address.as_str()));
        assert!(st.address.is_none());
        Ok(())
    }

    #[test]
    fn unlock_restores_identity_and_mnemonic() -> eyre::Result<()> {
        let td = tempfile::tempdir()?;
        let ks = manager(&td);
        let mut session = Session::new();
        let w = WalletIdentity::generate()?;
        ks.save(&request(&w, "pw-1"), &mut session)?;
        KeystoreManager::lock(&mut session);

        let pw = SecretString::new("pw-1".to_owned().into());
        ks.unlock(&pw, NetworkMode::Testnet, &mut session)?;
        let u = session
            .unlocked()
            .ok_or_else(|| eyre::eyre!("session should be unlocked"))?;
        assert_eq!(u.identity.address(), w.address());
        assert_eq!(u.identity.mnemonic(), w.mnemonic());
        assert_eq!(u.ca.origin_chain_id, "tDVV");
        Ok(())
    }

    #[test]
    fn unlock_missing_and_wrong_password_fail_distinctly() -> eyre::Result<()> {
        let td = tempfile::tempdir()?;
        let ks = manager(&td);
        let mut session = Session::new();
        let pw = SecretString::new("pw".to_owned().into());

        let missing = ks
            .unlock(&pw, NetworkMode::Mainnet, &mut session)
            .err()
            .ok_or_else(|| eyre::eyre!("expected not found"))?;
        assert!(matches!(
            missing.downcast_ref::<CaError>(),
            Some(CaError::NoKeystoreFound(_))
        ));
        assert!(missing.to_string().contains("no keystore found"));

        let w = WalletIdentity::generate()?;
        let mut req = request(&w, "right");
        req.network = Some(NetworkMode::Mainnet);
        ks.save(&req, &mut session)?;
        KeystoreManager::lock(&mut session);

        let wrong = ks
            .unlock(&pw, NetworkMode::Mainnet, &mut session)
            .err()
            .ok_or_else(|| eyre::eyre!("expected decryption failure"))?;
        assert!(matches!(
            wrong.downcast_ref::<CaError>(),
            Some(CaError::DecryptionFailed)
        ));
        assert!(session.unlocked().is_none());
        Ok(())
    }

    #[test]
    fn malformed_file_reports_exists_without_metadata() -> eyre::Result<()> {
        let td = tempfile::tempdir()?;
        let ks = manager(&td);
        let path = ks.keystore_path(NetworkMode::Mainnet);
        crate::fsutil::write_private_atomic(&path, b"not json {")?;
        let st = ks.status(NetworkMode::Mainnet, &Session::new())?;
        assert!(st.exists);
        assert!(!st.unlocked);
        assert!(st.ca_hash.is_none());
        assert!(st.ca_address.is_none());
        Ok(())
    }

    #[test]
    fn save_names_each_missing_field() -> eyre::Result<()> {
        let td = tempfile::tempdir()?;
        let ks = manager(&td);
        let w = WalletIdentity::generate()?;
        type Blank = fn(&mut SaveKeystoreRequest);
        let cases: [(&str, Blank); 6] = [
            ("password", |r: &mut SaveKeystoreRequest| {
                r.password = SecretString::new(String::new().into());
            }),
            ("privateKey", |r: &mut SaveKeystoreRequest| {
                r.private_key = Zeroizing::new(String::new());
            }),
            ("mnemonic", |r: &mut SaveKeystoreRequest| {
                r.mnemonic = Zeroizing::new(" ".to_owned());
            }),
            ("caHash", |r: &mut SaveKeystoreRequest| r.ca_hash = String::new()),
            ("caAddress", |r: &mut SaveKeystoreRequest| r.ca_address = String::new()),
            ("network", |r: &mut SaveKeystoreRequest| r.network = None),
        ];
        for (field, blank) in cases {
            let mut req = request(&w, "pw");
            blank(&mut req);
            let err = ks
                .save(&req, &mut Session::new())
                .err()
                .ok_or_else(|| eyre::eyre!("{field} should be required"))?;
            assert_eq!(err.to_string(), format!("{field} is required"));
        }
        assert!(!ks.keystore_path(NetworkMode::Testnet).exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn keystore_file_is_owner_only() -> eyre::Result<()> {
        use std::os::unix::fs::PermissionsExt as _;
        let td = tempfile::tempdir()?;
        let ks = manager(&td);
        let w = WalletIdentity::generate()?;
        ks.save(&request(&w, "pw"), &mut Session::new())?;
        let mode = fs::metadata(ks.keystore_path(NetworkMode::Testnet))?
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
        Ok(())
    }

    #[test]
    fn signing_identity_prefers_session_then_env() -> eyre::Result<()> {
        let mut session = Session::new();
        assert!(matches!(
            resolve_signing_identity(&session, None),
            Err(CaError::NoWalletAvailable)
        ));
        let err = resolve_signing_identity(&session, Some("  "))
            .err()
            .ok_or_else(|| eyre::eyre!("blank env key must not resolve"))?;
        let msg = err.to_string();
        assert!(msg.contains("unlock") && msg.contains(PRIVATE_KEY_ENV));

        let env_wallet = WalletIdentity::generate()?;
        let from_env = resolve_signing_identity(&session, Some(&env_wallet.private_key_hex()))?;
        assert_eq!(from_env.address(), env_wallet.address());

        let unlocked = WalletIdentity::generate()?;
        session.put(UnlockedWallet {
            identity: unlocked.clone(),
            ca: CaHandle {
                ca_hash: "h".to_owned(),
                ca_address: "a".to_owned(),
                origin_chain_id: "AELF".to_owned(),
            },
            network: NetworkMode::Mainnet,
        });
        let chosen = resolve_signing_identity(&session, Some(&env_wallet.private_key_hex()))?;
        assert_eq!(chosen.address(), unlocked.address());
        Ok(())
    }
}
