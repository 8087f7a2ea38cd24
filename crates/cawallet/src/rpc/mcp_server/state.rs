use crate::{config::NetworkMode, keystore::Session, toolkit::Toolkit};

/// Per-connection server state. The session lives here, so an unlock lasts for the
/// connection and dies with it.
#[derive(Debug)]
pub struct ServerState {
    pub toolkit: Toolkit,
    pub session: Session,
    pub network_override: Option<NetworkMode>,
}

impl ServerState {
    pub fn new(toolkit: Toolkit, network_override: Option<NetworkMode>) -> Self {
        Self {
            toolkit,
            session: Session::new(),
            network_override,
        }
    }

    pub fn effective_network(&self) -> NetworkMode {
        self.network_override
            .unwrap_or_else(|| self.toolkit.default_network())
    }
}
