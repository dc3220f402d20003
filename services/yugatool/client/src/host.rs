//! A live connection to one server together with what it reported at connect time.

use crate::error::ClientError;
use crate::pb::{GetStatusRequestPb, ServerStatusPb};
use crate::service::{GenericPing, GenericService, MasterService};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use yb_session::{Dialer, Messenger, Session, SessionMessenger};
use yb_wire::Endpoint;

/// Connected server plus the status it returned from `GetStatus`
#[derive(Debug)]
pub struct HostState {
    endpoint: Endpoint,
    messenger: Arc<SessionMessenger>,
    status: ServerStatusPb,
    /// Generic server calls
    pub generic: GenericService,
    /// Master calls; only meaningful when the host is a master
    pub master: MasterService,
}

impl HostState {
    /// Connect to `endpoint`, verify liveness with Ping and fetch its status.
    ///
    /// The connection is closed again when any step after dialing fails.
    pub async fn connect(
        endpoint: &Endpoint,
        dialer: &dyn Dialer,
        rpc_timeout_millis: u32,
    ) -> Result<Self, ClientError> {
        let probe = GenericPing::new(rpc_timeout_millis);
        let session = Session::connect(endpoint, dialer, &probe).await?;
        let messenger = Arc::new(SessionMessenger::new(session).with_timeout_millis(rpc_timeout_millis));
        let shared: Arc<dyn Messenger> = messenger.clone();
        let generic = GenericService::new(shared.clone());
        let master = MasterService::new(shared);

        let status = match fetch_status(endpoint, &generic).await {
            Ok(status) => status,
            Err(e) => {
                if let Err(close_err) = messenger.session().close().await {
                    debug!(%endpoint, error = %close_err, "close after failed GetStatus");
                }
                return Err(e);
            }
        };

        info!(
            %endpoint,
            version = %status.version_info.clone().unwrap_or_default().display_version(),
            "connected to server"
        );

        Ok(Self {
            endpoint: endpoint.clone(),
            messenger,
            status,
            generic,
            master,
        })
    }

    /// Address this host was dialed on
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Status returned at connect time
    pub fn status(&self) -> &ServerStatusPb {
        &self.status
    }

    /// Messenger bound to this host's session
    pub fn messenger(&self) -> Arc<dyn Messenger> {
        self.messenger.clone()
    }

    /// Permanent UUID the server reported
    pub fn uuid(&self) -> Result<Uuid, ClientError> {
        let raw = self
            .status
            .node_instance
            .as_ref()
            .map(|n| n.permanent_uuid.as_slice())
            .unwrap_or_default();
        parse_uuid(raw)
    }

    /// Whether the session has been closed or lost framing.
    ///
    /// Never blocks; a session busy with a call counts as live.
    pub fn is_defunct(&self) -> bool {
        self.messenger.session().is_defunct()
    }

    /// Close the underlying session
    pub async fn close(&self) -> Result<(), ClientError> {
        self.messenger.session().close().await?;
        Ok(())
    }
}

async fn fetch_status(
    endpoint: &Endpoint,
    generic: &GenericService,
) -> Result<ServerStatusPb, ClientError> {
    let response = generic.get_status(&GetStatusRequestPb {}).await?;
    if let Some(error) = response.error {
        return Err(ClientError::Server {
            method: "GetStatus",
            message: error.message.unwrap_or_default(),
        });
    }
    response
        .status
        .ok_or_else(|| ClientError::MissingStatus(endpoint.clone()))
}

/// Parse a UUID sent as ASCII hex, with or without dashes
pub(crate) fn parse_uuid(raw: &[u8]) -> Result<Uuid, ClientError> {
    Uuid::try_parse_ascii(raw).map_err(|source| ClientError::InvalidUuid {
        raw: String::from_utf8_lossy(raw).into_owned(),
        source,
    })
}
