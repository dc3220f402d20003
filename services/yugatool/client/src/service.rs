//! Typed service stubs over the [`Messenger`] seam.
//!
//! Each stub is a thin wrapper: encode the request, send it through the
//! shared messenger, decode the response. The [`rpc_service!`] macro
//! generates them from a method table.

use crate::pb::*;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use yb_session::{send_message, LivenessProbe, Messenger, Session, SessionError, SessionMessenger};

/// Declare a typed stub for one remote service
macro_rules! rpc_service {
    (
        $(#[$meta:meta])*
        pub struct $name:ident => $service:literal {
            $(
                $(#[$method_meta:meta])*
                fn $method:ident($request:ty) -> $response:ty = $wire_name:literal;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            messenger: Arc<dyn Messenger>,
        }

        impl $name {
            /// Fully qualified service name
            pub const SERVICE_NAME: &'static str = $service;

            /// Create a stub sending through `messenger`
            pub fn new(messenger: Arc<dyn Messenger>) -> Self {
                Self { messenger }
            }

            $(
                $(#[$method_meta])*
                pub async fn $method(&self, request: &$request) -> Result<$response, SessionError> {
                    debug!(
                        endpoint = %self.messenger.host(),
                        service = $service,
                        method = $wire_name,
                        "calling"
                    );
                    send_message(self.messenger.as_ref(), $service, $wire_name, request).await
                }
            )*
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("host", self.messenger.host())
                    .finish()
            }
        }
    };
}

rpc_service! {
    /// Calls every server (master or tablet server) answers
    pub struct GenericService => "yb.server.GenericService" {
        /// Liveness check
        fn ping(PingRequestPb) -> PingResponsePb = "Ping";
        /// Identity, bound addresses and version of the server
        fn get_status(GetStatusRequestPb) -> GetStatusResponsePb = "GetStatus";
        /// Current value of a runtime flag
        fn get_flag(GetFlagRequestPb) -> GetFlagResponsePb = "GetFlag";
    }
}

rpc_service! {
    /// Cluster catalog calls answered by masters
    pub struct MasterService => "yb.master.MasterService" {
        /// Tablet servers known to the leader
        fn list_tablet_servers(ListTabletServersRequestPb) -> ListTabletServersResponsePb = "ListTabletServers";
        /// Masters in the Raft configuration
        fn list_masters(ListMastersRequestPb) -> ListMastersResponsePb = "ListMasters";
        /// Cluster UUID, config version and replica placement
        fn get_master_cluster_config(GetMasterClusterConfigRequestPb) -> GetMasterClusterConfigResponsePb = "GetMasterClusterConfig";
    }
}

/// Liveness probe issuing `GenericService.Ping` over the new session
#[derive(Debug, Clone, Copy)]
pub struct GenericPing {
    timeout_millis: u32,
}

impl GenericPing {
    /// Probe sending `timeout_millis` as the advisory timeout
    pub fn new(timeout_millis: u32) -> Self {
        Self { timeout_millis }
    }
}

#[async_trait]
impl LivenessProbe for GenericPing {
    async fn probe(&self, session: &Arc<Session>) -> Result<(), SessionError> {
        let messenger = SessionMessenger::new(session.clone()).with_timeout_millis(self.timeout_millis);
        GenericService::new(Arc::new(messenger))
            .ping(&PingRequestPb {})
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Mutex;
    use yb_wire::Endpoint;

    /// Messenger recording calls; GetFlag gets `reply`, everything else an empty body
    struct RecordingMessenger {
        host: Endpoint,
        calls: Mutex<Vec<(String, String)>>,
        reply: Bytes,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        fn host(&self) -> &Endpoint {
            &self.host
        }

        async fn send_raw(
            &self,
            service: &str,
            method: &str,
            _request: Bytes,
        ) -> Result<Bytes, SessionError> {
            self.calls
                .lock()
                .unwrap()
                .push((service.to_string(), method.to_string()));
            match method {
                "GetFlag" => Ok(self.reply.clone()),
                _ => Ok(Bytes::new()),
            }
        }
    }

    #[tokio::test]
    async fn test_stub_routes_to_service_and_method() {
        let flag = GetFlagResponsePb {
            valid: Some(true),
            value: Some("3".to_string()),
        };
        let messenger = Arc::new(RecordingMessenger {
            host: Endpoint::new("ts-1", 9100),
            calls: Mutex::new(Vec::new()),
            reply: Bytes::from(prost::Message::encode_to_vec(&flag)),
        });

        let generic = GenericService::new(messenger.clone());
        let response = generic
            .get_flag(&GetFlagRequestPb {
                flag: Some("replication_factor".to_string()),
            })
            .await
            .unwrap();
        assert!(response.valid());
        assert_eq!(response.value(), "3");

        let master = MasterService::new(messenger.clone());
        let _ = master.list_masters(&ListMastersRequestPb {}).await.unwrap();
        let config = master
            .get_master_cluster_config(&GetMasterClusterConfigRequestPb {})
            .await
            .unwrap();
        assert!(config.cluster_config.is_none());

        let calls = messenger.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("yb.server.GenericService".to_string(), "GetFlag".to_string()),
                ("yb.master.MasterService".to_string(), "ListMasters".to_string()),
                (
                    "yb.master.MasterService".to_string(),
                    "GetMasterClusterConfig".to_string()
                ),
            ]
        );
        assert_eq!(format!("{:?}", generic), "GenericService { host: Endpoint { host: \"ts-1\", port: 9100 } }");
    }
}
