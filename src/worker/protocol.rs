//! Orchestrator websocket messages.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::Session;
use crate::store::ResourceProfile;

/// Worker type the orchestrator expects from light extension workers.
pub const WORKER_TYPE: &str = "LWEXT";
/// Host the extension reports for itself.
pub const EXTENSION_HOST: &str = "chrome-extension://ekbbplmjjgoobhdlffmgeokalelnmjjc";

pub const MSG_REGISTER: &str = "REGISTER";
pub const MSG_HEARTBEAT: &str = "HEARTBEAT";

/// One-time registration sent right after the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMessage {
    #[serde(rename = "workerID")]
    pub worker_id: String,
    #[serde(rename = "msgType")]
    pub msg_type: String,
    #[serde(rename = "workerType")]
    pub worker_type: String,
    pub message: RegisterBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterBody {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub worker: RegisterWorker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorker {
    pub host: String,
    pub identity: String,
    #[serde(rename = "ownerAddress")]
    pub owner_address: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl RegisterMessage {
    pub fn new(session: &Session) -> Self {
        Self {
            worker_id: session.worker_id.clone(),
            msg_type: MSG_REGISTER.to_string(),
            worker_type: WORKER_TYPE.to_string(),
            message: RegisterBody {
                id: session.session_id,
                kind: MSG_REGISTER.to_string(),
                worker: RegisterWorker {
                    host: EXTENSION_HOST.to_string(),
                    identity: session.worker_id.clone(),
                    owner_address: session.address.clone(),
                    kind: WORKER_TYPE.to_string(),
                },
            },
        }
    }
}

/// Periodic liveness message carrying synthetic capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    pub message: HeartbeatBody,
    #[serde(rename = "msgType")]
    pub msg_type: String,
    #[serde(rename = "workerType")]
    pub worker_type: String,
    #[serde(rename = "workerID")]
    pub worker_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeartbeatBody {
    pub worker: HeartbeatWorker,
    pub capacity: Capacity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatWorker {
    #[serde(rename = "Identity")]
    pub identity: String,
    #[serde(rename = "ownerAddress")]
    pub owner_address: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "Host")]
    pub host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Capacity {
    pub available_memory: Decimal,
    pub available_storage: Decimal,
    #[serde(rename = "AvailableGPU")]
    pub available_gpu: String,
    pub available_models: Vec<String>,
}

impl HeartbeatMessage {
    pub fn new(session: &Session, profile: &ResourceProfile, available_memory: Decimal) -> Self {
        Self {
            message: HeartbeatBody {
                worker: HeartbeatWorker {
                    identity: session.worker_id.clone(),
                    owner_address: session.address.clone(),
                    kind: WORKER_TYPE.to_string(),
                    host: EXTENSION_HOST.to_string(),
                },
                capacity: Capacity {
                    available_memory,
                    available_storage: profile.storage,
                    available_gpu: profile.gpu.clone(),
                    available_models: Vec::new(),
                },
            },
            msg_type: MSG_HEARTBEAT.to_string(),
            worker_type: WORKER_TYPE.to_string(),
            worker_id: session.worker_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use secrecy::SecretString;
    use serde_json::json;

    use super::*;
    use crate::store::derive_worker_id;

    fn session() -> Session {
        Session {
            address: "0xwallet".into(),
            worker_id: derive_worker_id("0xwallet"),
            session_id: Uuid::nil(),
            token: SecretString::from("tok".to_string()),
        }
    }

    #[test]
    fn register_wire_shape() {
        let json = serde_json::to_value(RegisterMessage::new(&session())).unwrap();
        assert_eq!(
            json,
            json!({
                "workerID": "MHh3YWxsZXQ=",
                "msgType": "REGISTER",
                "workerType": "LWEXT",
                "message": {
                    "id": "00000000-0000-0000-0000-000000000000",
                    "type": "REGISTER",
                    "worker": {
                        "host": EXTENSION_HOST,
                        "identity": "MHh3YWxsZXQ=",
                        "ownerAddress": "0xwallet",
                        "type": "LWEXT"
                    }
                }
            })
        );
    }

    #[test]
    fn heartbeat_wire_shape() {
        let profile = ResourceProfile {
            gpu: "1x RTX 4090".into(),
            storage: dec!(250.10),
        };
        let json =
            serde_json::to_value(HeartbeatMessage::new(&session(), &profile, dec!(7.05))).unwrap();
        assert_eq!(
            json,
            json!({
                "message": {
                    "Worker": {
                        "Identity": "MHh3YWxsZXQ=",
                        "ownerAddress": "0xwallet",
                        "type": "LWEXT",
                        "Host": EXTENSION_HOST
                    },
                    "Capacity": {
                        "AvailableMemory": "7.05",
                        "AvailableStorage": "250.10",
                        "AvailableGPU": "1x RTX 4090",
                        "AvailableModels": []
                    }
                },
                "msgType": "HEARTBEAT",
                "workerType": "LWEXT",
                "workerID": "MHh3YWxsZXQ="
            })
        );
    }
}
