use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LockResponse {
    pub locked: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PirResponse {
    pub pir_enabled: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NotifyResponse {
    pub notify_enabled: bool,
}
