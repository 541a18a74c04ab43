use serde::{Deserialize, Serialize};

/// Push registration of one installed client
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceToken {
    pub id: i32,
    pub user_id: String,
    pub token: String,
}
