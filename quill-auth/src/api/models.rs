use serde::{Deserialize, Serialize};

use crate::state::LoginProvider;

// Mirror server wire shapes

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ProvidersResponse {
    pub providers: Vec<LoginProvider>,
}
