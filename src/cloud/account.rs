use serde::Deserialize;
use tracing::info;

use super::client::{ApiCode, CloudClient};
use super::error::Result;
use super::transport::ApiRequest;

/// Outcome of the daily check-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignResult {
    /// The account had already checked in today
    pub already_signed: bool,
    /// Storage bonus granted, in MB
    pub bonus_mb: u64,
}

#[derive(Debug, Deserialize)]
struct SignResp {
    #[serde(default, rename = "isSign")]
    is_sign: Option<serde_json::Value>,
    #[serde(default, rename = "netdiskBonus")]
    netdisk_bonus: u64,
}

// The endpoint has no status field; any body that parses is accepted
impl ApiCode for SignResp {
    fn is_success(&self) -> bool {
        true
    }
}

fn truthy(value: Option<&serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => s == "true",
        Some(serde_json::Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

impl CloudClient {
    /// Perform the daily check-in on the mobile API
    pub async fn sign(&self) -> Result<SignResult> {
        let url = format!("{}/mkt/userSign.action", self.options.mobile_url);
        let request = ApiRequest::get(url)
            .param("rand", rand::random::<u32>())
            .param("clientType", "TELEANDROID")
            .param("version", "8.6.3")
            .param("model", "SM-G930K");

        let resp: SignResp = self.call(request).await?;
        let result = SignResult {
            already_signed: truthy(resp.is_sign.as_ref()),
            bonus_mb: resp.netdisk_bonus,
        };

        info!(
            "Check-in complete: already_signed={}, bonus={}MB",
            result.already_signed, result.bonus_mb
        );
        Ok(result)
    }
}
