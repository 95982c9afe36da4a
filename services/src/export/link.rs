//! Signed download links.
//!
//! `sign = md5_hex("access_token=<t>&task_id=<id>&ts=<id*300>" + secret)`. The digest is
//! taken over the raw values; the link itself percent-encodes them.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ServiceError, ServiceResult};
use crate::export::task::bucket_start;

/// Query parameters of a download link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadParams {
    pub access_token: String,
    pub task_id: i64,
    pub ts: i64,
    pub sign: String,
}

pub fn sign(access_token: &str, task_id: i64, secret: &str) -> String {
    let payload = format!(
        "access_token={access_token}&task_id={task_id}&ts={}{secret}",
        bucket_start(task_id)
    );
    format!("{:x}", md5::compute(payload.as_bytes()))
}

impl DownloadParams {
    pub fn issue(access_token: &str, task_id: i64, secret: &str) -> Self {
        Self {
            access_token: access_token.to_string(),
            task_id,
            ts: bucket_start(task_id),
            sign: sign(access_token, task_id, secret),
        }
    }

    pub fn verify(&self, secret: &str) -> ServiceResult<()> {
        if self.ts != bucket_start(self.task_id) {
            return Err(ServiceError::InvalidSignature);
        }
        let expected = sign(&self.access_token, self.task_id, secret);
        if !expected.eq_ignore_ascii_case(&self.sign) {
            return Err(ServiceError::InvalidSignature);
        }
        Ok(())
    }

    pub fn to_url(&self, endpoint: &str) -> ServiceResult<Url> {
        Url::parse_with_params(
            endpoint,
            &[
                ("access_token", self.access_token.clone()),
                ("task_id", self.task_id.to_string()),
                ("ts", self.ts.to_string()),
                ("sign", self.sign.clone()),
            ],
        )
        .map_err(|e| ServiceError::Infrastructure(format!("invalid download endpoint {endpoint}: {e}")))
    }

    /// Reads the parameters back out of a link.
    pub fn from_url(url: &Url) -> ServiceResult<Self> {
        let mut access_token = None;
        let mut task_id = None;
        let mut ts = None;
        let mut sign = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "access_token" => access_token = Some(value.into_owned()),
                "task_id" => task_id = value.parse::<i64>().ok(),
                "ts" => ts = value.parse::<i64>().ok(),
                "sign" => sign = Some(value.into_owned()),
                _ => {}
            }
        }
        match (access_token, task_id, ts, sign) {
            (Some(access_token), Some(task_id), Some(ts), Some(sign)) => Ok(Self {
                access_token,
                task_id,
                ts,
                sign,
            }),
            _ => Err(ServiceError::InvalidSignature),
        }
    }
}
