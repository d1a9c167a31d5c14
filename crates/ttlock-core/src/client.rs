//! [`Gateway`] implementation backed by the TTLock v3 REST API.
//!
//! Every request carries `clientId`, `accessToken` and a millisecond `date`.
//! Reads are GET requests with query parameters; settings and passcode writes
//! are POSTed as forms and routed through the lock's gateway (`type=2`). The cloud
//! reports application errors in-band with a non-zero `errcode`, which is
//! surfaced as [`TtlockError::RemoteRejection`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::config::ApiConfig;
use crate::error::{Result, TtlockError};
use crate::gateway::{CommandGate, Gateway};
use crate::models::{
    AddedPasscode, LockDetail, LockId, LockListPage, LockRecord, LockStatus, NewPasscode, OnOff,
    Page, PassageModeConfig, Passcode, RecordQuery, SensorDetail,
};
use crate::schedule::PassageModeWindow;

/// Changes are pushed to the lock through its Wi-Fi gateway.
const VIA_GATEWAY: &str = "2";

/// `lock/updateSetting` setting id for the lock sound.
const LOCK_SOUND_SETTING: &str = "6";

/// Largest page `lock/list` accepts.
const LIST_PAGE_SIZE: &str = "1000";

/// Largest page `lock/listKeyboardPwd` accepts.
const PASSCODE_PAGE_SIZE: &str = "200";

/// Longest response body kept in error messages.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: Option<String>,
}

/// HTTP client for the TTLock cloud.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
    client_id: String,
    access_token: String,
    gate: CommandGate,
}

impl HttpGateway {
    /// Build a gateway from the `[api]` configuration section.
    ///
    /// Commands are serialised through `gate`; pass the same gate to every
    /// gateway that shares a TTLock account.
    ///
    /// # Errors
    ///
    /// Returns [`TtlockError::ConfigValidationError`] for an unparsable base
    /// URL and [`TtlockError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig, gate: CommandGate) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url)
            .map_err(|e| TtlockError::ConfigValidationError(format!("api.base_url: {e}")))?;
        // join() replaces the last segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            client_id: config.client_id.clone(),
            access_token: config.access_token.clone(),
            gate,
        })
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn auth_params(&self) -> [(&'static str, String); 3] {
        [
            ("clientId", self.client_id.clone()),
            ("accessToken", self.access_token.clone()),
            ("date", Utc::now().timestamp_millis().to_string()),
        ]
    }

    fn request(&self, method: Method, path: &str, params: &[(&str, String)]) -> Result<RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| TtlockError::Transport(format!("invalid request path '{path}': {e}")))?;

        let auth = self.auth_params();
        let builder = self.client.request(method.clone(), url);
        let builder = if method == Method::GET {
            builder.query(&auth).query(params)
        } else {
            let form: Vec<(&str, &str)> = auth
                .iter()
                .chain(params.iter())
                .map(|(k, v)| (*k, v.as_str()))
                .collect();
            builder.form(&form)
        };
        Ok(builder)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let request_id = Uuid::new_v4().simple().to_string();
        let request_id = &request_id[..8];
        debug!(request_id, method = method.as_str(), path, ?params, "Sending request to TTLock cloud");

        let response = self.request(method, path, params)?.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.as_u16() >= 400 {
            debug!(request_id, status = status.as_u16(), %body, "Request failed");
            return Err(TtlockError::HttpStatus {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }
        debug!(request_id, status = status.as_u16(), %body, "Received response");

        parse_response(&body)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        self.call(Method::GET, path, params).await
    }

    async fn post(&self, path: &str, params: &[(&str, String)]) -> Result<()> {
        let _: serde_json::Value = self.call(Method::POST, path, params).await?;
        Ok(())
    }
}

/// Check the in-band status and decode the payload.
fn parse_response<T: DeserializeOwned>(body: &str) -> Result<T> {
    let value: serde_json::Value = serde_json::from_str(body)?;

    let status = ApiStatus::deserialize(&value)?;
    if status.errcode != 0 {
        return Err(TtlockError::RemoteRejection {
            code: status.errcode,
            message: status.errmsg.unwrap_or_default(),
        });
    }

    Ok(serde_json::from_value(value)?)
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

fn lock_param(lock_id: LockId) -> (&'static str, String) {
    ("lockId", lock_id.to_string())
}

fn on_off(on: bool) -> String {
    i64::from(OnOff::from_bool(on)).to_string()
}

/// Form fields for `lock/configPassageMode`.
fn passage_mode_params(lock_id: LockId, window: &PassageModeWindow) -> Result<Vec<(&'static str, String)>> {
    let week_days: Vec<u8> = window.week_days.iter().copied().collect();

    Ok(vec![
        lock_param(lock_id),
        ("type", VIA_GATEWAY.to_string()),
        ("passageMode", on_off(window.enabled)),
        ("autoUnlock", on_off(window.auto_unlock)),
        ("isAllDay", on_off(window.all_day)),
        ("startDate", window.start_minute.to_string()),
        ("endDate", window.end_minute.to_string()),
        ("weekDays", serde_json::to_string(&week_days)?),
    ])
}

/// Form fields for `keyboardPwd/add`.
fn add_passcode_params(lock_id: LockId, passcode: &NewPasscode) -> Vec<(&'static str, String)> {
    vec![
        lock_param(lock_id),
        ("keyboardPwd", passcode.passcode.clone()),
        ("keyboardPwdName", passcode.name.clone()),
        ("startDate", passcode.start.timestamp_millis().to_string()),
        ("endDate", passcode.end.timestamp_millis().to_string()),
        ("addType", VIA_GATEWAY.to_string()),
    ]
}

/// Query parameters for `lockRecord/list`. Unset bounds are left out.
fn record_params(lock_id: LockId, query: &RecordQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![lock_param(lock_id)];
    if let Some(start) = query.start {
        params.push(("startDate", start.timestamp_millis().to_string()));
    }
    if let Some(end) = query.end {
        params.push(("endDate", end.timestamp_millis().to_string()));
    }
    params.push(("pageNo", query.page_no.to_string()));
    params.push(("pageSize", query.page_size.to_string()));
    params
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn list_locks(&self) -> Result<Vec<LockId>> {
        let page: LockListPage = self
            .get(
                "lock/list",
                &[
                    ("pageNo", "1".to_string()),
                    ("pageSize", LIST_PAGE_SIZE.to_string()),
                ],
            )
            .await?;
        Ok(page.list.into_iter().map(|entry| entry.id).collect())
    }

    async fn fetch_lock_detail(&self, lock_id: LockId) -> Result<LockDetail> {
        self.get("lock/detail", &[lock_param(lock_id)]).await
    }

    async fn fetch_lock_state(&self, lock_id: LockId) -> Result<LockStatus> {
        let _gate = self.gate.acquire().await;
        self.get("lock/queryOpenState", &[lock_param(lock_id)]).await
    }

    async fn fetch_sensor_detail(&self, lock_id: LockId) -> Result<SensorDetail> {
        self.get("doorSensor/query", &[lock_param(lock_id)]).await
    }

    async fn fetch_passage_mode(&self, lock_id: LockId) -> Result<PassageModeWindow> {
        let config: PassageModeConfig = self
            .get("lock/getPassageModeConfig", &[lock_param(lock_id)])
            .await?;
        Ok(config.into())
    }

    async fn send_lock(&self, lock_id: LockId) -> Result<()> {
        let _gate = self.gate.acquire().await;
        let _: serde_json::Value = self.get("lock/lock", &[lock_param(lock_id)]).await?;
        Ok(())
    }

    async fn send_unlock(&self, lock_id: LockId) -> Result<()> {
        let _gate = self.gate.acquire().await;
        let _: serde_json::Value = self.get("lock/unlock", &[lock_param(lock_id)]).await?;
        Ok(())
    }

    async fn set_passage_mode(&self, lock_id: LockId, window: &PassageModeWindow) -> Result<()> {
        let params = passage_mode_params(lock_id, window)?;
        let _gate = self.gate.acquire().await;
        self.post("lock/configPassageMode", &params).await
    }

    async fn set_auto_lock(&self, lock_id: LockId, seconds: i64) -> Result<()> {
        let _gate = self.gate.acquire().await;
        self.post(
            "lock/setAutoLockTime",
            &[
                lock_param(lock_id),
                ("type", VIA_GATEWAY.to_string()),
                ("seconds", seconds.to_string()),
            ],
        )
        .await
    }

    async fn set_lock_sound(&self, lock_id: LockId, on: bool) -> Result<()> {
        let _gate = self.gate.acquire().await;
        self.post(
            "lock/updateSetting",
            &[
                lock_param(lock_id),
                ("type", LOCK_SOUND_SETTING.to_string()),
                ("value", on_off(on)),
                ("changeType", VIA_GATEWAY.to_string()),
            ],
        )
        .await
    }

    async fn list_passcodes(&self, lock_id: LockId) -> Result<Vec<Passcode>> {
        let page: Page<Passcode> = self
            .get(
                "lock/listKeyboardPwd",
                &[
                    lock_param(lock_id),
                    ("pageNo", "1".to_string()),
                    ("pageSize", PASSCODE_PAGE_SIZE.to_string()),
                ],
            )
            .await?;
        Ok(page.list)
    }

    async fn add_passcode(&self, lock_id: LockId, passcode: &NewPasscode) -> Result<i64> {
        let params = add_passcode_params(lock_id, passcode);
        let _gate = self.gate.acquire().await;
        let added: AddedPasscode = self.call(Method::POST, "keyboardPwd/add", &params).await?;
        Ok(added.id)
    }

    async fn delete_passcode(&self, lock_id: LockId, passcode_id: i64) -> Result<()> {
        let _gate = self.gate.acquire().await;
        self.post(
            "keyboardPwd/delete",
            &[
                lock_param(lock_id),
                ("keyboardPwdId", passcode_id.to_string()),
                ("deleteType", VIA_GATEWAY.to_string()),
            ],
        )
        .await
    }

    async fn list_records(&self, lock_id: LockId, query: &RecordQuery) -> Result<Vec<LockRecord>> {
        let page: Page<LockRecord> = self.get("lockRecord/list", &record_params(lock_id, query)).await?;
        Ok(page.list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemoteLockState;

    fn config(base_url: &str) -> ApiConfig {
        ApiConfig {
            base_url: base_url.to_string(),
            client_id: "client".to_string(),
            access_token: "token".to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let gateway = HttpGateway::new(&config("https://euapi.ttlock.com/v3"), CommandGate::new()).unwrap();
        assert_eq!(gateway.base_url().as_str(), "https://euapi.ttlock.com/v3/");
        assert_eq!(
            gateway.base_url().join("lock/detail").unwrap().as_str(),
            "https://euapi.ttlock.com/v3/lock/detail"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpGateway::new(&config("not a url"), CommandGate::new()).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_get_request_carries_auth_and_params() {
        let gateway = HttpGateway::new(&config(crate::config::DEFAULT_BASE_URL), CommandGate::new()).unwrap();
        let request = gateway
            .request(Method::GET, "lock/detail", &[lock_param(LockId(42))])
            .unwrap()
            .build()
            .unwrap();

        let query = request.url().query().unwrap();
        assert!(query.contains("clientId=client"));
        assert!(query.contains("accessToken=token"));
        assert!(query.contains("date="));
        assert!(query.contains("lockId=42"));
        assert_eq!(request.url().path(), "/v3/lock/detail");
    }

    #[test]
    fn test_post_request_is_form_encoded() {
        let gateway = HttpGateway::new(&config(crate::config::DEFAULT_BASE_URL), CommandGate::new()).unwrap();
        let request = gateway
            .request(
                Method::POST,
                "lock/setAutoLockTime",
                &[lock_param(LockId(42)), ("seconds", "-1".to_string())],
            )
            .unwrap()
            .build()
            .unwrap();

        assert!(request.url().query().is_none());
        let body = std::str::from_utf8(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert!(body.contains("lockId=42"));
        assert!(body.contains("seconds=-1"));
        assert!(body.contains("accessToken=token"));
    }

    #[test]
    fn test_parse_success() {
        let status: LockStatus = parse_response(r#"{"state": 1, "sensorState": 0}"#).unwrap();
        assert_eq!(status.locked, RemoteLockState::Unlocked);
    }

    #[test]
    fn test_parse_errcode_zero_is_success() {
        let value: serde_json::Value = parse_response(r#"{"errcode": 0, "errmsg": "none error message"}"#).unwrap();
        assert_eq!(value["errcode"], 0);
    }

    #[test]
    fn test_parse_rejection() {
        let err = parse_response::<serde_json::Value>(r#"{"errcode": -3003, "errmsg": "Gateway is busy"}"#)
            .unwrap_err();
        match err {
            TtlockError::RemoteRejection { code, message } => {
                assert_eq!(code, -3003);
                assert_eq!(message, "Gateway is busy");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_garbage_is_decode_error() {
        assert!(parse_response::<LockStatus>("<html>").unwrap_err().is_decode_error());
    }

    #[test]
    fn test_passage_mode_params() {
        let window = PassageModeWindow {
            enabled: true,
            auto_unlock: false,
            all_day: false,
            start_minute: 420,
            end_minute: 1200,
            week_days: [5, 1, 3].into_iter().collect(),
        };
        let params = passage_mode_params(LockId(1), &window).unwrap();
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };

        assert_eq!(get("passageMode"), "1");
        assert_eq!(get("autoUnlock"), "2");
        assert_eq!(get("isAllDay"), "2");
        assert_eq!(get("startDate"), "420");
        assert_eq!(get("weekDays"), "[1,3,5]");
        assert_eq!(get("type"), "2");
    }

    #[test]
    fn test_add_passcode_params_use_epoch_millis() {
        use chrono::TimeZone;

        let passcode = NewPasscode {
            passcode: "8642".to_string(),
            name: "Guest".to_string(),
            start: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            end: Utc.timestamp_opt(1_700_086_400, 0).unwrap(),
        };
        let params = add_passcode_params(LockId(1), &passcode);

        assert!(params.contains(&("keyboardPwd", "8642".to_string())));
        assert!(params.contains(&("startDate", "1700000000000".to_string())));
        assert!(params.contains(&("endDate", "1700086400000".to_string())));
        assert!(params.contains(&("addType", "2".to_string())));
    }

    #[test]
    fn test_record_params_skip_unset_bounds() {
        let params = record_params(LockId(1), &RecordQuery::new(None, None, Some(3), Some(500)));
        assert!(!params.iter().any(|(k, _)| *k == "startDate" || *k == "endDate"));
        assert!(params.contains(&("pageNo", "3".to_string())));
        assert!(params.contains(&("pageSize", "200".to_string())));
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(MAX_ERROR_BODY * 2);
        let truncated = truncate(&body);
        assert_eq!(truncated.len(), MAX_ERROR_BODY + 3);
        assert_eq!(truncate("short"), "short");
    }
}
