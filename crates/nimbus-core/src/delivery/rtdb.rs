use alloc::string::String;

use embassy_time::Duration;
use log::{debug, warn};
use thiserror_no_std::Error;

use crate::config::SecondarySinkConfig;
use crate::net::{HttpClient, HttpRequest, NetError, encode_query_value};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("store not ready")]
    NotReady,
    #[error("transport error: {0}")]
    Net(NetError),
    #[error("write rejected with HTTP {0}")]
    Rejected(u16),
}

/// A tree of JSON documents addressed by slash-separated paths.
pub trait DocumentStore {
    /// Whether writes can currently be attempted.
    fn is_ready(&self) -> bool;

    /// Replace the document at `path` with `json`.
    fn put(&mut self, path: &str, json: &str) -> impl Future<Output = Result<(), StoreError>>;
}

/// Realtime-database REST adapter: `PUT /{path}.json?auth={token}`
pub struct RtdbStore<H> {
    http: H,
    host: String,
    port: u16,
    auth_token: String,
    timeout: Duration,
}

impl<H: HttpClient> RtdbStore<H> {
    pub fn new(http: H, config: &SecondarySinkConfig) -> Self {
        Self {
            http,
            host: config.host.clone(),
            port: config.port,
            auth_token: config.auth_token.clone(),
            timeout: config.request_timeout(),
        }
    }

    fn request_path(&self, path: &str) -> String {
        let mut out = String::with_capacity(path.len() + self.auth_token.len() + 16);
        out.push('/');
        out.push_str(path.trim_start_matches('/'));
        out.push_str(".json");
        if !self.auth_token.is_empty() {
            out.push_str("?auth=");
            encode_query_value(&self.auth_token, &mut out);
        }
        out
    }

    pub fn http(&self) -> &H {
        &self.http
    }
}

impl<H: HttpClient> DocumentStore for RtdbStore<H> {
    fn is_ready(&self) -> bool {
        !self.host.is_empty() && self.http.link_up()
    }

    async fn put(&mut self, path: &str, json: &str) -> Result<(), StoreError> {
        if !self.is_ready() {
            return Err(StoreError::NotReady);
        }

        let request = HttpRequest::put_json(
            &self.host,
            self.port,
            self.request_path(path),
            String::from(json),
            self.timeout,
        );
        debug!("store: PUT {} ({} bytes)", path, json.len());

        let response = self.http.send(&request).await.map_err(|e| {
            warn!("store: PUT {} failed: {}", path, e);
            StoreError::Net(e)
        })?;

        if response.is_success() {
            Ok(())
        } else {
            warn!("store: PUT {} rejected: HTTP {}", path, response.status);
            Err(StoreError::Rejected(response.status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{HttpResponse, Method};
    use crate::testing::ScriptedHttp;
    use embassy_futures::block_on;

    fn store(http: &ScriptedHttp, token: &str) -> RtdbStore<ScriptedHttp> {
        let config = SecondarySinkConfig {
            host: String::from("nimbus-default-rtdb.example.com"),
            auth_token: String::from(token),
            ..SecondarySinkConfig::default()
        };
        RtdbStore::new(http.clone(), &config)
    }

    #[test]
    fn put_targets_json_path_with_auth() {
        let http = ScriptedHttp::new();
        let mut store = store(&http, "s3cr3t/=");

        block_on(store.put("devices/A1/status", "{\"online\":true}")).unwrap();

        let request = &http.requests()[0];
        assert_eq!(request.method, Method::Put);
        assert_eq!(request.path, "/devices/A1/status.json?auth=s3cr3t%2F%3D");
        assert_eq!(request.body.as_deref(), Some("{\"online\":true}"));
    }

    #[test]
    fn no_token_no_query() {
        let http = ScriptedHttp::new();
        let mut store = store(&http, "");

        block_on(store.put("/devices/A1/info", "{}")).unwrap();

        assert_eq!(http.requests()[0].path, "/devices/A1/info.json");
    }

    #[test]
    fn errors_are_classified() {
        let http = ScriptedHttp::new();
        let mut store = store(&http, "t");

        http.push_response(Ok(HttpResponse::new(401, "{\"error\":\"Permission denied\"}")));
        assert_eq!(
            block_on(store.put("a", "{}")),
            Err(StoreError::Rejected(401))
        );

        http.push_response(Err(NetError::Timeout));
        assert_eq!(
            block_on(store.put("a", "{}")),
            Err(StoreError::Net(NetError::Timeout))
        );

        http.set_link_up(false);
        assert!(!store.is_ready());
        assert_eq!(block_on(store.put("a", "{}")), Err(StoreError::NotReady));
    }
}
