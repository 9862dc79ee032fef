/// Transmission daemon client implementation.
use super::transmission_types::{
    RpcRequest, RpcResponse, TORRENT_FIELDS, TorrentAddArguments, TorrentAddResult,
    TorrentGetArguments, TorrentGetResult,
};
use super::{TransferClient, TransferError, TransferHandle, TransferState};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::path::Path;
use tracing::{debug, info};

const SESSION_HEADER: &str = "X-Transmission-Session-Id";

/// Client for the Transmission JSON-RPC interface.
///
/// Transmission answers the first request of a session with 409 and a
/// session id header that must accompany every later request. The id is kept
/// for the lifetime of the client, so one client serves a whole season run.
pub struct TransmissionClient {
    client: Client,
    url: String,
    username: Option<String>,
    password: Option<String>,
    session_id: RefCell<Option<String>>,
}

impl TransmissionClient {
    /// Creates a client for the RPC endpoint at `url`
    pub fn new(
        client: Client,
        url: impl Into<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            username,
            password,
            session_id: RefCell::new(None),
        }
    }

    /// Sends one RPC call, renewing the session id once if the daemon asks
    fn call<A, R>(&self, method: &str, arguments: A) -> Result<R, TransferError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let request = RpcRequest { method, arguments };

        for _ in 0..2 {
            let mut builder = self.client.post(&self.url).json(&request);
            if let Some(username) = &self.username {
                builder = builder.basic_auth(username, self.password.as_ref());
            }
            if let Some(session_id) = self.session_id.borrow().as_deref() {
                builder = builder.header(SESSION_HEADER, session_id);
            }

            let response = builder
                .send()
                .map_err(|e| TransferError::Connection(e.to_string()))?;

            match response.status() {
                StatusCode::CONFLICT => {
                    let session_id = response
                        .headers()
                        .get(SESSION_HEADER)
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_string);
                    debug!("renewing transmission session id");
                    *self.session_id.borrow_mut() = session_id;
                    continue;
                }
                StatusCode::UNAUTHORIZED => {
                    return Err(TransferError::Rejected(
                        "authentication failed, check the transmission credentials".to_string(),
                    ));
                }
                status if !status.is_success() => {
                    return Err(TransferError::Rejected(format!(
                        "HTTP {} {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown")
                    )));
                }
                _ => {}
            }

            let body: RpcResponse<R> = response
                .json()
                .map_err(|e| TransferError::InvalidResponse(e.to_string()))?;

            if body.result != "success" {
                return Err(TransferError::Rejected(body.result));
            }

            return body.arguments.ok_or_else(|| {
                TransferError::InvalidResponse(format!("{method} returned no arguments"))
            });
        }

        Err(TransferError::Rejected(
            "session id handshake did not succeed".to_string(),
        ))
    }
}

impl TransferClient for TransmissionClient {
    fn begin(
        &self,
        resource_locator: &str,
        target_dir: &Path,
    ) -> Result<TransferHandle, TransferError> {
        let download_dir = target_dir.to_string_lossy();
        let result: TorrentAddResult = self.call(
            "torrent-add",
            TorrentAddArguments {
                filename: resource_locator,
                download_dir: &download_dir,
            },
        )?;

        let torrent = result.added.or(result.duplicate).ok_or_else(|| {
            TransferError::InvalidResponse("torrent-add returned no torrent".to_string())
        })?;

        info!(
            id = torrent.id,
            name = torrent.name.as_deref().unwrap_or("unknown"),
            "transfer started"
        );
        Ok(TransferHandle(torrent.id))
    }

    fn poll(&self, handle: TransferHandle) -> Result<TransferState, TransferError> {
        let result: TorrentGetResult = self.call(
            "torrent-get",
            TorrentGetArguments {
                ids: [handle.0],
                fields: TORRENT_FIELDS,
            },
        )?;

        result
            .torrents
            .into_iter()
            .find(|torrent| torrent.id == handle.0)
            .map(|torrent| torrent.state())
            .ok_or_else(|| {
                TransferError::InvalidResponse(format!("torrent {} is no longer known", handle.0))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::super::transmission_types::TorrentInfo;
    use super::*;

    fn parse_get(json: &str) -> TorrentGetResult {
        serde_json::from_str::<RpcResponse<TorrentGetResult>>(json)
            .unwrap()
            .arguments
            .unwrap()
    }

    fn first_state(json: &str) -> TransferState {
        parse_get(json).torrents.remove(0).state()
    }

    #[test]
    fn test_downloading_torrent_is_in_progress() {
        let state = first_state(
            r#"{"result":"success","arguments":{"torrents":[
                {"id":3,"name":"The.Office.S01E02.720p.HDTV.x264-LOL.mkv","status":4,
                 "percentDone":0.42,"error":0,"errorString":"","totalSize":367001600}]}}"#,
        );
        assert_eq!(
            state,
            TransferState::InProgress {
                fraction: 0.42,
                total_bytes: 367001600
            }
        );
    }

    #[test]
    fn test_seeding_torrent_is_completed() {
        let state = first_state(
            r#"{"result":"success","arguments":{"torrents":[
                {"id":3,"name":"The.Office.S01E02.720p.HDTV.x264-LOL.mkv","status":6,"percentDone":1.0}]}}"#,
        );
        assert_eq!(
            state,
            TransferState::Completed {
                name: "The.Office.S01E02.720p.HDTV.x264-LOL.mkv".to_string()
            }
        );
    }

    #[test]
    fn test_local_error_is_failure_but_tracker_warning_is_not() {
        let failed = TorrentInfo {
            id: 1,
            name: String::new(),
            status: 0,
            percent_done: 0.3,
            error: 3,
            error_string: "No space left on device".to_string(),
            total_size: 0,
        };
        assert_eq!(
            failed.state(),
            TransferState::Failed {
                reason: "No space left on device".to_string()
            }
        );

        let warned = TorrentInfo {
            id: 1,
            name: String::new(),
            status: 4,
            percent_done: 0.3,
            error: 1,
            error_string: "Tracker gave HTTP response code 404".to_string(),
            total_size: 10,
        };
        assert!(matches!(warned.state(), TransferState::InProgress { .. }));
    }

    #[test]
    fn test_stopped_torrent_is_failure() {
        let stopped = TorrentInfo {
            id: 1,
            name: "x".to_string(),
            status: 0,
            percent_done: 0.5,
            error: 0,
            error_string: String::new(),
            total_size: 10,
        };
        assert_eq!(
            stopped.state(),
            TransferState::Failed {
                reason: "transfer stopped at 50%".to_string()
            }
        );
    }

    #[test]
    fn test_add_result_accepts_duplicate() {
        let result: RpcResponse<TorrentAddResult> = serde_json::from_str(
            r#"{"result":"success","arguments":{"torrent-duplicate":{"id":7,"name":"x","hashString":"abc"}}}"#,
        )
        .unwrap();
        let arguments = result.arguments.unwrap();
        assert!(arguments.added.is_none());
        assert_eq!(arguments.duplicate.unwrap().id, 7);
    }

    #[test]
    fn test_add_request_serializes_download_dir() {
        let request = RpcRequest {
            method: "torrent-add",
            arguments: TorrentAddArguments {
                filename: "magnet:?xt=urn:btih:aaa",
                download_dir: "/media/the-office/season01/episode02",
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["method"], "torrent-add");
        assert_eq!(
            json["arguments"]["download-dir"],
            "/media/the-office/season01/episode02"
        );
    }
}
