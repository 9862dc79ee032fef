/// Transmission RPC message types.
use super::TransferState;
use serde::{Deserialize, Serialize};

/// Fields requested by `torrent-get`
pub(super) const TORRENT_FIELDS: &[&str] = &[
    "id",
    "name",
    "status",
    "percentDone",
    "error",
    "errorString",
    "totalSize",
];

const STATUS_STOPPED: i64 = 0;
const STATUS_SEED_WAIT: i64 = 5;
const STATUS_SEEDING: i64 = 6;

/// Local errors stop the transfer; tracker errors (1, 2) are only warnings
const ERROR_LOCAL: i64 = 3;

#[derive(Debug, Serialize)]
pub(super) struct RpcRequest<'a, A> {
    pub method: &'a str,
    pub arguments: A,
}

#[derive(Debug, Deserialize)]
pub(super) struct RpcResponse<A> {
    pub result: String,
    pub arguments: Option<A>,
}

#[derive(Debug, Serialize)]
pub(super) struct TorrentAddArguments<'a> {
    pub filename: &'a str,
    #[serde(rename = "download-dir")]
    pub download_dir: &'a str,
}

#[derive(Debug, Deserialize)]
pub(super) struct TorrentAddResult {
    #[serde(rename = "torrent-added")]
    pub added: Option<TorrentRef>,
    #[serde(rename = "torrent-duplicate")]
    pub duplicate: Option<TorrentRef>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TorrentRef {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct TorrentGetArguments<'a> {
    pub ids: [i64; 1],
    pub fields: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
pub(super) struct TorrentGetResult {
    pub torrents: Vec<TorrentInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TorrentInfo {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub percent_done: f64,
    #[serde(default)]
    pub error: i64,
    #[serde(default)]
    pub error_string: String,
    #[serde(default)]
    pub total_size: u64,
}

impl TorrentInfo {
    /// Maps daemon status fields to a transfer state
    pub fn state(self) -> TransferState {
        if self.error == ERROR_LOCAL {
            return TransferState::Failed {
                reason: self.error_string,
            };
        }

        let finished = self.percent_done >= 1.0
            || matches!(self.status, STATUS_SEED_WAIT | STATUS_SEEDING);
        if finished {
            return TransferState::Completed { name: self.name };
        }

        if self.status == STATUS_STOPPED {
            return TransferState::Failed {
                reason: format!("transfer stopped at {:.0}%", self.percent_done * 100.0),
            };
        }

        TransferState::InProgress {
            fraction: self.percent_done,
            total_bytes: self.total_size,
        }
    }
}
