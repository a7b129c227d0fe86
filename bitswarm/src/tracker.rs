use std::net::IpAddr;
use std::time::Duration;

use serde_derive::Deserialize;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum TrackerError {

    #[error("request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("error deserializing tracker response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tracker returned a failure: {0}")]
    Response(String),

}

type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Started,
    Stopped,
    Completed,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Started => write!(f, "started"),
            Event::Stopped => write!(f, "stopped"),
            Event::Completed => write!(f, "completed"),
        }
    }
}

// A peer as reported by the tracker's announce response.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerPeer {
    pub peer_id: String,
    pub ip: IpAddr,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnounceResponse {
    pub tracker_id: String,
    pub info_hash: String,
    pub peers: Vec<TrackerPeer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeResponse {
    pub tracker_id: String,
    pub info_hash: String,
    pub total_peers: u64,
}

// The parameters needed to build an announce request, set once at
// engine start and updated as the download progresses.
#[derive(Debug, Clone)]
pub struct AnnounceParams {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub ip: IpAddr,
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
}

// A minimal HTTP client that sends one request to the tracker and reads
// the JSON response to EOF. No retry or interval scheduling is carried
// here — that lives with the swarm coordinator.
pub struct TrackerClient {
    client: reqwest::blocking::Client,
    base_url: Url,
}

impl TrackerClient {

    pub fn new(base_url: Url) -> Self {
        Self {
            client: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client builder should not fail with default settings"),
            base_url,
        }
    }

    pub fn announce(&self, params: &AnnounceParams, event: Event) -> Result<AnnounceResponse> {
        let url = format!(
            "{}?info_hash={}&peer_id={}&ip={}&port={}&uploaded={}&downloaded={}&left={}&compact=0&event={}",
            self.base_url.join("announce").unwrap_or_else(|_| self.base_url.clone()),
            urlencoding::encode_binary(&params.info_hash),
            urlencoding::encode_binary(&params.peer_id),
            params.ip,
            params.port,
            params.uploaded,
            params.downloaded,
            params.left,
            event,
        );

        tracing::debug!(%event, "sending announce");
        let resp = self.client.get(&url).send()?;
        let body = resp.bytes()?;
        let parsed: AnnounceResponse = serde_json::from_slice(&body)?;
        tracing::debug!(peers = parsed.peers.len(), "received announce response");
        Ok(parsed)
    }

    pub fn scrape(&self, info_hash: &[u8; 20]) -> Result<ScrapeResponse> {
        let url = format!(
            "{}?info_hash={}",
            self.base_url.join("scrape").unwrap_or_else(|_| self.base_url.clone()),
            urlencoding::encode_binary(info_hash),
        );
        let resp = self.client.get(&url).send()?;
        let body = resp.bytes()?;
        let parsed: ScrapeResponse = serde_json::from_slice(&body)?;
        Ok(parsed)
    }
}
