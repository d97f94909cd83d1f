//! Bridge wire protocol: message types and framing.
//!
//! Frame format is the Chrome native-messaging one: a 4-byte little-endian
//! length prefix followed by a UTF-8 JSON body, at most 1 MiB.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::models::{is_internal_url, TabSnapshotEntry};

/// Maximum frame body size.
pub const MAX_FRAME_LEN: usize = 1_048_576;

/// One tab as the extension reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTab {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "favIconUrl", default)]
    pub fav_icon_url: Option<String>,
    #[serde(rename = "windowId", default)]
    pub window_id: i64,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub pinned: bool,
}

impl WireTab {
    /// Convert to a snapshot entry; `None` for browser-internal URLs.
    pub fn to_entry(&self) -> Option<TabSnapshotEntry> {
        if is_internal_url(&self.url) {
            return None;
        }
        Some(TabSnapshotEntry {
            url: self.url.clone(),
            title: self.title.clone(),
            favicon_url: self.fav_icon_url.clone(),
            pinned: self.pinned,
            window_group: self.window_id,
        })
    }
}

/// Messages exchanged with the extension, both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    /// Extension asks which session is active.
    GetActiveSession,
    /// Core tells the extension which session tab pushes belong to.
    SessionActive { session_id: String },
    /// Core tells the extension no session is active.
    SessionNone,
    /// Core asks for an immediate tab snapshot.
    RequestTabs { session_id: String },
    /// Extension pushes a full-replacement tab snapshot.
    TabsSnapshot {
        session_id: String,
        #[serde(default)]
        tabs: Vec<WireTab>,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    /// Extension-side request to change the active session. The core does
    /// not honor it; it answers with the actual active session.
    SetActiveSession { session_id: String },
    /// Extension-side request for an out-of-band snapshot.
    ForceSnapshot { session_id: String },
}

/// Encode one message into a length-prefixed frame.
pub fn encode_frame(msg: &BridgeMessage) -> Result<Vec<u8>, serde_json::Error> {
    let body = serde_json::to_vec(msg)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&u32::try_from(body.len()).unwrap_or(u32::MAX).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode one frame body into a message.
pub fn decode_frame(body: &[u8]) -> Result<BridgeMessage, serde_json::Error> {
    serde_json::from_slice(body)
}

/// Read one frame body from the stream. An oversized or zero-length prefix
/// is an `InvalidData` error; the caller treats it as a lost connection.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len == 0 || len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame length {len} out of bounds"),
        ));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Write one message as a frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &BridgeMessage,
) -> std::io::Result<()> {
    let frame = encode_frame(msg)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writer.write_all(&frame).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let msg = BridgeMessage::SessionActive {
            session_id: "s-1".into(),
        };

        write_frame(&mut a, &msg).await.unwrap();
        let body = read_frame(&mut b).await.unwrap();
        let decoded = decode_frame(&body).unwrap();
        assert!(matches!(
            decoded,
            BridgeMessage::SessionActive { session_id } if session_id == "s-1"
        ));
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let len = u32::try_from(MAX_FRAME_LEN + 1).unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut a, &len.to_le_bytes())
            .await
            .unwrap();

        let err = read_frame(&mut b).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn tabs_snapshot_parses_extension_payload() {
        let json = r#"{
            "type": "tabs_snapshot",
            "session_id": "s-1",
            "timestamp": "2024-05-01T12:00:00Z",
            "tabs": [
                {"id": 3, "title": "Docs", "url": "https://example.com",
                 "favIconUrl": "https://example.com/i.png", "windowId": 7,
                 "active": true, "pinned": false}
            ]
        }"#;
        let msg = decode_frame(json.as_bytes()).unwrap();
        match msg {
            BridgeMessage::TabsSnapshot {
                session_id, tabs, ..
            } => {
                assert_eq!(session_id, "s-1");
                assert_eq!(tabs.len(), 1);
                let entry = tabs[0].to_entry().unwrap();
                assert_eq!(entry.window_group, 7);
                assert_eq!(entry.favicon_url.as_deref(), Some("https://example.com/i.png"));
            }
            other => panic!("expected tabs_snapshot, got {other:?}"),
        }
    }

    #[test]
    fn internal_urls_are_filtered_at_conversion() {
        let tab = WireTab {
            id: Some(1),
            title: "settings".into(),
            url: "chrome://settings".into(),
            fav_icon_url: None,
            window_id: 1,
            active: false,
            pinned: false,
        };
        assert!(tab.to_entry().is_none());
    }

    #[test]
    fn unknown_message_type_is_an_error_not_a_panic() {
        assert!(decode_frame(br#"{"type":"mystery"}"#).is_err());
        assert!(decode_frame(b"garbage").is_err());
    }

    #[test]
    fn message_json_uses_snake_case_tags() {
        let json = serde_json::to_string(&BridgeMessage::SessionNone).unwrap();
        assert_eq!(json, r#"{"type":"session_none"}"#);

        let json = serde_json::to_string(&BridgeMessage::RequestTabs {
            session_id: "s-9".into(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"request_tabs""#));
    }
}
