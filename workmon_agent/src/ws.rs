//! WebSocket metric source: one `get_metrics` request per acquisition.
//!
//! The connection is kept across ticks and thrown away after any transport
//! failure or timeout; the next fetch reconnects.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, http::StatusCode, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::config::Credentials;
use crate::error::SourceError;
use crate::source::MetricSource;
use crate::types::MetricsSnapshot;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsSource {
    url: Url,
    display: String,
    ws: Option<WsStream>,
}

impl WsSource {
    pub fn new(target: &str, credentials: Option<&Credentials>) -> Result<Self, url::ParseError> {
        let mut url = Url::parse(target)?;
        if let Some(c) = credentials {
            url.query_pairs_mut()
                .append_pair("user", &c.username)
                .append_pair("token", &c.password);
        }
        Ok(Self {
            url,
            display: target.to_string(),
            ws: None,
        })
    }

    async fn request(&mut self) -> Result<MetricsSnapshot, SourceError> {
        if self.ws.is_none() {
            let (ws, _) = connect_async(self.url.as_str()).await.map_err(classify)?;
            debug!(endpoint = %self.display, "connected");
            self.ws = Some(ws);
        }
        let Some(ws) = self.ws.as_mut() else {
            return Err(SourceError::Connection("not connected".into()));
        };

        ws.send(Message::Text("get_metrics".into()))
            .await
            .map_err(classify)?;
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(body))) => return parse_reply(&body),
                // tungstenite answers pings itself
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    return Err(SourceError::Connection(
                        "endpoint closed the connection".into(),
                    ))
                }
                Some(Ok(_)) => {
                    return Err(SourceError::Query("endpoint sent a non-text reply".into()))
                }
                Some(Err(e)) => return Err(classify(e)),
            }
        }
    }
}

impl MetricSource for WsSource {
    async fn fetch(&mut self) -> Result<MetricsSnapshot, SourceError> {
        let result = self.request().await;
        if let Err(SourceError::Connection(_) | SourceError::Permission(_)) = &result {
            self.ws = None;
        }
        result
    }

    fn abandon(&mut self) {
        self.ws = None;
    }

    fn describe(&self) -> String {
        self.display.clone()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ReplyErrorKind {
    Permission,
    Connection,
    #[default]
    #[serde(other)]
    Query,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    #[serde(default)]
    kind: ReplyErrorKind,
    #[serde(default)]
    message: String,
}

/// Decode one reply body: either a snapshot or an in-band `{"error": {...}}`.
pub fn parse_reply(body: &str) -> Result<MetricsSnapshot, SourceError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| SourceError::Query(format!("reply is not JSON: {e}")))?;
    if let Some(err) = value.get("error") {
        let reply: ErrorReply = serde_json::from_value(err.clone()).unwrap_or(ErrorReply {
            kind: ReplyErrorKind::Query,
            message: err.to_string(),
        });
        return Err(match reply.kind {
            ReplyErrorKind::Permission => SourceError::Permission(reply.message),
            ReplyErrorKind::Connection => SourceError::Connection(reply.message),
            ReplyErrorKind::Query => SourceError::Query(reply.message),
        });
    }
    serde_json::from_value(value)
        .map_err(|e| SourceError::Query(format!("incomplete snapshot: {e}")))
}

fn classify(err: tungstenite::Error) -> SourceError {
    match err {
        tungstenite::Error::Http(resp) => {
            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                SourceError::Permission(format!("endpoint refused access (HTTP {status})"))
            } else {
                SourceError::Connection(format!("handshake rejected (HTTP {status})"))
            }
        }
        other => SourceError::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_band_errors_keep_their_kind() {
        let perm = parse_reply(r#"{"error": {"kind": "permission", "message": "VIEW SERVER STATE"}}"#);
        assert!(matches!(perm, Err(SourceError::Permission(m)) if m == "VIEW SERVER STATE"));

        let odd = parse_reply(r#"{"error": {"kind": "disk_on_fire"}}"#);
        assert!(matches!(odd, Err(SourceError::Query(_))));

        let bare = parse_reply(r#"{"error": "boom"}"#);
        assert!(matches!(bare, Err(SourceError::Query(m)) if m.contains("boom")));
    }

    #[test]
    fn garbage_is_a_query_error() {
        assert!(matches!(parse_reply("not json"), Err(SourceError::Query(_))));
        assert!(matches!(
            parse_reply(r#"{"cpu": {"total_cpus": 4}}"#),
            Err(SourceError::Query(m)) if m.contains("incomplete")
        ));
    }

    #[test]
    fn credentials_go_into_the_handshake_query_only() {
        let creds = Credentials {
            username: "monitor".into(),
            password: "s3cret".into(),
        };
        let src = WsSource::new("ws://db01:9400/ws", Some(&creds)).unwrap();
        assert_eq!(src.url.query(), Some("user=monitor&token=s3cret"));
        assert_eq!(src.describe(), "ws://db01:9400/ws");
    }
}
