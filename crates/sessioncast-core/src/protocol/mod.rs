//! Wire messages exchanged with the relay.
//!
//! Every frame on the socket is a JSON object discriminated by a `type`
//! field. Unknown fields are ignored on decode; an unknown `type` is a
//! decode error the transport logs and drops.

use serde::{Deserialize, Serialize};

use crate::error::SessionCastError;

/// The closed set of relay messages.
///
/// `Register` through `UploadError` travel agent → relay, the rest relay
/// → agent. The file-transfer family (`FileView`, `UploadFile`,
/// `UploadComplete`, `UploadError`, `RequestFileView`) round-trips
/// through the codec but chunk assembly is not this crate's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    // Agent → relay.
    #[serde(rename = "register", rename_all = "camelCase")]
    Register {
        machine_id: String,
        label: String,
        token: String,
        role: String,
    },

    /// `screen` is base64 of the UTF-8 frame text (clear-home prefix plus
    /// pane content).
    #[serde(rename = "screen", rename_all = "camelCase")]
    Screen { session_name: String, screen: String },

    /// `screen` is base64 of the gzipped frame text.
    #[serde(rename = "screenGz", rename_all = "camelCase")]
    ScreenGz { session_name: String, screen: String },

    #[serde(rename = "sessions")]
    Sessions { sessions: Vec<SessionInfo> },

    #[serde(rename = "file_view", rename_all = "camelCase")]
    FileView {
        filename: String,
        content: String,
        content_type: String,
        path: String,
    },

    #[serde(rename = "uploadComplete")]
    UploadComplete {
        filename: String,
        path: String,
        size: u64,
    },

    #[serde(rename = "uploadError")]
    UploadError { filename: String, error: String },

    // Relay → agent.
    #[serde(rename = "keys", rename_all = "camelCase")]
    Keys {
        session_name: String,
        keys: String,
        /// Absent means false.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        enter: Option<bool>,
    },

    #[serde(rename = "resize", rename_all = "camelCase")]
    Resize {
        session_name: String,
        cols: u16,
        rows: u16,
    },

    #[serde(rename = "createSession", rename_all = "camelCase")]
    CreateSession {
        session_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        work_dir: Option<String>,
    },

    #[serde(rename = "killSession", rename_all = "camelCase")]
    KillSession { session_name: String },

    #[serde(rename = "requestFileView", rename_all = "camelCase")]
    RequestFileView { session_name: String, path: String },

    #[serde(rename = "uploadFile", rename_all = "camelCase")]
    UploadFile {
        session_name: String,
        filename: String,
        content: String,
        chunk_index: u32,
        total_chunks: u32,
    },

    #[serde(rename = "error")]
    Error { code: String, message: String },

    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "pong")]
    Pong,
}

/// One entry of the `sessions` inventory message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub name: String,
    pub windows: u32,
    pub attached: bool,
}

impl Message {
    /// The registration frame sent first after every open.
    pub fn register(machine_id: &str, label: &str, token: &str) -> Self {
        Message::Register {
            machine_id: machine_id.to_string(),
            label: label.to_string(),
            token: token.to_string(),
            role: "host".to_string(),
        }
    }

    /// The wire discriminant, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Register { .. } => "register",
            Message::Screen { .. } => "screen",
            Message::ScreenGz { .. } => "screenGz",
            Message::Sessions { .. } => "sessions",
            Message::FileView { .. } => "file_view",
            Message::UploadComplete { .. } => "uploadComplete",
            Message::UploadError { .. } => "uploadError",
            Message::Keys { .. } => "keys",
            Message::Resize { .. } => "resize",
            Message::CreateSession { .. } => "createSession",
            Message::KillSession { .. } => "killSession",
            Message::RequestFileView { .. } => "requestFileView",
            Message::UploadFile { .. } => "uploadFile",
            Message::Error { .. } => "error",
            Message::Ping => "ping",
            Message::Pong => "pong",
        }
    }
}

/// Encode a message to its wire form.
pub fn encode(message: &Message) -> Result<String, SessionCastError> {
    serde_json::to_string(message).map_err(SessionCastError::Encode)
}

/// Decode a wire frame into a message.
pub fn decode(json: &str) -> Result<Message, SessionCastError> {
    serde_json::from_str(json).map_err(SessionCastError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_message_type() {
        let messages = vec![
            Message::register("m1", "dev box", "agt_x"),
            Message::Screen {
                session_name: "main".into(),
                screen: "aGVsbG8=".into(),
            },
            Message::ScreenGz {
                session_name: "main".into(),
                screen: "H4sIAAA=".into(),
            },
            Message::Sessions {
                sessions: vec![SessionInfo {
                    name: "main".into(),
                    windows: 3,
                    attached: true,
                }],
            },
            Message::FileView {
                filename: "a.txt".into(),
                content: "YQ==".into(),
                content_type: "text/plain".into(),
                path: "/tmp/a.txt".into(),
            },
            Message::UploadComplete {
                filename: "a.txt".into(),
                path: "/tmp/a.txt".into(),
                size: 42,
            },
            Message::UploadError {
                filename: "a.txt".into(),
                error: "disk full".into(),
            },
            Message::Keys {
                session_name: "main".into(),
                keys: "ls".into(),
                enter: Some(true),
            },
            Message::Resize {
                session_name: "main".into(),
                cols: 120,
                rows: 40,
            },
            Message::CreateSession {
                session_name: "work".into(),
                work_dir: Some("/home/dev".into()),
            },
            Message::KillSession {
                session_name: "work".into(),
            },
            Message::RequestFileView {
                session_name: "main".into(),
                path: "/tmp/a.txt".into(),
            },
            Message::UploadFile {
                session_name: "main".into(),
                filename: "a.txt".into(),
                content: "YQ==".into(),
                chunk_index: 0,
                total_chunks: 3,
            },
            Message::Error {
                code: "AUTH_FAILED".into(),
                message: "bad token".into(),
            },
            Message::Ping,
            Message::Pong,
        ];

        for message in messages {
            let json = encode(&message).unwrap();
            let decoded = decode(&json).unwrap();
            assert_eq!(decoded, message, "round trip failed for {json}");
        }
    }

    #[test]
    fn wire_field_names_are_camel_case() {
        let json = encode(&Message::register("m1", "lab", "agt_x")).unwrap();
        assert!(json.contains(r#""type":"register""#));
        assert!(json.contains(r#""machineId":"m1""#));
        assert!(json.contains(r#""role":"host""#));

        let json = encode(&Message::ScreenGz {
            session_name: "main".into(),
            screen: "x".into(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"screenGz""#));
        assert!(json.contains(r#""sessionName":"main""#));

        let json = encode(&Message::UploadFile {
            session_name: "main".into(),
            filename: "a".into(),
            content: "x".into(),
            chunk_index: 1,
            total_chunks: 2,
        })
        .unwrap();
        assert!(json.contains(r#""chunkIndex":1"#));
        assert!(json.contains(r#""totalChunks":2"#));
    }

    #[test]
    fn missing_enter_decodes_as_none() {
        let decoded = decode(r#"{"type":"keys","sessionName":"s1","keys":"ls"}"#).unwrap();
        assert_eq!(
            decoded,
            Message::Keys {
                session_name: "s1".into(),
                keys: "ls".into(),
                enter: None,
            }
        );
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let decoded = decode(
            r#"{"type":"resize","sessionName":"s1","cols":80,"rows":24,"trace":"zz","v":2}"#,
        )
        .unwrap();
        assert_eq!(
            decoded,
            Message::Resize {
                session_name: "s1".into(),
                cols: 80,
                rows: 24,
            }
        );
    }

    #[test]
    fn unknown_type_is_a_decode_error() {
        let err = decode(r#"{"type":"teleport","sessionName":"s1"}"#).unwrap_err();
        assert!(matches!(err, SessionCastError::Decode(_)));
        assert_eq!(err.code(), "DECODE_ERROR");
    }

    #[test]
    fn ping_and_pong_are_bare_objects() {
        assert_eq!(encode(&Message::Ping).unwrap(), r#"{"type":"ping"}"#);
        assert_eq!(encode(&Message::Pong).unwrap(), r#"{"type":"pong"}"#);
        assert_eq!(decode(r#"{"type":"ping"}"#).unwrap(), Message::Ping);
    }
}
