use serde::{Deserialize, Serialize};
use serde_json::Value;

use im_domain::ConversationId;

/// Result of `create_conversation`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedConversation {
    pub conversation_id: ConversationId,
    /// Routing address the stream should subscribe to, when the service
    /// returned one.
    pub channel_address: Option<String>,
    pub status: u16,
}

/// Result of `send_message`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentMessage {
    pub message_id: String,
    /// Whatever the service returned with the 202, often empty.
    pub response: Value,
}

/// Result of `send_file`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentFile {
    pub message_id: String,
    pub file_id: String,
    pub file_name: String,
    /// Bytes uploaded.
    pub size: u64,
    pub response: Value,
}

/// Paging direction for conversation entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntriesDirection {
    #[default]
    FromEnd,
    FromStart,
}

impl EntriesDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FromEnd => "FromEnd",
            Self::FromStart => "FromStart",
        }
    }
}

impl std::fmt::Display for EntriesDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntriesDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fromend" | "from_end" | "end" => Ok(Self::FromEnd),
            "fromstart" | "from_start" | "start" => Ok(Self::FromStart),
            other => Err(format!("unknown direction \"{other}\" (expected FromEnd or FromStart)")),
        }
    }
}

// ── Wire bodies ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateConversationBody<'a> {
    pub conversation_id: &'a str,
    pub es_developer_name: &'a str,
    pub language: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_attributes: Option<&'a Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendMessageBody<'a> {
    pub message: StaticContentMessage<'a>,
    pub es_developer_name: &'a str,
    pub language: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StaticContentMessage<'a> {
    pub id: &'a str,
    pub message_type: &'static str,
    pub static_content: StaticContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StaticContent<'a> {
    pub format_type: &'static str,
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EntryBody<'a> {
    pub entry_type: &'static str,
    pub id: &'a str,
}

/// JSON part of the multipart file upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileMessageEntry<'a> {
    pub es_developer_name: &'a str,
    pub message: FileMessage<'a>,
    pub language: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileMessage<'a> {
    pub id: &'a str,
    pub file_id: &'a str,
    /// Caption shown with the attachment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateConversationResponse {
    #[serde(default)]
    pub channel_address_identifier: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_body_matches_wire_shape() {
        let body = SendMessageBody {
            message: StaticContentMessage {
                id: "m-1",
                message_type: "StaticContentMessage",
                static_content: StaticContent {
                    format_type: "Text",
                    text: "hello",
                },
            },
            es_developer_name: "Web_Chat",
            language: "en_US",
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "message": {
                    "id": "m-1",
                    "messageType": "StaticContentMessage",
                    "staticContent": { "formatType": "Text", "text": "hello" }
                },
                "esDeveloperName": "Web_Chat",
                "language": "en_US"
            })
        );
    }

    #[test]
    fn routing_attributes_are_omitted_when_absent() {
        let body = CreateConversationBody {
            conversation_id: "c",
            es_developer_name: "Web_Chat",
            language: "en_US",
            routing_attributes: None,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert!(v.get("routingAttributes").is_none());
        assert_eq!(v["conversationId"], "c");
    }

    #[test]
    fn file_entry_omits_a_missing_caption() {
        let entry = FileMessageEntry {
            es_developer_name: "Web_Chat",
            message: FileMessage {
                id: "m-1",
                file_id: "f-1",
                text: None,
            },
            language: "en_US",
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "esDeveloperName": "Web_Chat",
                "message": { "id": "m-1", "fileId": "f-1" },
                "language": "en_US"
            })
        );
    }

    #[test]
    fn direction_parses_loosely() {
        assert_eq!("FromStart".parse::<EntriesDirection>().unwrap(), EntriesDirection::FromStart);
        assert_eq!("end".parse::<EntriesDirection>().unwrap(), EntriesDirection::FromEnd);
        assert!("sideways".parse::<EntriesDirection>().is_err());
    }
}
