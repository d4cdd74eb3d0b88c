// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Text wire protocol spoken with the programmer.
//!
//! Every outbound command is one UTF-8 write. Every inbound notification is
//! one complete message; there are no ids or sequence numbers.

use std::fmt;

/// Commands sent to the programmer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Read,
    /// Encoded 48-character tag record.
    Write(String),
    Wipe,
    Cancel,
    WifiConfig { ssid: String, password: String },
    OtaUpdate { url: String },
    GetVersion,
}

impl Command {
    /// Short name used in logs. Never includes secrets.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Write(_) => "WRITE",
            Self::Wipe => "WIPE",
            Self::Cancel => "CANCEL",
            Self::WifiConfig { .. } => "WIFI_CONFIG",
            Self::OtaUpdate { .. } => "OTA_UPDATE",
            Self::GetVersion => "GET_VERSION",
        }
    }

    /// Serialize to the exact text the firmware expects.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Write(record) => format!("WRITE:{}", record),
            Self::WifiConfig { ssid, password } => format!("WIFI_CONFIG:{},{}", ssid, password),
            Self::OtaUpdate { url } => format!("OTA_UPDATE:{}", url),
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable tag summary reported by `TAG_DATA:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub material: String,
    pub length: String,
    /// RGB hex without the leading `#`.
    pub color: String,
    /// Serial without the `S/N:` prefix.
    pub serial: String,
}

/// Messages received from the programmer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    Version(String),
    TagData(TagInfo),
    /// `TAG_DATA:` with fewer than four fields.
    MalformedTagData(String),
    BlankTag,
    Error(String),
    Tag1Written,
    /// Second tag written, or the whole write reported complete.
    Tag2Written,
    WipeOk,
    WifiOk,
    UpdateSuccess,
    Disconnected,
    UpToDate,
    UpdateAvailable { version: String, url: String },
    /// Payload that was not valid UTF-8.
    Diagnostic(String),
    Other(String),
}

impl DeviceMessage {
    /// Decode one notification payload.
    pub fn from_payload(payload: &[u8]) -> Self {
        match std::str::from_utf8(payload) {
            Ok(text) => Self::parse(text),
            Err(_) => Self::Diagnostic(format!("<non-utf8> 0x{}", hex::encode_upper(payload))),
        }
    }

    /// Parse one text message. Trailing whitespace and NULs are ignored.
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim_end_matches(|c: char| c == '\0' || c.is_whitespace());

        if let Some(version) = text.strip_prefix("VERSION:") {
            return Self::Version(clean_version(version));
        }
        if let Some(payload) = text.strip_prefix("TAG_DATA:") {
            return parse_tag_data(payload);
        }
        if let Some(reason) = text.strip_prefix("ERROR:") {
            return Self::Error(reason.trim().to_string());
        }
        if let Some(rest) = text.strip_prefix("UPDATE_AVAILABLE:") {
            if let Some((version, url)) = rest.split_once(',') {
                return Self::UpdateAvailable {
                    version: clean_version(version),
                    url: url.trim().to_string(),
                };
            }
            return Self::Other(text.to_string());
        }

        match text {
            "BLANK_TAG" => Self::BlankTag,
            "WIPE_OK" => Self::WipeOk,
            "WIFI_OK" => Self::WifiOk,
            "UPDATE_SUCCESS" => Self::UpdateSuccess,
            "DISCONNECTED" => Self::Disconnected,
            "UP_TO_DATE" => Self::UpToDate,
            "TAG1_WRITTEN" | "TAG1_OK" => Self::Tag1Written,
            "TAG2_WRITTEN" | "TAG2_OK" => Self::Tag2Written,
            _ if text.contains("WRITE_COMPLETE") => Self::Tag2Written,
            // Older firmware reports progress as free text.
            _ if text.contains("Tag 1") => Self::Tag1Written,
            _ if text.contains("Tag 2") => Self::Tag2Written,
            _ => Self::Other(text.to_string()),
        }
    }
}

fn clean_version(raw: &str) -> String {
    raw.replace('\0', "").trim().to_string()
}

fn parse_tag_data(payload: &str) -> DeviceMessage {
    let parts: Vec<&str> = payload.split('|').map(str::trim).collect();
    if parts.len() < 4 {
        return DeviceMessage::MalformedTagData(payload.to_string());
    }

    DeviceMessage::TagData(TagInfo {
        material: parts[0].to_string(),
        length: parts[1].to_string(),
        color: parts[2].trim_start_matches('#').to_string(),
        serial: parts[3].trim_start_matches("S/N:").trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        assert_eq!(Command::Read.to_wire(), "READ");
        assert_eq!(Command::GetVersion.to_wire(), "GET_VERSION");
        assert_eq!(Command::Write("C2625".into()).to_wire(), "WRITE:C2625");
        assert_eq!(
            Command::WifiConfig {
                ssid: "home".into(),
                password: "hunter2".into()
            }
            .to_wire(),
            "WIFI_CONFIG:home,hunter2"
        );
        assert_eq!(
            Command::OtaUpdate {
                url: "https://x/fw.bin".into()
            }
            .to_wire(),
            "OTA_UPDATE:https://x/fw.bin"
        );
    }

    #[test]
    fn test_command_display_hides_payload() {
        let cmd = Command::WifiConfig {
            ssid: "home".into(),
            password: "hunter2".into(),
        };
        assert_eq!(cmd.to_string(), "WIFI_CONFIG");
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(
            DeviceMessage::parse("VERSION: 1.3.0\0\0"),
            DeviceMessage::Version("1.3.0".into())
        );
    }

    #[test]
    fn test_parse_tag_data() {
        assert_eq!(
            DeviceMessage::parse("TAG_DATA:PLA|330|#FF0000|S/N:123456\n"),
            DeviceMessage::TagData(TagInfo {
                material: "PLA".into(),
                length: "330".into(),
                color: "FF0000".into(),
                serial: "123456".into(),
            })
        );
        assert_eq!(
            DeviceMessage::parse("TAG_DATA:PLA|330"),
            DeviceMessage::MalformedTagData("PLA|330".into())
        );
    }

    #[test]
    fn test_parse_simple_messages() {
        assert_eq!(DeviceMessage::parse("BLANK_TAG"), DeviceMessage::BlankTag);
        assert_eq!(DeviceMessage::parse("WIPE_OK\r\n"), DeviceMessage::WipeOk);
        assert_eq!(DeviceMessage::parse("WIFI_OK"), DeviceMessage::WifiOk);
        assert_eq!(
            DeviceMessage::parse("UPDATE_SUCCESS"),
            DeviceMessage::UpdateSuccess
        );
        assert_eq!(
            DeviceMessage::parse("DISCONNECTED"),
            DeviceMessage::Disconnected
        );
        assert_eq!(DeviceMessage::parse("UP_TO_DATE"), DeviceMessage::UpToDate);
        assert_eq!(
            DeviceMessage::parse("ERROR: No tag found"),
            DeviceMessage::Error("No tag found".into())
        );
    }

    #[test]
    fn test_parse_write_acks() {
        assert_eq!(
            DeviceMessage::parse("TAG1_WRITTEN"),
            DeviceMessage::Tag1Written
        );
        assert_eq!(DeviceMessage::parse("TAG1_OK"), DeviceMessage::Tag1Written);
        assert_eq!(
            DeviceMessage::parse("Tag 1 written, place Tag 2"),
            DeviceMessage::Tag1Written
        );
        assert_eq!(
            DeviceMessage::parse("TAG2_WRITTEN"),
            DeviceMessage::Tag2Written
        );
        assert_eq!(
            DeviceMessage::parse("Tag 2 done"),
            DeviceMessage::Tag2Written
        );
        assert_eq!(
            DeviceMessage::parse("WRITE_COMPLETE"),
            DeviceMessage::Tag2Written
        );
    }

    #[test]
    fn test_parse_update_notices() {
        assert_eq!(
            DeviceMessage::parse("UPDATE_AVAILABLE:v1.4.0,https://x/fw.bin"),
            DeviceMessage::UpdateAvailable {
                version: "v1.4.0".into(),
                url: "https://x/fw.bin".into()
            }
        );
        assert_eq!(
            DeviceMessage::parse("UPDATE_AVAILABLE:v1.4.0"),
            DeviceMessage::Other("UPDATE_AVAILABLE:v1.4.0".into())
        );
    }

    #[test]
    fn test_non_utf8_payload() {
        assert_eq!(
            DeviceMessage::from_payload(&[0xff, 0x00, 0xab]),
            DeviceMessage::Diagnostic("<non-utf8> 0xFF00AB".into())
        );
        assert_eq!(
            DeviceMessage::from_payload(b"WIPE_OK"),
            DeviceMessage::WipeOk
        );
    }

    #[test]
    fn test_unknown_text() {
        assert_eq!(
            DeviceMessage::parse("Place tag on reader"),
            DeviceMessage::Other("Place tag on reader".into())
        );
    }
}
