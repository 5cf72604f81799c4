// SPDX-License-Identifier: GPL-3.0-only

//! Audio input device enumeration for PipeWire

use serde_json::Value;
use std::process::Command;
use tracing::{debug, warn};

/// Represents an audio input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub name: String,
    pub serial: String,
    pub node_name: String,
    pub is_default: bool,
}

/// Enumerate available audio input devices using `pw-dump`
pub fn enumerate_audio_devices() -> Vec<AudioDevice> {
    let output = match Command::new("pw-dump").output() {
        Ok(output) if output.status.success() => output,
        Ok(_) => {
            warn!("pw-dump command failed");
            return Vec::new();
        }
        Err(e) => {
            warn!(error = %e, "Failed to run pw-dump");
            return Vec::new();
        }
    };

    match serde_json::from_slice::<Vec<Value>>(&output.stdout) {
        Ok(objects) => parse_audio_sources(&objects),
        Err(e) => {
            warn!(error = %e, "Failed to parse pw-dump output");
            Vec::new()
        }
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Node name of the default audio source from the "default" metadata object
fn default_source_name(objects: &[Value]) -> Option<String> {
    let metadata = objects.iter().find(|obj| {
        str_field(obj, "type") == Some("PipeWire:Interface:Metadata")
            && obj.get("props").and_then(|p| str_field(p, "metadata.name")) == Some("default")
    })?;

    metadata
        .get("metadata")?
        .as_array()?
        .iter()
        .filter(|entry| {
            matches!(
                str_field(entry, "key"),
                Some("default.audio.source" | "default.configured.audio.source")
            )
        })
        .find_map(|entry| entry.get("value").and_then(|v| str_field(v, "name")))
        .map(str::to_string)
}

/// Collect `Audio/Source` nodes from a parsed `pw-dump`, default first
fn parse_audio_sources(objects: &[Value]) -> Vec<AudioDevice> {
    let default_node = default_source_name(objects);
    if let Some(name) = &default_node {
        debug!(default_source = %name, "Found default audio source");
    }

    let mut devices: Vec<AudioDevice> = objects
        .iter()
        .filter_map(|obj| obj.get("info")?.get("props"))
        .filter(|props| str_field(props, "media.class") == Some("Audio/Source"))
        .map(|props| {
            let node_name = str_field(props, "node.name").unwrap_or_default().to_string();
            let name = ["node.nick", "node.description", "node.name"]
                .iter()
                .find_map(|key| str_field(props, key))
                .unwrap_or("Unknown Audio Device")
                .to_string();
            // object.serial is a number in recent PipeWire releases
            let serial = props
                .get("object.serial")
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "0".to_string());
            let is_default = default_node.as_deref() == Some(node_name.as_str());

            debug!(name = %name, serial = %serial, is_default, "Found audio input device");
            AudioDevice {
                name,
                serial,
                node_name,
                is_default,
            }
        })
        .collect();

    // Default first, then alphabetically
    devices.sort_by(|a, b| b.is_default.cmp(&a.is_default).then_with(|| a.name.cmp(&b.name)));
    devices
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_sources_default_first() {
        let dump = vec![
            json!({
                "type": "PipeWire:Interface:Metadata",
                "props": { "metadata.name": "default" },
                "metadata": [
                    { "key": "default.audio.source", "value": { "name": "usb-mic" } }
                ]
            }),
            json!({
                "info": { "props": {
                    "media.class": "Audio/Source",
                    "node.name": "builtin",
                    "node.description": "Built-in Microphone",
                    "object.serial": 31
                } }
            }),
            json!({
                "info": { "props": {
                    "media.class": "Audio/Source",
                    "node.name": "usb-mic",
                    "node.nick": "USB Mic",
                    "object.serial": "42"
                } }
            }),
            json!({
                "info": { "props": { "media.class": "Audio/Sink", "node.name": "speakers" } }
            }),
        ];

        let devices = parse_audio_sources(&dump);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].node_name, "usb-mic");
        assert!(devices[0].is_default);
        assert_eq!(devices[0].serial, "42");
        assert_eq!(devices[1].name, "Built-in Microphone");
        assert_eq!(devices[1].serial, "31");
    }

    #[test]
    fn test_parse_empty_dump() {
        assert!(parse_audio_sources(&[]).is_empty());
    }
}
