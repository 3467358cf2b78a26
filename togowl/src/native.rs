//! Native Messaging link with the content script.
//!
//! The content script forwards raw DOM mutation records, surface snapshots
//! and overlay clicks to the host. The host answers with surface commands.
//! Click and mutation frames may carry the page state at the time of the
//! event; it replaces the mirrored snapshot before the event is handled, so
//! labels and elapsed time are never older than the event itself.
//! Every frame is a native-endian `u32` length followed by that many bytes of
//! UTF-8 JSON.

use crate::types::{ControlKind, MutationRecord, MutationTarget, SurfaceSnapshot, Task};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

/// Largest frame accepted in either direction
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Message from the content script
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Current state of the observed page
    Snapshot { snapshot: SurfaceSnapshot },
    /// A batch of mutation records observed on one element
    Mutation {
        target: MutationTarget,
        records: Vec<MutationRecord>,
        #[serde(default)]
        snapshot: Option<SurfaceSnapshot>,
    },
    /// One of the overlay controls was clicked
    ControlClicked {
        control: ControlKind,
        #[serde(default)]
        snapshot: Option<SurfaceSnapshot>,
    },
    /// A task was chosen in the task picker
    TaskPicked { task_id: i64 },
    /// The task picker popup was dismissed
    TaskPickerClosed,
}

/// Command for the content script to apply to the page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurfaceCommand {
    CreateControl { control: ControlKind },
    SetVisible { control: ControlKind, visible: bool },
    HideTimerToggle,
    ClickTimerToggle,
    ClickDeleteEntry,
    ShowTasks { tasks: Vec<Task> },
    HideTaskPicker,
}

/// Read one raw frame. Returns `None` on a clean end of stream.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_ne_bytes(len_bytes) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message too large: {} bytes", len),
        ));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer)?;
    Ok(Some(buffer))
}

/// Parse a frame body into a host message
pub fn parse_message(frame: &[u8]) -> serde_json::Result<HostMessage> {
    serde_json::from_slice(frame)
}

/// Write one message as a frame
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> io::Result<()> {
    let json = serde_json::to_vec(message)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

    if json.len() > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message too large: {} bytes", json.len()),
        ));
    }

    writer.write_all(&(json.len() as u32).to_ne_bytes())?;
    writer.write_all(&json)?;
    writer.flush()
}

/// Forward frames from `reader` until end of stream (blocking, run in a
/// separate thread).
///
/// Frames that fail to parse are skipped; framing errors end the loop since
/// the stream can no longer be trusted.
pub fn run_reader_loop<R: Read>(mut reader: R, sender: mpsc::Sender<HostMessage>) {
    debug!("Starting native messaging reader");

    loop {
        match read_frame(&mut reader) {
            Ok(Some(frame)) => match parse_message(&frame) {
                Ok(message) => {
                    trace!("Received host message: {:?}", message);
                    if sender.blocking_send(message).is_err() {
                        debug!("Host loop gone, stopping native messaging reader");
                        break;
                    }
                }
                Err(e) => warn!("Skipping malformed message: {}", e),
            },
            Ok(None) => {
                debug!("Content script disconnected");
                break;
            }
            Err(e) => {
                error!("Error reading native message: {}", e);
                break;
            }
        }
    }
}

/// Write queued commands to `writer` until every sender is dropped (blocking,
/// run in a separate thread).
pub fn run_writer_loop<W: Write>(mut writer: W, mut commands: mpsc::UnboundedReceiver<SurfaceCommand>) {
    while let Some(command) = commands.blocking_recv() {
        trace!("Sending surface command: {:?}", command);
        if let Err(e) = write_message(&mut writer, &command) {
            error!("Failed to write surface command: {}", e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame(json: &str) -> Vec<u8> {
        let mut bytes = (json.len() as u32).to_ne_bytes().to_vec();
        bytes.extend_from_slice(json.as_bytes());
        bytes
    }

    #[test]
    fn test_parse_mutation_message() {
        let message = parse_message(
            br#"{"type":"mutation","target":"timer_toggle","records":[{"kind":"attributes","attribute_name":"aria-label","old_value":"Start time entry"}]}"#,
        )
        .unwrap();

        assert_eq!(
            message,
            HostMessage::Mutation {
                target: MutationTarget::TimerToggle,
                records: vec![MutationRecord::attribute("aria-label", Some("Start time entry"))],
                snapshot: None,
            }
        );
    }

    #[test]
    fn test_parse_click_with_snapshot() {
        let message = parse_message(
            br#"{"type":"control_clicked","control":"pause","snapshot":{"container_ready":true,"counting":true,"title":"Write","entry_seconds":754}}"#,
        )
        .unwrap();

        match message {
            HostMessage::ControlClicked {
                control: ControlKind::Pause,
                snapshot: Some(snapshot),
            } => {
                assert_eq!(snapshot.entry_seconds, 754);
                assert_eq!(snapshot.title, "Write");
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_parse_snapshot_with_defaults() {
        let message = parse_message(br#"{"type":"snapshot","snapshot":{"counting":true,"title":"Write"}}"#).unwrap();
        match message {
            HostMessage::Snapshot { snapshot } => {
                assert!(snapshot.counting);
                assert!(!snapshot.container_ready);
                assert_eq!(snapshot.title, "Write");
                assert_eq!(snapshot.client, None);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_read_frames_until_eof() {
        let mut bytes = frame(r#"{"type":"control_clicked","control":"task_picker"}"#);
        bytes.extend(frame(r#"{"type":"task_picker_closed"}"#));
        let mut reader = Cursor::new(bytes);

        let first = read_frame(&mut reader).unwrap().unwrap();
        assert_eq!(
            parse_message(&first).unwrap(),
            HostMessage::ControlClicked {
                control: ControlKind::TaskPicker,
                snapshot: None,
            }
        );
        let second = read_frame(&mut reader).unwrap().unwrap();
        assert_eq!(parse_message(&second).unwrap(), HostMessage::TaskPickerClosed);
        assert!(read_frame(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let bytes = ((MAX_MESSAGE_SIZE + 1) as u32).to_ne_bytes().to_vec();
        let err = read_frame(&mut Cursor::new(bytes)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_write_command_frame() {
        let mut out = Vec::new();
        write_message(
            &mut out,
            &SurfaceCommand::SetVisible {
                control: ControlKind::Pause,
                visible: false,
            },
        )
        .unwrap();

        let body = read_frame(&mut Cursor::new(out)).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["type"], "set_visible");
        assert_eq!(json["control"], "pause");
        assert_eq!(json["visible"], false);
    }

    #[test]
    fn test_reader_loop_skips_malformed_frames() {
        let mut bytes = frame("not json");
        bytes.extend(frame(r#"{"type":"task_picked","task_id":7}"#));
        let (tx, mut rx) = mpsc::channel(4);

        run_reader_loop(Cursor::new(bytes), tx);

        assert_eq!(rx.try_recv().unwrap(), HostMessage::TaskPicked { task_id: 7 });
        assert!(rx.try_recv().is_err());
    }
}
