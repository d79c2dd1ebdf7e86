//! Recorder persistence (§4.3) and the lazy recording loader (§4.4).
//!
//! Saving/eager-loading is a conventional read-whole-file-then-
//! (de)serialize path. The lazy loader keeps messages as undecoded raw
//! JSON and offloads the (possibly large) decompress+parse step to the
//! blocking thread pool, which on a multi-threaded Tokio runtime is the
//! "worker-thread pipeline" the spec calls out as equivalent to explicit
//! cooperative yielding (§4.4, §9).

use replay_protocol::{LazyRecording, RawRecordedMessage, Recording};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use serde_json::value::RawValue;

#[derive(Debug, thiserror::Error)]
pub enum RecordingIoError {
    #[error("failed to read recording {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write recording {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decompress recording {path}: {source}")]
    Decompress {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse recording {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("recording {path} has incompatible schema: found {found}, expected {expected}")]
    Schema {
        path: String,
        found: u32,
        expected: u32,
    },
    #[error("recording {path} not found at either {path} or {path}.zstd")]
    NotFound { path: String },
}

/// Resolves the `.zstd` path for a recording path that doesn't already
/// carry one, mapping `.json` -> `.json.zstd` automatically (§4.3).
fn zstd_sibling(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|e| e == "zstd") {
        path.to_path_buf()
    } else {
        let mut s = path.as_os_str().to_owned();
        s.push(".zstd");
        PathBuf::from(s)
    }
}

fn is_zstd_magic(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[0..4] == [0x28, 0xb5, 0x2f, 0xfd]
}

fn read_and_decompress(path: &Path, bytes: Vec<u8>) -> Result<String, RecordingIoError> {
    let path_str = path.display().to_string();
    if is_zstd_magic(&bytes) {
        let mut decoder = zstd::Decoder::new(&bytes[..]).map_err(|e| RecordingIoError::Decompress {
            path: path_str.clone(),
            source: e,
        })?;
        let mut out = String::new();
        decoder
            .read_to_string(&mut out)
            .map_err(|e| RecordingIoError::Decompress { path: path_str, source: e })?;
        Ok(out)
    } else {
        String::from_utf8(bytes).map_err(|e| RecordingIoError::Decompress {
            path: path_str,
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })
    }
}

/// Locates the bytes for `path` per the load-symmetry rule: try
/// `path.zstd` first, then `path` itself (§4.3).
fn locate_bytes(path: &Path) -> Result<(PathBuf, Vec<u8>), RecordingIoError> {
    let zstd_path = zstd_sibling(path);
    if let Ok(bytes) = std::fs::read(&zstd_path) {
        return Ok((zstd_path, bytes));
    }
    if let Ok(bytes) = std::fs::read(path) {
        return Ok((path.to_path_buf(), bytes));
    }
    Err(RecordingIoError::NotFound {
        path: path.display().to_string(),
    })
}

/// Serializes `recording` to canonical JSON, compresses with zstd, and
/// writes atomically to `path` (appending `.zstd` if missing, creating the
/// parent directory recursively).
pub async fn save_recording(path: &Path, recording: &Recording) -> Result<(), RecordingIoError> {
    let path = path.to_path_buf();
    let recording = recording.clone();
    tokio::task::spawn_blocking(move || save_recording_sync(&path, &recording))
        .await
        .expect("save_recording blocking task panicked")
}

fn save_recording_sync(path: &Path, recording: &Recording) -> Result<(), RecordingIoError> {
    let target = zstd_sibling(path);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RecordingIoError::Write {
            path: target.display().to_string(),
            source: e,
        })?;
    }

    let json = serde_json::to_vec(recording).expect("Recording always serializes");
    let mut encoder = zstd::Encoder::new(Vec::new(), 0).map_err(|e| RecordingIoError::Write {
        path: target.display().to_string(),
        source: e,
    })?;
    encoder.write_all(&json).map_err(|e| RecordingIoError::Write {
        path: target.display().to_string(),
        source: e,
    })?;
    let compressed = encoder.finish().map_err(|e| RecordingIoError::Write {
        path: target.display().to_string(),
        source: e,
    })?;

    let tmp = target.with_extension("zstd.tmp");
    std::fs::write(&tmp, &compressed).map_err(|e| RecordingIoError::Write {
        path: target.display().to_string(),
        source: e,
    })?;
    std::fs::rename(&tmp, &target).map_err(|e| RecordingIoError::Write {
        path: target.display().to_string(),
        source: e,
    })?;
    Ok(())
}

/// Loads and fully decodes a recording, validating its schema version.
pub async fn load_recording(path: &Path) -> Result<Recording, RecordingIoError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || load_recording_sync(&path))
        .await
        .expect("load_recording blocking task panicked")
}

fn load_recording_sync(path: &Path) -> Result<Recording, RecordingIoError> {
    let (resolved_path, bytes) = locate_bytes(path)?;
    let text = read_and_decompress(&resolved_path, bytes)?;
    let recording: Recording = serde_json::from_str(&text).map_err(|e| RecordingIoError::Parse {
        path: resolved_path.display().to_string(),
        source: e,
    })?;
    replay_protocol::validate_schema_version(recording.schema_version).map_err(|e| {
        RecordingIoError::Schema {
            path: resolved_path.display().to_string(),
            found: e.found,
            expected: e.expected,
        }
    })?;
    Ok(recording)
}

/// Loads a recording lazily: only `schemaVersion`, `scenarioName`,
/// `recordedAt`, and raw (undecoded) message slots are materialized. The
/// decompress+parse step runs on the blocking thread pool so the async
/// scheduler stays responsive to other sessions while a large recording
/// loads (§4.4).
pub async fn load_recording_lazy(path: &Path) -> Result<LazyRecording, RecordingIoError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || load_recording_lazy_sync(&path))
        .await
        .expect("load_recording_lazy blocking task panicked")
}

fn load_recording_lazy_sync(path: &Path) -> Result<LazyRecording, RecordingIoError> {
    let (resolved_path, bytes) = locate_bytes(path)?;
    let text = read_and_decompress(&resolved_path, bytes)?;

    #[derive(serde::Deserialize)]
    struct LazyShape<'a> {
        #[serde(rename = "schemaVersion")]
        schema_version: u32,
        #[serde(rename = "scenarioName")]
        scenario_name: String,
        #[serde(rename = "recordedAt")]
        recorded_at: chrono::DateTime<chrono::Utc>,
        #[serde(rename = "messages", borrow)]
        messages: Vec<&'a RawValue>,
    }

    let parsed: LazyShape = serde_json::from_str(&text).map_err(|e| RecordingIoError::Parse {
        path: resolved_path.display().to_string(),
        source: e,
    })?;

    replay_protocol::validate_schema_version(parsed.schema_version).map_err(|e| {
        RecordingIoError::Schema {
            path: resolved_path.display().to_string(),
            found: e.found,
            expected: e.expected,
        }
    })?;

    let raw_messages = parsed
        .messages
        .into_iter()
        .map(|v| RawRecordedMessage(RawValue::from_string(v.get().to_owned()).expect("re-owning raw JSON never fails")))
        .collect();

    Ok(LazyRecording {
        schema_version: parsed.schema_version,
        scenario_name: parsed.scenario_name,
        recorded_at: parsed.recorded_at,
        raw_messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use replay_protocol::{Channel, Command, Direction, Envelope, RecordedMessage, RecordedPayload, RequestPayload, StreamId, TraceId};
    use serde_json::json;

    fn sample_recording(scenario: &str) -> Recording {
        Recording {
            schema_version: replay_protocol::CURRENT_SCHEMA_VERSION,
            scenario_name: scenario.to_owned(),
            recorded_at: Utc::now(),
            messages: vec![RecordedMessage {
                envelope: RecordedPayload::Command(Envelope {
                    stream_id: StreamId::new(),
                    trace_id: TraceId::new(),
                    causation_stream_id: None,
                    parent_stream_id: None,
                    sibling_index: 0,
                    event_seq: 0,
                    timestamp: Utc::now(),
                    channel: Channel::Program,
                    payload_hash: Some("a".repeat(64)),
                    payload: Command::Open {
                        request: RequestPayload {
                            service: "http".into(),
                            payload: json!({"method": "GET"}),
                        },
                    },
                }),
                recorded_at: Utc::now(),
                direction: Direction::ToHarness,
                hash: Some("a".repeat(64)),
            }],
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips_and_appends_zstd_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scenario.json");
        let recording = sample_recording("scenario-a");
        save_recording(&path, &recording).await.unwrap();

        assert!(path.with_extension("json.zstd").exists() || zstd_sibling(&path).exists());

        let loaded = load_recording(&path).await.unwrap();
        assert_eq!(loaded.scenario_name, "scenario-a");
        assert_eq!(loaded.messages.len(), 1);
    }

    #[tokio::test]
    async fn load_accepts_uncompressed_json_file_directly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.json");
        let recording = sample_recording("scenario-plain");
        std::fs::write(&path, serde_json::to_vec(&recording).unwrap()).unwrap();

        let loaded = load_recording(&path).await.unwrap();
        assert_eq!(loaded.scenario_name, "scenario-plain");
    }

    #[tokio::test]
    async fn load_rejects_incompatible_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        let mut recording = sample_recording("scenario-bad");
        recording.schema_version = 3;
        std::fs::write(&path, serde_json::to_vec(&recording).unwrap()).unwrap();

        let err = load_recording(&path).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Incompatible schema") || msg.contains("incompatible schema"));
        assert!(msg.contains("found 3"));
        assert!(msg.contains("expected 2"));
    }

    #[tokio::test]
    async fn load_of_missing_file_reports_both_candidate_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let err = load_recording(&path).await.unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }

    #[tokio::test]
    async fn lazy_load_preserves_message_count_and_raw_hash_access() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lazy.json");
        let recording = sample_recording("scenario-lazy");
        save_recording(&path, &recording).await.unwrap();

        let lazy = load_recording_lazy(&path).await.unwrap();
        assert_eq!(lazy.raw_messages.len(), 1);
        assert_eq!(lazy.raw_messages[0].peek_hash(), Some("a".repeat(64)));
    }
}
