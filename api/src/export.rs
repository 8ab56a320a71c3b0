use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ImportError;

/// One entry as it appears on the wire in an extended streaming history
/// file. serde enforces the declared type of every field; the metadata
/// fields are independently nullable or absent because non-music content
/// (podcast episodes, local files) carries no catalog metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct WireEntry {
    pub ts: String,
    pub ms_played: i64,
    #[serde(default, rename = "master_metadata_track_name")]
    pub track_name: Option<String>,
    #[serde(default, rename = "master_metadata_album_artist_name")]
    pub artist_name: Option<String>,
    #[serde(default, rename = "master_metadata_album_album_name")]
    pub album_name: Option<String>,
    #[serde(default, rename = "spotify_track_uri")]
    pub track_uri: Option<String>,
    #[serde(default)]
    pub reason_start: Option<String>,
    #[serde(default)]
    pub reason_end: Option<String>,
    #[serde(default)]
    pub skipped: Option<bool>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub shuffle: Option<bool>,
    #[serde(default)]
    pub offline: Option<bool>,
    #[serde(default)]
    pub conn_country: Option<String>,
}

/// A validated entry: core fields checked and converted, metadata
/// carried as-is. Lives only for the duration of one submission.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub played_at: DateTime<Utc>,
    pub ms_played: i64,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
    pub track_uri: Option<String>,
    pub reason_start: Option<String>,
    pub reason_end: Option<String>,
    pub skipped: Option<bool>,
    pub platform: Option<String>,
    pub shuffle: Option<bool>,
    pub offline: Option<bool>,
    pub conn_country: Option<String>,
}

impl RawEntry {
    fn from_wire(wire: WireEntry) -> Result<Self, String> {
        let played_at = DateTime::parse_from_rfc3339(&wire.ts)
            .map_err(|e| format!("unparseable timestamp {:?}: {}", wire.ts, e))?
            .with_timezone(&Utc);

        if wire.ms_played < 0 {
            return Err(format!("negative ms_played {}", wire.ms_played));
        }

        Ok(RawEntry {
            played_at,
            ms_played: wire.ms_played,
            track_name: wire.track_name,
            artist_name: wire.artist_name,
            album_name: wire.album_name,
            track_uri: wire.track_uri,
            reason_start: wire.reason_start,
            reason_end: wire.reason_end,
            skipped: wire.skipped,
            platform: wire.platform,
            shuffle: wire.shuffle,
            offline: wire.offline,
            conn_country: wire.conn_country,
        })
    }
}

/// Parse one export file into validated entries.
///
/// The whole file is rejected on any structural violation: the export
/// format is internally consistent per file, so a type mismatch means a
/// corrupted or unsupported file rather than one bad row, and partial
/// salvage would silently import garbage.
pub fn parse_export(file_name: &str, bytes: &[u8]) -> Result<Vec<RawEntry>, ImportError> {
    let wire: Vec<WireEntry> =
        serde_json::from_slice(bytes).map_err(|e| ImportError::Schema {
            file: file_name.to_string(),
            message: format!("not a valid history export: {}", e),
        })?;

    let mut entries = Vec::with_capacity(wire.len());
    for (index, entry) in wire.into_iter().enumerate() {
        entries.push(
            RawEntry::from_wire(entry).map_err(|message| ImportError::Schema {
                file: file_name.to_string(),
                message: format!("entry {}: {}", index, message),
            })?,
        );
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_and_sparse_entries() {
        let data = br#"[
            {
                "ts": "2023-07-05T14:14:35Z",
                "ms_played": 215000,
                "master_metadata_track_name": "Windowlicker",
                "master_metadata_album_artist_name": "Aphex Twin",
                "master_metadata_album_album_name": "Windowlicker",
                "spotify_track_uri": "spotify:track:5AEAF7BZgBFIW0f0uRdWsN",
                "reason_start": "clickrow",
                "reason_end": "trackdone",
                "skipped": false,
                "platform": "ios",
                "shuffle": true,
                "offline": false,
                "conn_country": "DE",
                "ip_addr_decrypted": "203.0.113.7"
            },
            {
                "ts": "2023-07-05T15:00:00Z",
                "ms_played": 61000,
                "master_metadata_track_name": null,
                "spotify_track_uri": null
            }
        ]"#;

        let entries = parse_export("endsong_0.json", data).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].track_name.as_deref(), Some("Windowlicker"));
        assert_eq!(entries[0].ms_played, 215000);
        assert_eq!(entries[1].track_name, None);
        assert_eq!(entries[1].artist_name, None);
    }

    #[test]
    fn unparseable_timestamp_rejects_whole_file() {
        let data = br#"[
            {"ts": "2023-07-05T14:14:35Z", "ms_played": 1000},
            {"ts": "yesterday", "ms_played": 1000}
        ]"#;

        let err = parse_export("endsong_0.json", data).unwrap_err();
        match err {
            ImportError::Schema { file, message } => {
                assert_eq!(file, "endsong_0.json");
                assert!(message.contains("entry 1"), "got: {}", message);
            }
            other => panic!("expected Schema error, got {:?}", other),
        }
    }

    #[test]
    fn non_string_timestamp_rejects_whole_file() {
        let data = br#"[{"ts": 1688566475, "ms_played": 1000}]"#;
        assert!(matches!(
            parse_export("endsong_0.json", data),
            Err(ImportError::Schema { .. })
        ));
    }

    #[test]
    fn negative_ms_played_rejects_whole_file() {
        let data = br#"[{"ts": "2023-07-05T14:14:35Z", "ms_played": -5}]"#;
        let err = parse_export("endsong_0.json", data).unwrap_err();
        match err {
            ImportError::Schema { message, .. } => {
                assert!(message.contains("negative ms_played"), "got: {}", message)
            }
            other => panic!("expected Schema error, got {:?}", other),
        }
    }

    #[test]
    fn missing_core_field_rejects_whole_file() {
        let data = br#"[{"ts": "2023-07-05T14:14:35Z"}]"#;
        assert!(matches!(
            parse_export("endsong_0.json", data),
            Err(ImportError::Schema { .. })
        ));
    }

    #[test]
    fn wrong_metadata_type_rejects_whole_file() {
        let data =
            br#"[{"ts": "2023-07-05T14:14:35Z", "ms_played": 1000, "platform": 7}]"#;
        assert!(matches!(
            parse_export("endsong_0.json", data),
            Err(ImportError::Schema { .. })
        ));
    }

    #[test]
    fn non_array_document_rejects_whole_file() {
        let data = br#"{"ts": "2023-07-05T14:14:35Z", "ms_played": 1000}"#;
        assert!(matches!(
            parse_export("endsong_0.json", data),
            Err(ImportError::Schema { .. })
        ));
    }
}
