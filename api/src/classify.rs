use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::export::RawEntry;

/// Plays shorter than this are dominated by skips and carry no real
/// listening signal.
pub const MIN_COUNTABLE_MS: i64 = 30_000;

const TRACK_URI_PREFIX: &str = "spotify:track:";

/// Why an entry was excluded from import. Exactly one reason applies
/// per excluded entry, assigned in the order the checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooShort,
    NoTrackName,
    NoSpotifyUri,
    NoArtistName,
}

/// Per-reason exclusion counts for one file or an aggregated batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    pub too_short: u64,
    pub no_track_name: u64,
    pub no_spotify_uri: u64,
    pub no_artist_name: u64,
}

impl SkipCounts {
    pub fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::TooShort => self.too_short += 1,
            SkipReason::NoTrackName => self.no_track_name += 1,
            SkipReason::NoSpotifyUri => self.no_spotify_uri += 1,
            SkipReason::NoArtistName => self.no_artist_name += 1,
        }
    }

    pub fn merge(&mut self, other: &SkipCounts) {
        self.too_short += other.too_short;
        self.no_track_name += other.no_track_name;
        self.no_spotify_uri += other.no_spotify_uri;
        self.no_artist_name += other.no_artist_name;
    }

    pub fn total(&self) -> u64 {
        self.too_short + self.no_track_name + self.no_spotify_uri + self.no_artist_name
    }
}

/// An entry that qualifies for import. The reason/platform/shuffle
/// fields are descriptive passthrough only; classification and dedup
/// never consult them.
#[derive(Debug, Clone)]
pub struct PlayCandidate {
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: Option<String>,
    pub track_uri: String,
    pub ms_played: i64,
    pub played_at: DateTime<Utc>,
    pub reason_start: Option<String>,
    pub reason_end: Option<String>,
    pub skipped: Option<bool>,
    pub platform: Option<String>,
    pub shuffle: Option<bool>,
    pub offline: Option<bool>,
    pub conn_country: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Classified {
    Countable(PlayCandidate),
    Excluded(SkipReason),
}

/// Extract the track id from a `spotify:track:<id>` URI. Episode and
/// other non-track URIs yield None.
pub fn track_id_from_uri(uri: &str) -> Option<&str> {
    match uri.strip_prefix(TRACK_URI_PREFIX) {
        Some(id) if !id.is_empty() => Some(id),
        _ => None,
    }
}

/// Decide whether one validated entry is a countable listening event.
/// First matching exclusion wins, so an entry missing several fields
/// still increments exactly one skip bucket.
pub fn classify(entry: RawEntry) -> Classified {
    if entry.ms_played < MIN_COUNTABLE_MS {
        return Classified::Excluded(SkipReason::TooShort);
    }

    let track_name = match entry.track_name {
        Some(name) => name,
        None => return Classified::Excluded(SkipReason::NoTrackName),
    };

    let track_uri = match entry.track_uri {
        Some(uri) => uri,
        None => return Classified::Excluded(SkipReason::NoSpotifyUri),
    };
    let track_id = match track_id_from_uri(&track_uri) {
        Some(id) => id.to_string(),
        None => return Classified::Excluded(SkipReason::NoSpotifyUri),
    };

    let artist_name = match entry.artist_name {
        Some(name) => name,
        None => return Classified::Excluded(SkipReason::NoArtistName),
    };

    Classified::Countable(PlayCandidate {
        track_id,
        track_name,
        artist_name,
        album_name: entry.album_name,
        track_uri,
        ms_played: entry.ms_played,
        played_at: entry.played_at,
        reason_start: entry.reason_start,
        reason_end: entry.reason_end,
        skipped: entry.skipped,
        platform: entry.platform,
        shuffle: entry.shuffle,
        offline: entry.offline,
        conn_country: entry.conn_country,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ms_played: i64) -> RawEntry {
        RawEntry {
            played_at: "2023-07-05T14:14:35Z".parse().unwrap(),
            ms_played,
            track_name: Some("Windowlicker".to_string()),
            artist_name: Some("Aphex Twin".to_string()),
            album_name: Some("Windowlicker".to_string()),
            track_uri: Some("spotify:track:5AEAF7BZgBFIW0f0uRdWsN".to_string()),
            reason_start: None,
            reason_end: None,
            skipped: None,
            platform: None,
            shuffle: None,
            offline: None,
            conn_country: None,
        }
    }

    #[test]
    fn threshold_is_exactly_thirty_seconds() {
        assert!(matches!(
            classify(entry(29_999)),
            Classified::Excluded(SkipReason::TooShort)
        ));
        assert!(matches!(classify(entry(30_000)), Classified::Countable(_)));
    }

    #[test]
    fn countable_entry_carries_extracted_track_id() {
        match classify(entry(30_000)) {
            Classified::Countable(candidate) => {
                assert_eq!(candidate.track_id, "5AEAF7BZgBFIW0f0uRdWsN");
                assert_eq!(candidate.artist_name, "Aphex Twin");
            }
            other => panic!("expected countable, got {:?}", other),
        }
    }

    #[test]
    fn missing_track_name_wins_over_missing_uri() {
        let mut e = entry(60_000);
        e.track_name = None;
        e.track_uri = None;
        assert!(matches!(
            classify(e),
            Classified::Excluded(SkipReason::NoTrackName)
        ));
    }

    #[test]
    fn too_short_wins_over_everything() {
        let mut e = entry(5_000);
        e.track_name = None;
        e.track_uri = None;
        e.artist_name = None;
        assert!(matches!(
            classify(e),
            Classified::Excluded(SkipReason::TooShort)
        ));
    }

    #[test]
    fn episode_uri_is_not_a_track() {
        let mut e = entry(60_000);
        e.track_uri = Some("spotify:episode:0Q86acNRm6V9GYx55SXKwf".to_string());
        assert!(matches!(
            classify(e),
            Classified::Excluded(SkipReason::NoSpotifyUri)
        ));
    }

    #[test]
    fn missing_artist_is_checked_last() {
        let mut e = entry(60_000);
        e.artist_name = None;
        assert!(matches!(
            classify(e),
            Classified::Excluded(SkipReason::NoArtistName)
        ));
    }

    #[test]
    fn track_id_extraction_rejects_bare_prefix() {
        assert_eq!(track_id_from_uri("spotify:track:"), None);
        assert_eq!(track_id_from_uri("spotify:episode:abc"), None);
        assert_eq!(track_id_from_uri("spotify:track:abc123"), Some("abc123"));
    }

    #[test]
    fn skip_counts_sum_and_merge() {
        let mut counts = SkipCounts::default();
        counts.record(SkipReason::TooShort);
        counts.record(SkipReason::TooShort);
        counts.record(SkipReason::NoArtistName);

        let mut other = SkipCounts::default();
        other.record(SkipReason::NoSpotifyUri);
        counts.merge(&other);

        assert_eq!(counts.too_short, 2);
        assert_eq!(counts.no_artist_name, 1);
        assert_eq!(counts.no_spotify_uri, 1);
        assert_eq!(counts.total(), 4);
    }
}
