use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::classify::PlayCandidate;

/// Identity of one play for a given user: the dedup key. User scoping
/// happens in the storage query, so the key itself is track + instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayKey {
    pub track_id: String,
    pub played_at: DateTime<Utc>,
}

impl PlayKey {
    pub fn of(candidate: &PlayCandidate) -> Self {
        PlayKey {
            track_id: candidate.track_id.clone(),
            played_at: candidate.played_at,
        }
    }
}

#[derive(Debug)]
pub struct Partition {
    pub new: Vec<PlayCandidate>,
    pub duplicates: u64,
}

/// Split one file's countable entries into new plays and duplicates.
///
/// `existing` is the set of keys already in storage for this user
/// (fetched in one batched query). Within the file, the first
/// occurrence of a fresh key stays new and later identical keys are
/// duplicates, so processing order matters.
pub fn partition(candidates: Vec<PlayCandidate>, existing: &HashSet<PlayKey>) -> Partition {
    let mut seen: HashSet<PlayKey> = HashSet::with_capacity(candidates.len());
    let mut new = Vec::new();
    let mut duplicates = 0;

    for candidate in candidates {
        let key = PlayKey::of(&candidate);
        if existing.contains(&key) || !seen.insert(key) {
            duplicates += 1;
        } else {
            new.push(candidate);
        }
    }

    Partition { new, duplicates }
}
