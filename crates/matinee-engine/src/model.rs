//! Session, round, and vote data model.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use matinee_core::{MediaId, RoundId, SessionId, UserId};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Accepting participants, no round started yet.
    Open,
    /// At least one round has been started.
    InProgress,
    /// Explicitly closed or reaped; rejects all mutations.
    Closed,
}

/// Lifecycle status of a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    /// Accepting votes.
    Active,
    /// Finished; immutable except for the winner field, which is set
    /// exactly once at completion.
    Completed,
}

/// A member of a session's roster.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Identity from the media-server identity provider.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
    /// When the participant joined.
    pub joined_at: DateTime<Utc>,
}

/// A recorded vote. Never mutated after creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    /// Who voted.
    pub user_id: UserId,
    /// The candidate voted on.
    pub media_id: MediaId,
    /// Signed magnitude in the configured range (default `[-1, 1]`).
    pub value: i8,
    /// Positive multiplier applied to the magnitude (default 1).
    pub weight: u32,
    /// When the vote was recorded.
    pub cast_at: DateTime<Utc>,
}

/// One voting pass over a fixed candidate list.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    /// Round identifier.
    pub id: RoundId,
    /// 1-based sequence number within the session.
    pub sequence: u32,
    /// Lifecycle status.
    pub status: RoundStatus,
    /// Ordered candidate list; order is the tie-break order.
    pub media_options: Vec<MediaId>,
    /// Recorded votes, at most one per (user, media) pair.
    pub votes: Vec<Vote>,
    /// Winning option, set exactly once at completion.
    pub winner: Option<MediaId>,
}

impl Round {
    /// Create a new active round.
    #[must_use]
    pub fn new(sequence: u32, media_options: Vec<MediaId>) -> Self {
        Self {
            id: RoundId::new(),
            sequence,
            status: RoundStatus::Active,
            media_options,
            votes: Vec::new(),
            winner: None,
        }
    }

    /// Whether the candidate list contains the given media.
    #[must_use]
    pub fn has_option(&self, media_id: &MediaId) -> bool {
        self.media_options.contains(media_id)
    }

    /// Whether a vote for (user, media) is already recorded.
    #[must_use]
    pub fn has_vote(&self, user_id: &UserId, media_id: &MediaId) -> bool {
        self.votes
            .iter()
            .any(|v| &v.user_id == user_id && &v.media_id == media_id)
    }

    /// Whether the given user has cast at least one vote this round.
    #[must_use]
    pub fn has_voter(&self, user_id: &UserId) -> bool {
        self.votes.iter().any(|v| &v.user_id == user_id)
    }

    /// Number of distinct users who have voted this round.
    #[must_use]
    pub fn unique_voters(&self) -> usize {
        let mut seen: Vec<&UserId> = Vec::with_capacity(self.votes.len());
        for vote in &self.votes {
            if !seen.contains(&&vote.user_id) {
                seen.push(&vote.user_id);
            }
        }
        seen.len()
    }
}

/// A shared voting gathering with one host and a roster of participants.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
    /// The host identity; only the host may run host-only operations.
    pub host_id: UserId,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Roster; insertion order is irrelevant.
    pub participants: HashMap<UserId, Participant>,
    /// Participant cap.
    pub max_participants: usize,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Last time the host's connection showed liveness. Used by the
    /// stale-session reaper.
    pub host_last_seen: DateTime<Utc>,
    /// All rounds, in creation order. The active round, if any, is the
    /// last entry and is the only non-completed one.
    pub rounds: Vec<Round>,
}

impl Session {
    /// Create a new open session with the host as its first participant.
    #[must_use]
    pub fn new(host_id: UserId, host_username: String, max_participants: usize) -> Self {
        let now = Utc::now();
        let mut participants = HashMap::new();
        let _ = participants.insert(
            host_id.clone(),
            Participant {
                user_id: host_id.clone(),
                username: host_username,
                joined_at: now,
            },
        );
        Self {
            id: SessionId::new(),
            host_id,
            status: SessionStatus::Open,
            participants,
            max_participants,
            created_at: now,
            host_last_seen: now,
            rounds: Vec::new(),
        }
    }

    /// Whether the session accepts mutations (`OPEN` or `IN_PROGRESS`).
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.status, SessionStatus::Open | SessionStatus::InProgress)
    }

    /// The active round, if any.
    #[must_use]
    pub fn active_round(&self) -> Option<&Round> {
        self.rounds
            .last()
            .filter(|r| r.status == RoundStatus::Active)
    }

    /// Mutable access to the active round, if any.
    pub fn active_round_mut(&mut self) -> Option<&mut Round> {
        self.rounds
            .last_mut()
            .filter(|r| r.status == RoundStatus::Active)
    }

    /// The most recently completed round, if any.
    #[must_use]
    pub fn latest_completed_round(&self) -> Option<&Round> {
        self.rounds
            .iter()
            .rev()
            .find(|r| r.status == RoundStatus::Completed)
    }

    /// Whether every current participant has voted in the given round.
    ///
    /// An empty roster never satisfies the condition — a round cannot
    /// complete itself with nobody left to vote.
    #[must_use]
    pub fn all_participants_voted(&self, round: &Round) -> bool {
        !self.participants.is_empty()
            && self.participants.keys().all(|user| round.has_voter(user))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(user: &str, media: &str, value: i8) -> Vote {
        Vote {
            user_id: UserId::from(user),
            media_id: MediaId::from(media),
            value,
            weight: 1,
            cast_at: Utc::now(),
        }
    }

    #[test]
    fn new_session_is_open_with_host_in_roster() {
        let session = Session::new(UserId::from("host"), "ada".into(), 8);
        assert_eq!(session.status, SessionStatus::Open);
        assert_eq!(session.participants.len(), 1);
        assert!(session.participants.contains_key(&UserId::from("host")));
        assert!(session.is_active());
    }

    #[test]
    fn closed_session_is_not_active() {
        let mut session = Session::new(UserId::from("host"), "ada".into(), 8);
        session.status = SessionStatus::Closed;
        assert!(!session.is_active());
    }

    #[test]
    fn active_round_is_last_non_completed() {
        let mut session = Session::new(UserId::from("host"), "ada".into(), 8);
        assert!(session.active_round().is_none());

        let mut first = Round::new(1, vec![MediaId::from("m1")]);
        first.status = RoundStatus::Completed;
        session.rounds.push(first);
        assert!(session.active_round().is_none());

        session.rounds.push(Round::new(2, vec![MediaId::from("m2")]));
        let active = session.active_round().unwrap();
        assert_eq!(active.sequence, 2);
    }

    #[test]
    fn latest_completed_round_skips_active() {
        let mut session = Session::new(UserId::from("host"), "ada".into(), 8);
        let mut done = Round::new(1, vec![MediaId::from("m1")]);
        done.status = RoundStatus::Completed;
        done.winner = Some(MediaId::from("m1"));
        session.rounds.push(done);
        session.rounds.push(Round::new(2, vec![MediaId::from("m2")]));

        let completed = session.latest_completed_round().unwrap();
        assert_eq!(completed.sequence, 1);
    }

    #[test]
    fn round_tracks_votes_and_voters() {
        let mut round = Round::new(1, vec![MediaId::from("m1"), MediaId::from("m2")]);
        round.votes.push(vote("u1", "m1", 1));
        round.votes.push(vote("u1", "m2", -1));
        round.votes.push(vote("u2", "m1", 1));

        assert!(round.has_vote(&UserId::from("u1"), &MediaId::from("m1")));
        assert!(!round.has_vote(&UserId::from("u2"), &MediaId::from("m2")));
        assert!(round.has_voter(&UserId::from("u2")));
        assert!(!round.has_voter(&UserId::from("u3")));
        assert_eq!(round.unique_voters(), 2);
    }

    #[test]
    fn has_option_checks_candidate_list() {
        let round = Round::new(1, vec![MediaId::from("m1")]);
        assert!(round.has_option(&MediaId::from("m1")));
        assert!(!round.has_option(&MediaId::from("m9")));
    }

    #[test]
    fn all_participants_voted_requires_every_member() {
        let mut session = Session::new(UserId::from("host"), "ada".into(), 8);
        let _ = session.participants.insert(
            UserId::from("u2"),
            Participant {
                user_id: UserId::from("u2"),
                username: "bob".into(),
                joined_at: Utc::now(),
            },
        );

        let mut round = Round::new(1, vec![MediaId::from("m1")]);
        round.votes.push(vote("host", "m1", 1));
        assert!(!session.all_participants_voted(&round));

        round.votes.push(vote("u2", "m1", 1));
        assert!(session.all_participants_voted(&round));
    }

    #[test]
    fn empty_roster_never_completes() {
        let mut session = Session::new(UserId::from("host"), "ada".into(), 8);
        let _ = session.participants.remove(&UserId::from("host"));
        let round = Round::new(1, vec![MediaId::from("m1")]);
        assert!(!session.all_participants_voted(&round));
    }

    #[test]
    fn status_wire_format_is_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
        assert_eq!(
            serde_json::to_string(&RoundStatus::Completed).unwrap(),
            "\"COMPLETED\""
        );
    }
}
