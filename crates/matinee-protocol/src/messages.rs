//! Message kinds and payload shapes.

use matinee_core::{MediaId, RoundId, SessionId, UserId};
use serde::{Deserialize, Serialize};

/// A round as announced to clients in `ROUND_STARTED`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundInfo {
    /// Round identifier.
    pub id: RoundId,
    /// Ordered candidate list. Order matters: it is the tie-break order.
    pub media_options: Vec<MediaId>,
}

/// Aggregated result for a single candidate option.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionResult {
    /// The candidate media.
    pub media_id: MediaId,
    /// Sum of `value × weight` over votes for this option.
    pub total: i64,
    /// Share of this option's total against the round denominator.
    pub percentage: f64,
}

/// Summary statistics over a round's votes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteStats {
    /// Raw count of recorded votes.
    pub total_votes: usize,
    /// Votes with positive magnitude.
    pub positive_votes: usize,
    /// Votes with negative magnitude.
    pub negative_votes: usize,
    /// Distinct users who voted.
    pub unique_voters: usize,
    /// Mean magnitude, rounded half-up to two decimals.
    pub average_vote: f64,
}

/// Full results of a completed round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResults {
    /// The winning option (ties broken by candidate-list order).
    pub winner: OptionResult,
    /// Per-option results in candidate-list order.
    pub all_results: Vec<OptionResult>,
    /// Raw count of votes cast in the round.
    pub total_votes: usize,
    /// Summary statistics over the round's votes.
    pub stats: VoteStats,
}

/// Structured error inside an [`AckPayload`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckError {
    /// Machine-readable code (e.g. `SESSION_NOT_FOUND`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Acknowledgment/error envelope for a client request.
///
/// Sent to the requesting connection only — a rejected operation never
/// affects other participants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckPayload {
    /// Whether the request was accepted.
    pub success: bool,
    /// Present when `success == false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AckError>,
}

impl AckPayload {
    /// A successful acknowledgment.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// A rejection with code and message.
    #[must_use]
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(AckError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// Messages a client sends to the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Join (or re-join after reconnect) a session.
    #[serde(rename_all = "camelCase")]
    JoinSession {
        /// The session to join.
        session_id: SessionId,
    },
    /// Leave a session. Does not retract already-cast votes.
    #[serde(rename_all = "camelCase")]
    LeaveSession {
        /// The session to leave.
        session_id: SessionId,
    },
}

/// Messages the coordinator pushes to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// A participant joined the session.
    #[serde(rename_all = "camelCase")]
    UserJoined {
        /// The joining user.
        user_id: UserId,
        /// Display name.
        username: String,
    },
    /// A participant left the session.
    #[serde(rename_all = "camelCase")]
    UserLeft {
        /// The departing user.
        user_id: UserId,
    },
    /// A new voting round began.
    #[serde(rename_all = "camelCase")]
    RoundStarted {
        /// The round and its candidate list.
        round: RoundInfo,
    },
    /// A vote was recorded; carries round progress.
    #[serde(rename_all = "camelCase")]
    VoteSubmitted {
        /// The round voted in.
        round_id: RoundId,
        /// Unique voters so far.
        votes_submitted: usize,
        /// Current roster size.
        total_expected: usize,
    },
    /// A round completed; carries full results.
    #[serde(rename_all = "camelCase")]
    RoundCompleted {
        /// The completed round.
        round_id: RoundId,
        /// Winner, per-option results, and total vote count.
        results: RoundResults,
        /// The winning media, duplicated for convenience.
        winning_media: MediaId,
    },
    /// Acknowledgment/error envelope for the requesting connection.
    #[serde(rename_all = "camelCase")]
    Ack {
        /// Outcome of the request.
        #[serde(flatten)]
        ack: AckPayload,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
