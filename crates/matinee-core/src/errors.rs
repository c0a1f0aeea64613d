//! The closed error set for the voting coordinator.
//!
//! Every failure the coordination subsystem can surface is one of the
//! variants of [`VotingError`]. Each variant maps to a stable
//! machine-readable code via [`VotingError::code`] — that code is what
//! travels in the ACK envelope and REST error bodies, so the variants
//! here and the wire vocabulary stay in lockstep.
//!
//! Validation errors (`SessionClosed`, `InvalidVoteValue`,
//! `DuplicateVote`) are surfaced to the submitting client only and never
//! affect other participants. `ConnectionLost` and `ReconnectExhausted`
//! are client-side transport conditions.

use thiserror::Error;

use crate::ids::{MediaId, SessionId, UserId};

// ── Error code constants ────────────────────────────────────────────

/// Session does not exist.
pub const SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
/// Session is closed or has no active round.
pub const SESSION_CLOSED: &str = "SESSION_CLOSED";
/// Vote magnitude outside the allowed range.
pub const INVALID_VOTE_VALUE: &str = "INVALID_VOTE_VALUE";
/// A vote already exists for this (round, user, media) triple.
pub const DUPLICATE_VOTE: &str = "DUPLICATE_VOTE";
/// Acting user is not the session host.
pub const NOT_AUTHORIZED: &str = "NOT_AUTHORIZED";
/// Session participant cap reached.
pub const SESSION_FULL: &str = "SESSION_FULL";
/// Vote references a media option outside the round's candidate list.
pub const UNKNOWN_MEDIA: &str = "UNKNOWN_MEDIA";
/// A round cannot be started without candidates.
pub const EMPTY_MEDIA_OPTIONS: &str = "EMPTY_MEDIA_OPTIONS";
/// Transport dropped; the reconnect policy is handling it.
pub const CONNECTION_LOST: &str = "CONNECTION_LOST";
/// All reconnect attempts consumed without success.
pub const RECONNECT_EXHAUSTED: &str = "RECONNECT_EXHAUSTED";

/// Errors produced by the session/voting coordination subsystem.
#[derive(Debug, Error)]
pub enum VotingError {
    /// The referenced session does not exist.
    #[error("session '{session_id}' not found")]
    SessionNotFound {
        /// The session that was looked up.
        session_id: SessionId,
    },

    /// The session is closed, or has no active round to vote in.
    #[error("session '{session_id}' is closed or has no active round")]
    SessionClosed {
        /// The session that rejected the operation.
        session_id: SessionId,
    },

    /// Vote magnitude outside the allowed `[min, max]` range.
    #[error("vote value {value} outside allowed range [{min}, {max}]")]
    InvalidVoteValue {
        /// The rejected magnitude.
        value: i8,
        /// Minimum allowed magnitude.
        min: i8,
        /// Maximum allowed magnitude.
        max: i8,
    },

    /// Vote weight must be a positive multiplier.
    #[error("vote weight {weight} must be at least 1")]
    InvalidVoteWeight {
        /// The rejected weight.
        weight: u32,
    },

    /// The vote references a media option outside the round's candidate
    /// list.
    #[error("media '{media_id}' is not a candidate in the active round")]
    UnknownMedia {
        /// The unknown media option.
        media_id: MediaId,
    },

    /// A round needs at least one candidate option.
    #[error("cannot start a round with an empty candidate list")]
    EmptyMediaOptions,

    /// A vote for this (round, user, media) triple was already recorded.
    /// Resubmission is rejected, never silently overwritten.
    #[error("user '{user_id}' already voted for media '{media_id}' in this round")]
    DuplicateVote {
        /// The user who resubmitted.
        user_id: UserId,
        /// The media option voted on.
        media_id: MediaId,
    },

    /// The acting user is not the session host.
    #[error("user '{user_id}' is not authorized to {action}")]
    NotAuthorized {
        /// The user who attempted the host-only operation.
        user_id: UserId,
        /// Short description of the attempted action.
        action: String,
    },

    /// The session's participant cap is reached.
    #[error("session '{session_id}' is full ({max_participants} participants)")]
    SessionFull {
        /// The full session.
        session_id: SessionId,
        /// The participant cap.
        max_participants: usize,
    },

    /// The underlying transport dropped. Recovered locally by the
    /// reconnect policy; not user-visible.
    #[error("connection lost: {reason}")]
    ConnectionLost {
        /// Why the transport reported the drop.
        reason: String,
    },

    /// The reconnect policy exhausted its attempts.
    #[error("reconnect exhausted after {attempts} attempts")]
    ReconnectExhausted {
        /// How many attempts were made.
        attempts: u32,
    },
}

impl VotingError {
    /// Machine-readable error code for this variant.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound { .. } => SESSION_NOT_FOUND,
            Self::SessionClosed { .. } => SESSION_CLOSED,
            Self::InvalidVoteValue { .. } | Self::InvalidVoteWeight { .. } => INVALID_VOTE_VALUE,
            Self::UnknownMedia { .. } => UNKNOWN_MEDIA,
            Self::EmptyMediaOptions => EMPTY_MEDIA_OPTIONS,
            Self::DuplicateVote { .. } => DUPLICATE_VOTE,
            Self::NotAuthorized { .. } => NOT_AUTHORIZED,
            Self::SessionFull { .. } => SESSION_FULL,
            Self::ConnectionLost { .. } => CONNECTION_LOST,
            Self::ReconnectExhausted { .. } => RECONNECT_EXHAUSTED,
        }
    }

    /// Whether this error is a per-submission validation failure that
    /// must only be surfaced to the submitting client.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::SessionClosed { .. }
                | Self::InvalidVoteValue { .. }
                | Self::InvalidVoteWeight { .. }
                | Self::UnknownMedia { .. }
                | Self::DuplicateVote { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
