//! The session/round engine: the single authority over session state.
//!
//! All mutations for one session are serialized behind a per-session
//! async mutex; different sessions never contend. Every committed state
//! change is published as a [`SessionEvent`] on a broadcast channel
//! WHILE the lock is still held, so subscribers observe one session's
//! events in exactly the order its mutations committed.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use matinee_core::{MediaId, RoundId, SessionId, UserId, VotingError};
use matinee_protocol::{RoundInfo, RoundResults, ServerMessage};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::aggregator;
use crate::model::{Participant, Round, RoundStatus, Session, SessionStatus, Vote};

/// Engine tunables.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Minimum allowed vote magnitude.
    pub vote_min: i8,
    /// Maximum allowed vote magnitude.
    pub vote_max: i8,
    /// Participant cap applied when a session does not set its own.
    pub default_max_participants: usize,
    /// Capacity of the state-change broadcast channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vote_min: -1,
            vote_max: 1,
            default_max_participants: 8,
            event_capacity: 256,
        }
    }
}

/// A committed state change, addressed to one session's subscribers.
#[derive(Clone, Debug)]
pub struct SessionEvent {
    /// The session the change belongs to.
    pub session_id: SessionId,
    /// The message to fan out to that session's connections.
    pub message: ServerMessage,
}

/// Result of recording a single vote.
#[derive(Clone, Debug)]
pub struct VoteOutcome {
    /// The round the vote landed in.
    pub round_id: RoundId,
    /// Distinct voters so far.
    pub votes_submitted: usize,
    /// Current roster size.
    pub total_expected: usize,
    /// Whether this vote completed the round.
    pub round_completed: bool,
    /// Full results, present when the round completed.
    pub results: Option<RoundResults>,
}

/// Per-session slot. The mutex serializes all mutations of one session.
struct SessionSlot {
    session: Mutex<Session>,
}

/// The authoritative session registry and round state machine.
pub struct SessionRoundEngine {
    config: EngineConfig,
    sessions: DashMap<SessionId, Arc<SessionSlot>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionRoundEngine {
    /// Create an engine with the given tunables.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            config,
            sessions: DashMap::new(),
            events,
        }
    }

    /// Subscribe to committed state-change events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Number of tracked sessions, closed ones included.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn slot(&self, session_id: &SessionId) -> Result<Arc<SessionSlot>, VotingError> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| VotingError::SessionNotFound {
                session_id: session_id.clone(),
            })
    }

    /// Publish events for one session. Called with that session's lock
    /// held: `broadcast::Sender::send` never blocks, and sending under
    /// the lock keeps the event stream in commit order.
    fn publish(&self, session_id: &SessionId, messages: Vec<ServerMessage>) {
        for message in messages {
            // Send fails only when nobody is subscribed, which is fine.
            let _ = self.events.send(SessionEvent {
                session_id: session_id.clone(),
                message,
            });
        }
    }

    /// Create a new session hosted by `host_id`, who joins the roster
    /// immediately.
    pub fn create_session(
        &self,
        host_id: UserId,
        host_username: String,
        max_participants: Option<usize>,
    ) -> SessionId {
        let cap = max_participants.unwrap_or(self.config.default_max_participants);
        let session = Session::new(host_id.clone(), host_username, cap);
        let session_id = session.id.clone();
        let _ = self.sessions.insert(
            session_id.clone(),
            Arc::new(SessionSlot {
                session: Mutex::new(session),
            }),
        );
        info!(session_id = %session_id, host_id = %host_id, max_participants = cap, "session created");
        session_id
    }

    /// A point-in-time copy of a session's full state.
    pub async fn snapshot(&self, session_id: &SessionId) -> Result<Session, VotingError> {
        let slot = self.slot(session_id)?;
        let session = slot.session.lock().await;
        Ok(session.clone())
    }

    /// Join a session, or re-join after a reconnect.
    ///
    /// Returns the resync messages the joining connection needs to catch
    /// up: one `USER_JOINED` per current participant, `ROUND_STARTED`
    /// for the active round if any, and `ROUND_COMPLETED` for the most
    /// recently finished round. A re-join by an existing participant is
    /// a pure resync and broadcasts nothing.
    pub async fn join_session(
        &self,
        session_id: &SessionId,
        user_id: UserId,
        username: String,
    ) -> Result<Vec<ServerMessage>, VotingError> {
        let slot = self.slot(session_id)?;
        let resync = {
            let mut session = slot.session.lock().await;
            if !session.is_active() {
                return Err(VotingError::SessionClosed {
                    session_id: session_id.clone(),
                });
            }

            let rejoin = session.participants.contains_key(&user_id);
            if !rejoin {
                if session.participants.len() >= session.max_participants {
                    return Err(VotingError::SessionFull {
                        session_id: session_id.clone(),
                        max_participants: session.max_participants,
                    });
                }
                let _ = session.participants.insert(
                    user_id.clone(),
                    Participant {
                        user_id: user_id.clone(),
                        username: username.clone(),
                        joined_at: Utc::now(),
                    },
                );
            }

            let mut resync: Vec<ServerMessage> = session
                .participants
                .values()
                .map(|p| ServerMessage::UserJoined {
                    user_id: p.user_id.clone(),
                    username: p.username.clone(),
                })
                .collect();
            if let Some(round) = session.active_round() {
                resync.push(ServerMessage::RoundStarted {
                    round: RoundInfo {
                        id: round.id.clone(),
                        media_options: round.media_options.clone(),
                    },
                });
                if !round.votes.is_empty() {
                    resync.push(ServerMessage::VoteSubmitted {
                        round_id: round.id.clone(),
                        votes_submitted: round.unique_voters(),
                        total_expected: session.participants.len(),
                    });
                }
            } else if let Some(round) = session.latest_completed_round() {
                if let Some(results) = aggregator::aggregate(&round.media_options, &round.votes) {
                    resync.push(ServerMessage::RoundCompleted {
                        round_id: round.id.clone(),
                        winning_media: results.winner.media_id.clone(),
                        results,
                    });
                }
            }

            let broadcasts = if rejoin {
                Vec::new()
            } else {
                vec![ServerMessage::UserJoined {
                    user_id: user_id.clone(),
                    username,
                }]
            };
            self.publish(session_id, broadcasts);
            resync
        };

        debug!(session_id = %session_id, user_id = %user_id, "participant joined");
        Ok(resync)
    }

    /// Leave a session. Already-cast votes are never retracted.
    ///
    /// Shrinking the roster can satisfy the completion condition for the
    /// active round, in which case the round completes here.
    pub async fn leave_session(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<(), VotingError> {
        let slot = self.slot(session_id)?;
        {
            let mut session = slot.session.lock().await;
            if session.participants.remove(user_id).is_none() {
                return Ok(());
            }
            let mut broadcasts = vec![ServerMessage::UserLeft {
                user_id: user_id.clone(),
            }];
            if let Some(message) = try_complete_on_full_turnout(&mut session) {
                broadcasts.push(message);
            }
            self.publish(session_id, broadcasts);
        }

        debug!(session_id = %session_id, user_id = %user_id, "participant left");
        Ok(())
    }

    /// Start a new round over the given candidates. Host only.
    ///
    /// If a round is still active it is completed first with whatever
    /// votes it has, so starting a round doubles as a round advance.
    pub async fn start_round(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        media_options: Vec<MediaId>,
    ) -> Result<RoundInfo, VotingError> {
        if media_options.is_empty() {
            return Err(VotingError::EmptyMediaOptions);
        }
        let slot = self.slot(session_id)?;
        let info = {
            let mut session = slot.session.lock().await;
            if !session.is_active() {
                return Err(VotingError::SessionClosed {
                    session_id: session_id.clone(),
                });
            }
            if &session.host_id != user_id {
                return Err(VotingError::NotAuthorized {
                    user_id: user_id.clone(),
                    action: "start a round".into(),
                });
            }

            let mut broadcasts = Vec::new();
            if let Some(message) = complete_active_round(&mut session) {
                broadcasts.push(message);
            }

            #[allow(clippy::cast_possible_truncation)]
            let sequence = session.rounds.len() as u32 + 1;
            let round = Round::new(sequence, media_options);
            let info = RoundInfo {
                id: round.id.clone(),
                media_options: round.media_options.clone(),
            };
            session.rounds.push(round);
            session.status = SessionStatus::InProgress;
            broadcasts.push(ServerMessage::RoundStarted {
                round: info.clone(),
            });
            self.publish(session_id, broadcasts);
            info
        };

        info!(session_id = %session_id, round_id = %info.id, "round started");
        Ok(info)
    }

    /// Record a vote in the active round.
    ///
    /// Validation failures are returned to the caller and never reach
    /// other participants. An accepted vote broadcasts progress, and the
    /// vote that brings the round to full turnout also completes it.
    pub async fn cast_vote(
        &self,
        session_id: &SessionId,
        user_id: UserId,
        media_id: MediaId,
        value: i8,
        weight: u32,
    ) -> Result<VoteOutcome, VotingError> {
        let slot = self.slot(session_id)?;
        let outcome = {
            let mut session = slot.session.lock().await;
            if !session.is_active() || session.active_round().is_none() {
                return Err(VotingError::SessionClosed {
                    session_id: session_id.clone(),
                });
            }
            if !session.participants.contains_key(&user_id) {
                return Err(VotingError::NotAuthorized {
                    user_id,
                    action: "vote in this session".into(),
                });
            }

            let (min, max) = (self.config.vote_min, self.config.vote_max);
            let total_expected = session.participants.len();
            let round = session
                .active_round_mut()
                .ok_or_else(|| VotingError::SessionClosed {
                    session_id: session_id.clone(),
                })?;

            if !round.has_option(&media_id) {
                return Err(VotingError::UnknownMedia { media_id });
            }
            if value < min || value > max {
                return Err(VotingError::InvalidVoteValue { value, min, max });
            }
            if weight == 0 {
                return Err(VotingError::InvalidVoteWeight { weight });
            }
            if round.has_vote(&user_id, &media_id) {
                return Err(VotingError::DuplicateVote { user_id, media_id });
            }

            round.votes.push(Vote {
                user_id: user_id.clone(),
                media_id,
                value,
                weight,
                cast_at: Utc::now(),
            });
            let round_id = round.id.clone();
            let votes_submitted = round.unique_voters();

            let mut broadcasts = vec![ServerMessage::VoteSubmitted {
                round_id: round_id.clone(),
                votes_submitted,
                total_expected,
            }];
            let completion = try_complete_on_full_turnout(&mut session);
            let results = match &completion {
                Some(ServerMessage::RoundCompleted { results, .. }) => Some(results.clone()),
                _ => None,
            };
            if let Some(message) = completion {
                broadcasts.push(message);
            }
            self.publish(session_id, broadcasts);

            VoteOutcome {
                round_id,
                votes_submitted,
                total_expected,
                round_completed: results.is_some(),
                results,
            }
        };

        debug!(
            session_id = %session_id,
            user_id = %user_id,
            votes_submitted = outcome.votes_submitted,
            total_expected = outcome.total_expected,
            completed = outcome.round_completed,
            "vote recorded"
        );
        Ok(outcome)
    }

    /// Complete the active round now, regardless of turnout. Host only.
    pub async fn end_round(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<RoundResults, VotingError> {
        let slot = self.slot(session_id)?;
        let results = {
            let mut session = slot.session.lock().await;
            if &session.host_id != user_id {
                return Err(VotingError::NotAuthorized {
                    user_id: user_id.clone(),
                    action: "end the round".into(),
                });
            }
            let message =
                complete_active_round(&mut session).ok_or_else(|| VotingError::SessionClosed {
                    session_id: session_id.clone(),
                })?;
            let results = match &message {
                ServerMessage::RoundCompleted { results, .. } => results.clone(),
                _ => unreachable!("complete_active_round yields ROUND_COMPLETED"),
            };
            self.publish(session_id, vec![message]);
            results
        };

        info!(session_id = %session_id, "round ended by host");
        Ok(results)
    }

    /// Change the participant cap. Host only. A cap below the current
    /// roster size keeps existing participants and only blocks new ones.
    pub async fn update_settings(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        max_participants: usize,
    ) -> Result<(), VotingError> {
        let slot = self.slot(session_id)?;
        let mut session = slot.session.lock().await;
        if !session.is_active() {
            return Err(VotingError::SessionClosed {
                session_id: session_id.clone(),
            });
        }
        if &session.host_id != user_id {
            return Err(VotingError::NotAuthorized {
                user_id: user_id.clone(),
                action: "update session settings".into(),
            });
        }
        session.max_participants = max_participants;
        info!(session_id = %session_id, max_participants, "session settings updated");
        Ok(())
    }

    /// Close the session. Host only. An active round is completed with
    /// its current votes before the session closes.
    pub async fn end_session(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<(), VotingError> {
        let slot = self.slot(session_id)?;
        {
            let mut session = slot.session.lock().await;
            if !session.is_active() {
                return Err(VotingError::SessionClosed {
                    session_id: session_id.clone(),
                });
            }
            if &session.host_id != user_id {
                return Err(VotingError::NotAuthorized {
                    user_id: user_id.clone(),
                    action: "end the session".into(),
                });
            }
            let mut broadcasts = Vec::new();
            if let Some(message) = complete_active_round(&mut session) {
                broadcasts.push(message);
            }
            session.status = SessionStatus::Closed;
            self.publish(session_id, broadcasts);
        }

        info!(session_id = %session_id, "session closed by host");
        Ok(())
    }

    /// Mark the host's connection as alive. Called by the transport on
    /// every frame received from the host; frames from other
    /// participants are a no-op.
    pub async fn record_host_heartbeat(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<(), VotingError> {
        let slot = self.slot(session_id)?;
        let mut session = slot.session.lock().await;
        if &session.host_id == user_id {
            session.host_last_seen = Utc::now();
        }
        Ok(())
    }

    /// Close every active session whose host has been silent longer than
    /// `grace`. Returns how many sessions were closed.
    pub async fn close_stale_sessions(&self, grace: Duration) -> usize {
        let cutoff = Utc::now() - grace;
        let slots: Vec<(SessionId, Arc<SessionSlot>)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut closed = 0;
        for (session_id, slot) in slots {
            {
                let mut session = slot.session.lock().await;
                if !session.is_active() || session.host_last_seen >= cutoff {
                    continue;
                }
                let mut broadcasts = Vec::new();
                if let Some(message) = complete_active_round(&mut session) {
                    broadcasts.push(message);
                }
                session.status = SessionStatus::Closed;
                self.publish(&session_id, broadcasts);
            }
            warn!(session_id = %session_id, "closing session with stale host");
            closed += 1;
        }
        closed
    }

    /// Results of the most recently completed round, if any.
    pub async fn results(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<RoundResults>, VotingError> {
        let slot = self.slot(session_id)?;
        let session = slot.session.lock().await;
        Ok(session
            .latest_completed_round()
            .and_then(|round| aggregator::aggregate(&round.media_options, &round.votes)))
    }
}

/// Complete the active round unconditionally. Returns the
/// `ROUND_COMPLETED` message to broadcast, or `None` if no round is
/// active. The `Active` status check makes completion exactly-once.
fn complete_active_round(session: &mut Session) -> Option<ServerMessage> {
    let round = session.active_round_mut()?;
    let results = aggregator::aggregate(&round.media_options, &round.votes)?;
    round.status = RoundStatus::Completed;
    round.winner = Some(results.winner.media_id.clone());
    Some(ServerMessage::RoundCompleted {
        round_id: round.id.clone(),
        winning_media: results.winner.media_id.clone(),
        results,
    })
}

/// Complete the active round only if every current participant has
/// voted in it.
fn try_complete_on_full_turnout(session: &mut Session) -> Option<ServerMessage> {
    let full_turnout = match session.active_round() {
        Some(round) => session.all_participants_voted(round),
        None => false,
    };
    if full_turnout {
        complete_active_round(session)
    } else {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
