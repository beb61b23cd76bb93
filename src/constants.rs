//! Tunable constants that are not exposed as CLI options because they encode
//! protocol invariants rather than deployment choices.

use std::time::Duration;

/// Nicknames must be at least this many characters (§3 Participant).
pub const NICKNAME_MIN_LEN: usize = 3;
/// Nicknames must be at most this many characters (§3 Participant).
pub const NICKNAME_MAX_LEN: usize = 20;

/// Join codes are 6 characters drawn from `A-Z0-9`.
pub const JOIN_CODE_LEN: usize = 6;
pub const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Maximum slack added to `timerEndTime` when accepting a late answer (§4.3 step 4).
pub const ANSWER_GRACE: Duration = Duration::from_millis(250);

/// Upper bound on an inbound WebSocket frame, checked before any other
/// processing (§4.3 step 1).
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024;

/// Cadence of `timer_tick` broadcasts while a question is active (§4.2).
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Leaderboard broadcasts are coalesced to at most one per this interval,
/// per session (§4.5).
pub const LEADERBOARD_COALESCE_INTERVAL: Duration = Duration::from_millis(250);
/// Default number of entries included in a `leaderboard_updated` broadcast.
pub const LEADERBOARD_DEFAULT_TOP_N: usize = 20;

/// Streak bonus formula constants (§4.4).
pub const STREAK_STEP: i64 = 10;
pub const STREAK_CAP: i64 = 100;

/// How long a connection has to complete the `authenticate` handshake
/// before it is dropped (§4.8).
pub const AUTH_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default reconnection grace window: how long after the last ping a
/// disconnected participant may still recover their session (§4.7, §6).
pub const RECOVERY_GRACE: Duration = Duration::from_secs(5 * 60);

/// TTL for the durable `session:{id}:state` ephemeral mirror (§6).
pub const SESSION_STATE_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// I/O deadlines (§5 Cancellation & timeouts).
pub const EPHEMERAL_IO_DEADLINE: Duration = Duration::from_millis(200);
pub const DURABLE_IO_DEADLINE: Duration = Duration::from_secs(1);
pub const AUDIT_IO_DEADLINE: Duration = Duration::from_secs(2);

/// Bearer token lifetimes (§4.8, §6 A4). A host token outlives a single
/// connection since the same controller reconnects across the whole
/// session; a participant token is scoped to the recovery grace window,
/// since a token nobody can use to recover past it is no safer to keep
/// around than to let expire.
pub const HOST_TOKEN_TTL: Duration = Duration::from_secs(12 * 60 * 60);
pub const PARTICIPANT_TOKEN_TTL: Duration = RECOVERY_GRACE;

/// Rate limiter windows and caps (§4.6).
pub const JOIN_LIMIT_WINDOW: Duration = Duration::from_secs(60);
pub const JOIN_LIMIT_MAX: i64 = 5;
pub const ANSWER_LIMIT_WINDOW: Duration = Duration::from_secs(300);
pub const ANSWER_LIMIT_MAX: i64 = 1;
pub const MESSAGE_LIMIT_WINDOW: Duration = Duration::from_secs(1);
pub const MESSAGE_LIMIT_MAX: i64 = 10;
