//! Server-side Lua scripts.
//!
//! Every multi-key mutation on the hot path is a single script so it
//! executes atomically on the shard. Scripts never raise: they validate
//! their argument counts and answer with a uniform
//! `{ok, value, code, message}` tuple that [`ScriptReply`] decodes.
//! Integer arithmetic only; seat counts and prices are integers and the
//! shared bucket runs on milli-tokens.
//!
//! The `redis` crate invokes scripts by SHA and transparently re-issues an
//! `EVAL` when the server answers `NOSCRIPT`; [`load_all`] primes the
//! script cache at startup so steady-state traffic never pays that round
//! trip.

use redis::aio::ConnectionManager;
use redis::Script;
use rushgate_core::{Error, Result};

/// Atomic seat reservation.
///
/// `KEYS = [zone_counter, user_set, reservation]`,
/// `ARGV = [quantity, max_per_user, booking_id, ttl_seconds, record_json]`.
/// Reply value is the remaining availability.
pub const RESERVE: &str = r#"
if #KEYS ~= 3 or #ARGV ~= 5 then
    return {0, 0, 'BAD_ARGS', 'reserve expects 3 keys and 5 args'}
end
local quantity = tonumber(ARGV[1])
local max_per_user = tonumber(ARGV[2])
local ttl = tonumber(ARGV[4])
if not quantity or quantity <= 0 or not max_per_user or not ttl or ttl <= 0 then
    return {0, 0, 'BAD_ARGS', 'quantity and ttl must be positive integers'}
end
if redis.call('EXISTS', KEYS[3]) == 1 then
    return {0, 0, 'ALREADY_EXISTS', 'reservation already exists'}
end
local available = tonumber(redis.call('GET', KEYS[1])) or 0
if available < quantity then
    return {0, available, 'INSUFFICIENT_STOCK', 'zone has ' .. available .. ' seats left'}
end
local held = redis.call('SCARD', KEYS[2])
if held + quantity > max_per_user then
    return {0, available, 'USER_LIMIT_EXCEEDED', 'user holds ' .. held .. ' of ' .. max_per_user}
end
redis.call('DECRBY', KEYS[1], quantity)
redis.call('SADD', KEYS[2], ARGV[3])
redis.call('EXPIRE', KEYS[2], ttl)
redis.call('SET', KEYS[3], ARGV[5], 'EX', ttl)
return {1, available - quantity, '', ''}
"#;

/// Atomic release of a still-reserved hold.
///
/// `KEYS = [zone_counter, user_set, reservation]`,
/// `ARGV = [booking_id, user_id]`. Reply value is the released quantity.
/// Confirmed holds never return to inventory here; settlement owns those.
pub const RELEASE: &str = r#"
if #KEYS ~= 3 or #ARGV ~= 2 then
    return {0, 0, 'BAD_ARGS', 'release expects 3 keys and 2 args'}
end
local raw = redis.call('GET', KEYS[3])
if not raw then
    return {0, 0, 'RESERVATION_NOT_FOUND', 'no reservation for ' .. ARGV[1]}
end
local record = cjson.decode(raw)
if record.user_id ~= ARGV[2] then
    return {0, 0, 'FORBIDDEN', 'reservation belongs to another user'}
end
if record.status == 'confirmed' then
    return {0, 0, 'ALREADY_CONFIRMED', 'confirmed reservations are settled, not released'}
end
redis.call('INCRBY', KEYS[1], record.quantity)
redis.call('SREM', KEYS[2], ARGV[1])
redis.call('DEL', KEYS[3])
return {1, record.quantity, '', ''}
"#;

/// Atomic confirmation: flips status, records the payment and drops the
/// TTL.
///
/// `KEYS = [reservation]`, `ARGV = [booking_id, user_id, payment_id]`.
/// The zone counter is untouched; settlement converts the hold to a sale.
pub const CONFIRM: &str = r#"
if #KEYS ~= 1 or #ARGV ~= 3 then
    return {0, 0, 'BAD_ARGS', 'confirm expects 1 key and 3 args'}
end
local raw = redis.call('GET', KEYS[1])
if not raw then
    return {0, 0, 'RESERVATION_NOT_FOUND', 'no reservation for ' .. ARGV[1]}
end
local record = cjson.decode(raw)
if record.user_id ~= ARGV[2] then
    return {0, 0, 'FORBIDDEN', 'reservation belongs to another user'}
end
if record.status == 'confirmed' then
    return {0, 0, 'ALREADY_CONFIRMED', 'reservation already confirmed'}
end
record.status = 'confirmed'
record.payment_id = ARGV[3]
redis.call('SET', KEYS[1], cjson.encode(record))
return {1, record.quantity, '', ''}
"#;

/// Atomic TTL extension with a hard ceiling.
///
/// `KEYS = [reservation]`, `ARGV = [additional_seconds, max_ttl_seconds]`.
/// Reply value is the new TTL in seconds.
pub const EXTEND: &str = r#"
if #KEYS ~= 1 or #ARGV ~= 2 then
    return {0, 0, 'BAD_ARGS', 'extend expects 1 key and 2 args'}
end
local additional = tonumber(ARGV[1])
local max_ttl = tonumber(ARGV[2])
if not additional or additional <= 0 or not max_ttl then
    return {0, 0, 'BAD_ARGS', 'additional seconds must be a positive integer'}
end
local ttl = redis.call('TTL', KEYS[1])
if ttl == -2 then
    return {0, 0, 'RESERVATION_NOT_FOUND', 'no reservation to extend'}
end
if ttl == -1 then
    return {0, 0, 'ALREADY_CONFIRMED', 'confirmed reservations have no expiry'}
end
local new_ttl = ttl + additional
if new_ttl > max_ttl then
    return {0, ttl, 'MAX_TTL_EXCEEDED', 'extension past ' .. max_ttl .. 's refused'}
end
redis.call('EXPIRE', KEYS[1], new_ttl)
return {1, new_ttl, '', ''}
"#;

/// Atomic queue join.
///
/// `KEYS = [queue_zset, seq_counter, user_hash, registry_set]`,
/// `ARGV = [user_id, session_token, now_epoch, event_id]`.
/// Reply value is the 1-based position; rejoining returns the stored
/// token in the message slot.
pub const QUEUE_JOIN: &str = r#"
if #KEYS ~= 4 or #ARGV ~= 4 then
    return {0, 0, 'BAD_ARGS', 'queue_join expects 4 keys and 4 args'}
end
if redis.call('ZSCORE', KEYS[1], ARGV[1]) then
    local rank = redis.call('ZRANK', KEYS[1], ARGV[1])
    local token = redis.call('HGET', KEYS[3], 'token') or ''
    return {0, rank + 1, 'ALREADY_IN_QUEUE', token}
end
local seq = redis.call('INCR', KEYS[2])
redis.call('ZADD', KEYS[1], seq, ARGV[1])
redis.call('HSET', KEYS[3], 'token', ARGV[2], 'joined_at', ARGV[3], 'last_seen', ARGV[3])
redis.call('SADD', KEYS[4], ARGV[4])
local rank = redis.call('ZRANK', KEYS[1], ARGV[1])
return {1, rank + 1, '', ''}
"#;

/// Token-validated queue departure.
///
/// `KEYS = [queue_zset, user_hash]`, `ARGV = [user_id, session_token]`.
pub const QUEUE_LEAVE: &str = r#"
if #KEYS ~= 2 or #ARGV ~= 2 then
    return {0, 0, 'BAD_ARGS', 'queue_leave expects 2 keys and 2 args'}
end
local stored = redis.call('HGET', KEYS[2], 'token')
if not stored then
    return {0, 0, 'NOT_IN_QUEUE', 'user is not queued'}
end
if stored ~= ARGV[2] then
    return {0, 0, 'FORBIDDEN', 'session token mismatch'}
end
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('DEL', KEYS[2])
return {1, 0, '', ''}
"#;

/// Token-validated liveness heartbeat.
///
/// `KEYS = [user_hash]`, `ARGV = [session_token, now_epoch]`.
pub const QUEUE_HEARTBEAT: &str = r#"
if #KEYS ~= 1 or #ARGV ~= 2 then
    return {0, 0, 'BAD_ARGS', 'queue_heartbeat expects 1 key and 2 args'}
end
local stored = redis.call('HGET', KEYS[1], 'token')
if not stored then
    return {0, 0, 'NOT_IN_QUEUE', 'user is not queued'}
end
if stored ~= ARGV[1] then
    return {0, 0, 'FORBIDDEN', 'session token mismatch'}
end
redis.call('HSET', KEYS[1], 'last_seen', ARGV[2])
return {1, 0, '', ''}
"#;

/// Atomic batch pop of the queue head.
///
/// `KEYS = [queue_zset, registry_set]`,
/// `ARGV = [count, user_hash_prefix, event_id]`.
/// Returns the popped user ids; deregisters the event when drained.
pub const QUEUE_POP: &str = r#"
local count = tonumber(ARGV[1])
if not count or count <= 0 then
    return {}
end
local users = redis.call('ZRANGE', KEYS[1], 0, count - 1)
if #users > 0 then
    redis.call('ZREM', KEYS[1], unpack(users))
    for _, user in ipairs(users) do
        redis.call('DEL', ARGV[2] .. user)
    end
end
if redis.call('ZCARD', KEYS[1]) == 0 then
    redis.call('SREM', KEYS[2], ARGV[3])
end
return users
"#;

/// Idle-entry eviction over the queue head.
///
/// `KEYS = [queue_zset]`,
/// `ARGV = [scan_limit, idle_cutoff_epoch, user_hash_prefix]`.
/// Returns the number of evicted entries. Entries without a hash (already
/// expired) count as stale.
pub const QUEUE_SWEEP: &str = r#"
local limit = tonumber(ARGV[1])
local cutoff = tonumber(ARGV[2])
local users = redis.call('ZRANGE', KEYS[1], 0, limit - 1)
local evicted = 0
for _, user in ipairs(users) do
    local hash_key = ARGV[3] .. user
    local last_seen = tonumber(redis.call('HGET', hash_key, 'last_seen'))
    if not last_seen or last_seen < cutoff then
        redis.call('ZREM', KEYS[1], user)
        redis.call('DEL', hash_key)
        evicted = evicted + 1
    end
end
return evicted
"#;

/// Shared token bucket in integer milli-tokens.
///
/// `KEYS = [bucket_hash]`,
/// `ARGV = [rate_milli_per_sec, burst_milli, now_ms, cost_milli, idle_ttl_ms]`.
/// Returns `{allowed, remaining_milli}`.
pub const TOKEN_BUCKET: &str = r#"
local rate = tonumber(ARGV[1])
local burst = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local cost = tonumber(ARGV[4])
local tokens = tonumber(redis.call('HGET', KEYS[1], 'tokens'))
local last = tonumber(redis.call('HGET', KEYS[1], 'last_refill_ms'))
if not tokens or not last then
    tokens = burst
    last = now
end
local elapsed = now - last
if elapsed > 0 then
    local refill = math.floor(elapsed * rate / 1000)
    if refill > 0 then
        tokens = math.min(burst, tokens + refill)
        last = now
    end
end
local allowed = 0
if tokens >= cost then
    tokens = tokens - cost
    allowed = 1
end
redis.call('HSET', KEYS[1], 'tokens', tokens, 'last_refill_ms', last)
redis.call('PEXPIRE', KEYS[1], tonumber(ARGV[5]))
return {allowed, tokens}
"#;

/// Structured reply every inventory/queue script answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptReply {
    /// Whether the operation applied.
    pub ok: bool,
    /// Operation-specific value (remaining seats, released quantity,
    /// queue position, new TTL).
    pub value: i64,
    /// Empty on success, stable error code otherwise.
    pub code: String,
    /// Context for logs; on `ALREADY_IN_QUEUE` the existing session token.
    pub message: String,
}

impl ScriptReply {
    /// Decode the `{ok, value, code, message}` tuple.
    #[must_use]
    pub fn from_tuple(tuple: (i64, i64, String, String)) -> Self {
        Self {
            ok: tuple.0 == 1,
            value: tuple.1,
            code: tuple.2,
            message: tuple.3,
        }
    }
}

/// The full script set, constructed once and shared.
pub struct ScriptSet {
    /// [`RESERVE`].
    pub reserve: Script,
    /// [`RELEASE`].
    pub release: Script,
    /// [`CONFIRM`].
    pub confirm: Script,
    /// [`EXTEND`].
    pub extend: Script,
    /// [`QUEUE_JOIN`].
    pub queue_join: Script,
    /// [`QUEUE_LEAVE`].
    pub queue_leave: Script,
    /// [`QUEUE_HEARTBEAT`].
    pub queue_heartbeat: Script,
    /// [`QUEUE_POP`].
    pub queue_pop: Script,
    /// [`QUEUE_SWEEP`].
    pub queue_sweep: Script,
    /// [`TOKEN_BUCKET`].
    pub token_bucket: Script,
}

impl ScriptSet {
    /// Build the script set; SHAs are computed locally.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reserve: Script::new(RESERVE),
            release: Script::new(RELEASE),
            confirm: Script::new(CONFIRM),
            extend: Script::new(EXTEND),
            queue_join: Script::new(QUEUE_JOIN),
            queue_leave: Script::new(QUEUE_LEAVE),
            queue_heartbeat: Script::new(QUEUE_HEARTBEAT),
            queue_pop: Script::new(QUEUE_POP),
            queue_sweep: Script::new(QUEUE_SWEEP),
            token_bucket: Script::new(TOKEN_BUCKET),
        }
    }
}

impl Default for ScriptSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Prime the server's script cache with every script in one startup pass.
///
/// # Errors
///
/// Returns [`Error::UpstreamUnavailable`] when `SCRIPT LOAD` fails.
pub async fn load_all(conn: &mut ConnectionManager) -> Result<()> {
    for (name, source) in [
        ("reserve", RESERVE),
        ("release", RELEASE),
        ("confirm", CONFIRM),
        ("extend", EXTEND),
        ("queue_join", QUEUE_JOIN),
        ("queue_leave", QUEUE_LEAVE),
        ("queue_heartbeat", QUEUE_HEARTBEAT),
        ("queue_pop", QUEUE_POP),
        ("queue_sweep", QUEUE_SWEEP),
        ("token_bucket", TOKEN_BUCKET),
    ] {
        let sha: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(source)
            .query_async(conn)
            .await
            .map_err(|e| Error::UpstreamUnavailable {
                message: format!("loading {name} script: {e}"),
            })?;
        tracing::debug!(script = name, sha = %sha, "loaded inventory script");
    }
    Ok(())
}
