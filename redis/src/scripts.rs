//! Lua scripts for the inventory ledger.
//!
//! Every script takes the same four keys:
//!
//! | Key | Type | Contents |
//! |-----|------|----------|
//! | `KEYS[1]` | hash | `total`, `available`, `reserved` |
//! | `KEYS[2]` | set  | participant user ids |
//! | `KEYS[3]` | hash | user id → tickets held (pending + sold) |
//! | `KEYS[4]` | hash | reservation token → `"<user id>:<quantity>"` |
//!
//! A missing counters hash means the offering was never initialized. Limits
//! are passed as `-1` when unlimited.

/// ARGV: total, sold, hold count, then `token user quantity` per hold, then
/// `user quantity` per holding. Returns 1 if seeded, 0 if already present.
pub(crate) const INITIALIZE: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('DEL', KEYS[2], KEYS[3], KEYS[4])

local total = tonumber(ARGV[1])
local sold = tonumber(ARGV[2])
local hold_count = tonumber(ARGV[3])
local reserved = 0
local i = 4
for _ = 1, hold_count do
  local token, user, qty = ARGV[i], ARGV[i + 1], tonumber(ARGV[i + 2])
  redis.call('HSET', KEYS[4], token, user .. ':' .. qty)
  redis.call('HINCRBY', KEYS[3], user, qty)
  redis.call('SADD', KEYS[2], user)
  reserved = reserved + qty
  i = i + 3
end
while i < #ARGV do
  local user, qty = ARGV[i], tonumber(ARGV[i + 1])
  redis.call('HINCRBY', KEYS[3], user, qty)
  redis.call('SADD', KEYS[2], user)
  i = i + 2
end

local available = math.max(total - sold - reserved, 0)
redis.call('HSET', KEYS[1], 'total', total, 'available', available, 'reserved', reserved)
return 1
";

/// ARGV: token, user, quantity, max participants, max tickets per user.
///
/// Returns `{code, available}` with code 0 not initialized, 1 reserved,
/// 2 already held, 3 insufficient, 4 participants full, 5 per-user cap.
pub(crate) const RESERVE: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return {0, 0}
end
if redis.call('HEXISTS', KEYS[4], ARGV[1]) == 1 then
  return {2, 0}
end

local user = ARGV[2]
local qty = tonumber(ARGV[3])
local max_participants = tonumber(ARGV[4])
local max_per_user = tonumber(ARGV[5])

local held = tonumber(redis.call('HGET', KEYS[3], user) or '0')
if max_per_user >= 0 and held + qty > max_per_user then
  return {5, 0}
end
if max_participants >= 0
  and redis.call('SISMEMBER', KEYS[2], user) == 0
  and redis.call('SCARD', KEYS[2]) >= max_participants then
  return {4, 0}
end

local available = tonumber(redis.call('HGET', KEYS[1], 'available'))
if available < qty then
  return {3, available}
end

redis.call('HINCRBY', KEYS[1], 'available', -qty)
redis.call('HINCRBY', KEYS[1], 'reserved', qty)
redis.call('HINCRBY', KEYS[3], user, qty)
redis.call('SADD', KEYS[2], user)
redis.call('HSET', KEYS[4], ARGV[1], user .. ':' .. qty)
return {1, available - qty}
";

/// ARGV: token. Returns 1 if the hold was given back, 0 if there was none.
pub(crate) const RELEASE: &str = r"
local hold = redis.call('HGET', KEYS[4], ARGV[1])
if not hold then
  return 0
end
local sep = string.find(hold, ':', 1, true)
local user = string.sub(hold, 1, sep - 1)
local qty = tonumber(string.sub(hold, sep + 1))
redis.call('HDEL', KEYS[4], ARGV[1])

if redis.call('EXISTS', KEYS[1]) == 1 then
  local total = tonumber(redis.call('HGET', KEYS[1], 'total'))
  local available = tonumber(redis.call('HGET', KEYS[1], 'available'))
  local reserved = tonumber(redis.call('HGET', KEYS[1], 'reserved'))
  redis.call('HSET', KEYS[1],
    'reserved', math.max(reserved - qty, 0),
    'available', math.min(available + qty, total))
end

local remaining = redis.call('HINCRBY', KEYS[3], user, -qty)
if remaining <= 0 then
  redis.call('HDEL', KEYS[3], user)
  redis.call('SREM', KEYS[2], user)
end
return 1
";

/// ARGV: token. Returns 1 if the hold became sold, 0 if there was none.
pub(crate) const COMMIT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
local hold = redis.call('HGET', KEYS[4], ARGV[1])
if not hold then
  return 0
end
local qty = tonumber(string.sub(hold, string.find(hold, ':', 1, true) + 1))
redis.call('HDEL', KEYS[4], ARGV[1])
local reserved = tonumber(redis.call('HGET', KEYS[1], 'reserved'))
redis.call('HSET', KEYS[1], 'reserved', math.max(reserved - qty, 0))
return 1
";

/// ARGV: user, quantity, max participants, max tickets per user.
/// Returns 0 allowed, 4 participants full, 5 per-user cap.
pub(crate) const CHECK_CAP: &str = r"
local user = ARGV[1]
local qty = tonumber(ARGV[2])
local max_participants = tonumber(ARGV[3])
local max_per_user = tonumber(ARGV[4])

local held = tonumber(redis.call('HGET', KEYS[3], user) or '0')
if max_per_user >= 0 and held + qty > max_per_user then
  return 5
end
if max_participants >= 0
  and redis.call('SISMEMBER', KEYS[2], user) == 0
  and redis.call('SCARD', KEYS[2]) >= max_participants then
  return 4
end
return 0
";

/// ARGV: user, max participants. Returns -1 not initialized, 0 full, 1 added
/// or already present.
pub(crate) const ADD_PARTICIPANT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return -1
end
if redis.call('SISMEMBER', KEYS[2], ARGV[1]) == 1 then
  return 1
end
local max_participants = tonumber(ARGV[2])
if max_participants >= 0 and redis.call('SCARD', KEYS[2]) >= max_participants then
  return 0
end
redis.call('SADD', KEYS[2], ARGV[1])
return 1
";
