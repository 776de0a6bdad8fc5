//! # Raffle Redis
//!
//! [`RedisInventoryLedger`]: the inventory ledger backed by Redis, and
//! [`RedisRateLimiter`]: the reservation rate windows next to it.
//!
//! Per offering, the ledger keeps a counters hash (`total`, `available`,
//! `reserved`), the participant set, each user's held quantity and the live
//! holds keyed by reservation token. Every mutating operation is one Lua
//! script, which Redis runs without interleaving any other command.
//!
//! ```text
//! raffle:{<offering>}:inventory     HASH  total / available / reserved
//! raffle:{<offering>}:participants  SET   user ids
//! raffle:{<offering>}:holdings      HASH  user id → tickets held
//! raffle:{<offering>}:holds         HASH  token → "<user id>:<quantity>"
//! raffle:rate_limit:<window key>    ZSET  reservation id scored by time (ms)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod ledger;
mod rate_limit;
mod scripts;

pub use ledger::{DEFAULT_KEY_PREFIX, RedisInventoryLedger};
pub use rate_limit::RedisRateLimiter;
