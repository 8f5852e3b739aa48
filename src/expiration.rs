//! Expiration policy for cache entries.
//!
//! An [`Expiration`] describes how long an entry should live once inserted
//! (`life`) and how long it may go between successful reads before being
//! considered stale (`idle`). Unlike the single-`Instant` TTL model, both
//! bounds can be active at once: an entry expires the moment either one is
//! exceeded. A policy with both set to zero is [`Expiration::eternal`] and
//! never expires by time (the backing store may still evict it under
//! pressure; see [`crate::store::Store`]).
use std::time::Duration;

/// Describes when a cache entry should be considered expired.
///
/// Durations are plain [`Duration`] values, so there is no separate
/// "time unit" to track or validate — conversion to a unit is just
/// `Duration::as_millis()`/`as_secs()`/etc. on the accessor's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiration {
    life: Duration,
    idle: Duration,
}

impl Expiration {
    /// Sentinel policy with no life or idle bound; the entry never expires
    /// by time.
    pub const ETERNAL: Expiration = Expiration {
        life: Duration::ZERO,
        idle: Duration::ZERO,
    };

    /// Shorthand for [`Expiration::ETERNAL`].
    pub fn eternal() -> Self {
        Self::ETERNAL
    }

    /// A policy with only a life-time bound: the entry expires `life` after
    /// insertion regardless of how often it is read.
    pub fn of_life(life: Duration) -> Self {
        Self {
            life,
            idle: Duration::ZERO,
        }
    }

    /// A policy with only an idle-time bound: the entry expires if `idle`
    /// passes between successful reads (or since insertion, if never read).
    pub fn of_idle(idle: Duration) -> Self {
        Self {
            life: Duration::ZERO,
            idle,
        }
    }

    /// A policy with both a life-time and an idle-time bound.
    pub fn of_life_and_idle(life: Duration, idle: Duration) -> Self {
        Self { life, idle }
    }

    /// Start building a policy field-by-field.
    pub fn builder() -> ExpirationBuilder {
        ExpirationBuilder::default()
    }

    /// Whether this policy never expires an entry by time.
    pub fn is_eternal(&self) -> bool {
        self.life.is_zero() && self.idle.is_zero()
    }

    /// The life-time bound, or [`Duration::ZERO`] if unset.
    pub fn life(&self) -> Duration {
        self.life
    }

    /// The idle-time bound, or [`Duration::ZERO`] if unset.
    pub fn idle(&self) -> Duration {
        self.idle
    }
}

impl Default for Expiration {
    /// Defaults to [`Expiration::eternal`].
    fn default() -> Self {
        Self::ETERNAL
    }
}

/// Builds an [`Expiration`] field by field.
///
/// Equivalent to chaining [`Expiration::of_life_and_idle`], provided for
/// call sites that prefer to set life and idle independently.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpirationBuilder {
    life: Duration,
    idle: Duration,
}

impl ExpirationBuilder {
    /// Set the life-time bound.
    pub fn life(mut self, life: Duration) -> Self {
        self.life = life;
        self
    }

    /// Set the idle-time bound.
    pub fn idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// Finish building the policy.
    pub fn build(self) -> Expiration {
        Expiration {
            life: self.life,
            idle: self.idle,
        }
    }
}

// Automatic conversion from `Duration` — a life-time-only policy.
impl From<Duration> for Expiration {
    fn from(duration: Duration) -> Self {
        Expiration::of_life(duration)
    }
}

// Automatic conversion from `u64` — a number of milliseconds of life-time.
impl From<u64> for Expiration {
    fn from(millis: u64) -> Self {
        Duration::from_millis(millis).into()
    }
}
