//! Protocol time: ticks of a configured unit since the Unix epoch.

use std::{
    fmt::{self, Display, Formatter},
    ops::{Add, Sub},
    str::FromStr,
    time::Duration,
};

use datasize::DataSize;
use derive_more::{From, Into};
use humantime::DurationError;
#[cfg(any(feature = "testing", test))]
use rand::Rng;
use serde::{de::Error as SerdeError, Deserialize, Deserializer, Serialize, Serializer};

#[cfg(any(feature = "testing", test))]
use crate::testing::TestRng;
use crate::bytesrepr::{self, FromBytes, ToBytes};

/// A point in protocol time, counted in [`TickUnit`]s since the Unix epoch.
#[derive(
    DataSize,
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    From,
    Into,
)]
pub struct Tick(u64);

impl Tick {
    /// The Unix epoch.
    pub const ZERO: Tick = Tick(0);

    /// Returns the tick count.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns `self + diff`, or `None` on overflow.
    pub fn checked_add(self, diff: TickDiff) -> Option<Tick> {
        self.0.checked_add(diff.0).map(Tick)
    }

    /// Returns `self - diff`, or `None` if the result would precede the epoch.
    pub fn checked_sub(self, diff: TickDiff) -> Option<Tick> {
        self.0.checked_sub(diff.0).map(Tick)
    }

    /// Returns the distance from `earlier` to `self`, or `None` if `earlier` is later.
    pub fn checked_diff(self, earlier: Tick) -> Option<TickDiff> {
        self.0.checked_sub(earlier.0).map(TickDiff)
    }

    /// Returns a random tick within the first few decades after the epoch.
    #[cfg(any(feature = "testing", test))]
    pub fn random(rng: &mut TestRng) -> Self {
        Tick(rng.gen_range(0..2_000_000_000_000))
    }
}

impl Display for Tick {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "tick {}", self.0)
    }
}

impl Add<TickDiff> for Tick {
    type Output = Tick;

    fn add(self, rhs: TickDiff) -> Tick {
        Tick(self.0 + rhs.0)
    }
}

impl Sub<TickDiff> for Tick {
    type Output = Tick;

    fn sub(self, rhs: TickDiff) -> Tick {
        Tick(self.0 - rhs.0)
    }
}

impl Sub<Tick> for Tick {
    type Output = TickDiff;

    fn sub(self, rhs: Tick) -> TickDiff {
        TickDiff(self.0 - rhs.0)
    }
}

impl ToBytes for Tick {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        self.0.to_bytes()
    }

    fn serialized_length(&self) -> usize {
        self.0.serialized_length()
    }
}

impl FromBytes for Tick {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        u64::from_bytes(bytes).map(|(inner, remainder)| (Tick(inner), remainder))
    }
}

/// A number of ticks.
#[derive(
    DataSize,
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    From,
    Into,
)]
pub struct TickDiff(u64);

impl TickDiff {
    /// An empty span.
    pub const ZERO: TickDiff = TickDiff(0);

    /// Returns the number of ticks.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns `self - rhs`, or `None` if `rhs` is larger.
    pub fn checked_sub(self, rhs: TickDiff) -> Option<TickDiff> {
        self.0.checked_sub(rhs.0).map(TickDiff)
    }

    /// Returns `self * rhs`, or `None` on overflow.
    pub fn checked_mul(self, rhs: u64) -> Option<TickDiff> {
        self.0.checked_mul(rhs).map(TickDiff)
    }
}

impl Display for TickDiff {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} ticks", self.0)
    }
}

impl Add<TickDiff> for TickDiff {
    type Output = TickDiff;

    fn add(self, rhs: TickDiff) -> TickDiff {
        TickDiff(self.0 + rhs.0)
    }
}

/// The real-time length of one tick.
#[derive(DataSize, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickUnit {
    /// One tick per millisecond.
    Milliseconds,
    /// One tick per second.
    Seconds,
    /// One tick per minute.
    Minutes,
    /// One tick per hour.
    Hours,
}

impl TickUnit {
    /// The number of milliseconds in one tick.
    pub const fn millis_per_tick(self) -> u64 {
        match self {
            TickUnit::Milliseconds => 1,
            TickUnit::Seconds => 1_000,
            TickUnit::Minutes => 60_000,
            TickUnit::Hours => 3_600_000,
        }
    }

    /// Converts a duration into whole ticks, rounding down.
    pub fn ticks_in(self, diff: TimeDiff) -> TickDiff {
        TickDiff(diff.millis() / self.millis_per_tick())
    }

    /// Converts milliseconds since the epoch into a tick, rounding down.
    pub fn tick_at_millis(self, millis: u64) -> Tick {
        Tick(millis / self.millis_per_tick())
    }

    /// Converts a tick into milliseconds since the epoch, or `None` on overflow.
    pub fn millis_at_tick(self, tick: Tick) -> Option<u64> {
        tick.0.checked_mul(self.millis_per_tick())
    }
}

impl Default for TickUnit {
    fn default() -> Self {
        TickUnit::Milliseconds
    }
}

/// A time difference in milliseconds, written in config files as e.g. `"7days"` or `"90s"`.
#[derive(DataSize, Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeDiff(u64);

impl TimeDiff {
    /// Returns the time difference as a number of milliseconds.
    pub fn millis(&self) -> u64 {
        self.0
    }

    /// Creates a new time difference from seconds.
    pub const fn from_seconds(seconds: u32) -> Self {
        TimeDiff(seconds as u64 * 1_000)
    }

    /// Creates a new time difference from milliseconds.
    pub const fn from_millis(millis: u64) -> Self {
        TimeDiff(millis)
    }
}

impl Display for TimeDiff {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", humantime::format_duration(Duration::from(*self)))
    }
}

impl FromStr for TimeDiff {
    type Err = DurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let inner = humantime::parse_duration(value)?.as_millis() as u64;
        Ok(TimeDiff(inner))
    }
}

impl From<TimeDiff> for Duration {
    fn from(diff: TimeDiff) -> Duration {
        Duration::from_millis(diff.0)
    }
}

impl From<Duration> for TimeDiff {
    fn from(duration: Duration) -> TimeDiff {
        TimeDiff(duration.as_millis() as u64)
    }
}

impl Serialize for TimeDiff {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            self.to_string().serialize(serializer)
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for TimeDiff {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let value_as_string = String::deserialize(deserializer)?;
            TimeDiff::from_str(&value_as_string).map_err(SerdeError::custom)
        } else {
            let inner = u64::deserialize(deserializer)?;
            Ok(TimeDiff(inner))
        }
    }
}

impl ToBytes for TimeDiff {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        self.0.to_bytes()
    }

    fn serialized_length(&self) -> usize {
        self.0.serialized_length()
    }
}

impl FromBytes for TimeDiff {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        u64::from_bytes(bytes).map(|(inner, remainder)| (TimeDiff(inner), remainder))
    }
}
