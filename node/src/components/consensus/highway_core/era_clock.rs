//! Era and round timing.
//!
//! All of this is arithmetic on [`Tick`]s: given where an era starts, the clock says where it ends,
//! which ticks inside it are booking and key block boundaries for later eras, and how long voting
//! continues after it ends.

use std::convert::TryFrom;

use chrono::{DateTime, Duration, Months, TimeZone, Utc};
use datasize::DataSize;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use highway_types::{Tick, TickDiff, TickUnit, TimeDiff};

/// Error returned by the era clock.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Tick arithmetic overflowed.
    #[error("tick arithmetic overflowed at {0}")]
    TickOverflow(Tick),
    /// A tick can't be represented as a calendar date, or calendar arithmetic left the range.
    #[error("{0} is outside the supported calendar range")]
    CalendarOutOfRange(Tick),
    /// An era would not advance time.
    #[error("era starting at {start} would end at {end}")]
    EmptyEra {
        /// The era start.
        start: Tick,
        /// The computed end.
        end: Tick,
    },
    /// The entropy period is longer than the booking period.
    #[error("entropy duration of {entropy} exceeds booking duration of {booking}")]
    EntropyExceedsBooking {
        /// Booking period.
        booking: TickDiff,
        /// Entropy period.
        entropy: TickDiff,
    },
    /// Some other invalid setting.
    #[error("invalid era clock configuration: {0}")]
    InvalidConfig(String),
}

/// A calendar unit for era lengths.
#[derive(Clone, Copy, DataSize, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarUnit {
    /// Seconds.
    Seconds,
    /// Minutes.
    Minutes,
    /// Hours.
    Hours,
    /// Days.
    Days,
    /// Weeks.
    Weeks,
    /// Calendar months; a month-end start is clamped to the end of shorter months.
    Months,
    /// Calendar years.
    Years,
}

/// How long an era lasts.
#[derive(Clone, Copy, DataSize, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EraDuration {
    /// A fixed real-time length.
    FixedLength(TimeDiff),
    /// A number of UTC calendar units.
    Calendar {
        /// How many units.
        length: u32,
        /// Which unit.
        unit: CalendarUnit,
    },
}

/// How long validators keep voting after an era ends.
#[derive(Clone, Copy, DataSize, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostEraVoting {
    /// For a fixed real-time period.
    FixedLength(TimeDiff),
    /// Until the era's last block reaches a summit of this level.
    SummitLevel(u8),
}

/// Highway timing configuration.
#[derive(Clone, DataSize, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HighwayConfig {
    /// The real-time length of one tick.
    pub tick_unit: TickUnit,
    /// When the genesis era starts.
    #[data_size(skip)]
    pub genesis_era_start: DateTime<Utc>,
    /// How long an era lasts.
    pub era_duration: EraDuration,
    /// How long before an era starts its booking block is taken.
    pub booking_duration: TimeDiff,
    /// How long the magic bits are collected after the booking block.
    pub entropy_duration: TimeDiff,
    /// How long voting continues after an era ends.
    pub post_era_voting: PostEraVoting,
}

#[derive(Clone, Copy, DataSize, Debug, PartialEq, Eq)]
enum EraLength {
    Fixed(TickDiff),
    Calendar { length: u32, unit: CalendarUnit },
}

/// When voting on an era stops, in ticks.
#[derive(Clone, Copy, DataSize, Debug, PartialEq, Eq)]
pub enum VotingPolicy {
    /// A fixed number of ticks past the era end.
    Fixed(TickDiff),
    /// Once the switch block reaches a summit of this level.
    SummitLevel(u8),
}

/// An era: the span of ticks `[start, end)`.
#[derive(Clone, Copy, DataSize, Debug, PartialEq, Eq)]
pub struct Era {
    /// First tick.
    pub start: Tick,
    /// First tick of the next era.
    pub end: Tick,
    /// Where, in an earlier era, this era's booking block is taken; `None` before the epoch.
    pub booking_boundary: Option<Tick>,
    /// Where, in an earlier era, this era's key block is taken; `None` before the epoch.
    pub key_boundary: Option<Tick>,
    /// Whether this is the genesis era.
    pub is_genesis: bool,
}

/// The life cycle of an era.
#[derive(Clone, Copy, DataSize, Debug, PartialEq, Eq)]
pub enum EraState {
    /// The era is running: blocks and ballots are produced.
    Active,
    /// The era has ended; only ballots finalizing its last block are produced.
    PostEraVoting,
    /// Nothing more is produced in this era.
    Closed,
}

/// Era and round arithmetic for one chain.
#[derive(Clone, DataSize, Debug)]
pub struct EraClock {
    tick_unit: TickUnit,
    genesis_era_start: Tick,
    era_length: EraLength,
    booking_ticks: TickDiff,
    entropy_ticks: TickDiff,
    key_ticks: TickDiff,
    voting_policy: VotingPolicy,
}

impl EraClock {
    /// Creates a clock, converting every duration into ticks.
    pub fn new(config: &HighwayConfig) -> Result<Self, Error> {
        let tick_unit = config.tick_unit;
        let genesis_millis = u64::try_from(config.genesis_era_start.timestamp_millis())
            .map_err(|_| Error::InvalidConfig("genesis era starts before the epoch".to_string()))?;
        let genesis_era_start = tick_unit.tick_at_millis(genesis_millis);
        let era_length = match config.era_duration {
            EraDuration::FixedLength(length) => {
                let ticks = tick_unit.ticks_in(length);
                if ticks == TickDiff::ZERO {
                    return Err(Error::InvalidConfig(format!(
                        "era length {} is shorter than one tick",
                        length
                    )));
                }
                EraLength::Fixed(ticks)
            }
            EraDuration::Calendar { length: 0, .. } => {
                return Err(Error::InvalidConfig(
                    "calendar era length must be positive".to_string(),
                ));
            }
            EraDuration::Calendar { length, unit } => EraLength::Calendar { length, unit },
        };
        let booking_ticks = tick_unit.ticks_in(config.booking_duration);
        let entropy_ticks = tick_unit.ticks_in(config.entropy_duration);
        let key_ticks =
            booking_ticks
                .checked_sub(entropy_ticks)
                .ok_or(Error::EntropyExceedsBooking {
                    booking: booking_ticks,
                    entropy: entropy_ticks,
                })?;
        let voting_policy = match config.post_era_voting {
            PostEraVoting::FixedLength(duration) => {
                VotingPolicy::Fixed(tick_unit.ticks_in(duration))
            }
            PostEraVoting::SummitLevel(level) => VotingPolicy::SummitLevel(level),
        };
        Ok(EraClock {
            tick_unit,
            genesis_era_start,
            era_length,
            booking_ticks,
            entropy_ticks,
            key_ticks,
            voting_policy,
        })
    }

    /// The real-time length of one tick.
    pub fn tick_unit(&self) -> TickUnit {
        self.tick_unit
    }

    /// The first tick of the genesis era.
    pub fn genesis_era_start(&self) -> Tick {
        self.genesis_era_start
    }

    /// The booking period in ticks.
    pub fn booking_ticks(&self) -> TickDiff {
        self.booking_ticks
    }

    /// The entropy period in ticks.
    pub fn entropy_ticks(&self) -> TickDiff {
        self.entropy_ticks
    }

    /// Booking minus entropy: how long before an era starts its key block is taken.
    pub fn key_ticks(&self) -> TickDiff {
        self.key_ticks
    }

    /// The post-era voting policy.
    pub fn voting_policy(&self) -> VotingPolicy {
        self.voting_policy
    }

    /// Returns the end of the era starting at `start`.
    pub fn era_end_tick(&self, start: Tick) -> Result<Tick, Error> {
        let end = match self.era_length {
            EraLength::Fixed(length) => start
                .checked_add(length)
                .ok_or(Error::TickOverflow(start))?,
            EraLength::Calendar { length, unit } => self.calendar_end(start, length, unit)?,
        };
        if end <= start {
            return Err(Error::EmptyEra { start, end });
        }
        Ok(end)
    }

    fn calendar_end(&self, start: Tick, length: u32, unit: CalendarUnit) -> Result<Tick, Error> {
        let out_of_range = || Error::CalendarOutOfRange(start);
        let millis = self
            .tick_unit
            .millis_at_tick(start)
            .ok_or(Error::TickOverflow(start))?;
        let millis = i64::try_from(millis).map_err(|_| out_of_range())?;
        let start_time = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(out_of_range)?;
        let span = i64::from(length);
        let end_time = match unit {
            CalendarUnit::Seconds => start_time.checked_add_signed(Duration::seconds(span)),
            CalendarUnit::Minutes => start_time.checked_add_signed(Duration::minutes(span)),
            CalendarUnit::Hours => start_time.checked_add_signed(Duration::hours(span)),
            CalendarUnit::Days => start_time.checked_add_signed(Duration::days(span)),
            CalendarUnit::Weeks => start_time.checked_add_signed(Duration::weeks(span)),
            CalendarUnit::Months => start_time.checked_add_months(Months::new(length)),
            CalendarUnit::Years => length
                .checked_mul(12)
                .and_then(|months| start_time.checked_add_months(Months::new(months))),
        }
        .ok_or_else(out_of_range)?;
        let end_millis = u64::try_from(end_time.timestamp_millis()).map_err(|_| out_of_range())?;
        Ok(self.tick_unit.tick_at_millis(end_millis))
    }

    /// Returns the end of the genesis era.
    ///
    /// The genesis era is stretched by whole eras until it is longer than the booking period, so
    /// that the eras following it have booking blocks inside it.
    pub fn genesis_era_end_tick(&self) -> Result<Tick, Error> {
        let start = self.genesis_era_start;
        let natural_end = self.era_end_tick(start)?;
        let length = natural_end
            .checked_diff(start)
            .ok_or(Error::EmptyEra {
                start,
                end: natural_end,
            })?
            .value();
        let multiplier = 1 + self.booking_ticks.value() / length;
        (1..multiplier).try_fold(natural_end, |end, _| self.era_end_tick(end))
    }

    /// Returns, in ascending order, the ticks in `[start, end)` that lie `delay` ticks before the
    /// start of a later era.
    pub fn critical_boundaries(
        &self,
        start: Tick,
        end: Tick,
        delay: TickDiff,
    ) -> Result<Vec<Tick>, Error> {
        let mut boundaries = vec![];
        let mut next_start = end;
        loop {
            if let Some(boundary) = next_start.checked_sub(delay) {
                if boundary >= end {
                    break;
                }
                if boundary >= start {
                    boundaries.push(boundary);
                }
            }
            next_start = self.era_end_tick(next_start)?;
        }
        Ok(boundaries)
    }

    /// The booking block boundaries inside `[start, end)`.
    pub fn booking_boundaries(&self, start: Tick, end: Tick) -> Result<Vec<Tick>, Error> {
        self.critical_boundaries(start, end, self.booking_ticks)
    }

    /// The key block boundaries inside `[start, end)`.
    pub fn key_boundaries(&self, start: Tick, end: Tick) -> Result<Vec<Tick>, Error> {
        self.critical_boundaries(start, end, self.key_ticks)
    }

    /// The genesis era.
    pub fn genesis_era(&self) -> Result<Era, Error> {
        let start = self.genesis_era_start;
        Ok(Era {
            start,
            end: self.genesis_era_end_tick()?,
            booking_boundary: start.checked_sub(self.booking_ticks),
            key_boundary: start.checked_sub(self.key_ticks),
            is_genesis: true,
        })
    }

    /// The era that follows `era`.
    pub fn next_era(&self, era: &Era) -> Result<Era, Error> {
        let start = era.end;
        Ok(Era {
            start,
            end: self.era_end_tick(start)?,
            booking_boundary: start.checked_sub(self.booking_ticks),
            key_boundary: start.checked_sub(self.key_ticks),
            is_genesis: false,
        })
    }

    /// The tick at which voting on `era` stops, if the policy fixes one.
    pub fn voting_cutoff(&self, era: &Era) -> Result<Option<Tick>, Error> {
        match self.voting_policy {
            VotingPolicy::Fixed(duration) => era
                .end
                .checked_add(duration)
                .map(Some)
                .ok_or(Error::TickOverflow(era.end)),
            VotingPolicy::SummitLevel(_) => Ok(None),
        }
    }

    /// Returns the state of `era` at `now`.
    ///
    /// `summit_level` is only called under the summit policy, once the era has ended.
    pub fn era_state<F>(&self, era: &Era, now: Tick, summit_level: F) -> Result<EraState, Error>
    where
        F: FnOnce() -> u8,
    {
        if now < era.end {
            return Ok(EraState::Active);
        }
        let closed = match self.voting_policy {
            VotingPolicy::Fixed(_) => match self.voting_cutoff(era)? {
                Some(cutoff) => now >= cutoff,
                None => true,
            },
            VotingPolicy::SummitLevel(level) => summit_level() >= level,
        };
        if closed {
            Ok(EraState::Closed)
        } else {
            Ok(EraState::PostEraVoting)
        }
    }

    /// The length of a round with the given exponent: `2^exponent` ticks.
    pub fn round_length(exponent: u8) -> Option<TickDiff> {
        1u64.checked_shl(u32::from(exponent)).map(TickDiff::from)
    }

    /// The start of the round containing `tick`.
    pub fn round_start(tick: Tick, exponent: u8) -> Option<Tick> {
        let length = Self::round_length(exponent)?.value();
        Some(Tick::from(tick.value() - tick.value() % length))
    }
}
