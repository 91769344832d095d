//! Configuration for the simulation.
//!
//! Loads from `TAVERN_*` environment variables with the classic defaults:
//! 4/3/2/2 tables, a 30 second run, a party per second.

use crate::engine::ReceiveDiscipline;
use crate::error::ConfigError;
use crate::roles::CoordinatorSchedule;
use crate::state::{StateLimits, TableLayout};
use crate::types::{PartySize, RequesterId};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Simulation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Tables per class
    pub tables: TableLayout,
    /// Seating engine settings
    pub engine: EngineConfig,
    /// Party generation
    pub parties: PartySettings,
    /// Manager interventions
    pub schedule: ScheduleConfig,
    /// Run length, seeding and teardown
    pub run: RunConfig,
}

/// Seating engine settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Queue and party index bounds
    pub limits: StateLimits,
    /// How the engine waits for requests
    pub discipline: ReceiveDiscipline,
}

/// How parties are generated and behave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySettings {
    /// Parties let in over the run
    pub count: u32,
    /// Pause between parties
    pub interval: Duration,
    /// Largest party size, sizes are drawn from `1..=max_size`
    pub max_size: u8,
    /// Chance, in percent, that a party leaves without ordering
    pub no_order_percent: u8,
    /// Time a seated party spends eating
    pub eating_time: Duration,
}

/// When the manager steps in, as offsets from the start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Double the three-seat tables, `None` to never double
    pub doubling_at: Option<Duration>,
    /// Reserve seats, `None` to never reserve
    pub reservation_at: Option<Duration>,
    /// Seats to reserve
    pub reservation_seats: u32,
    /// Raise the fire alarm before the run ends, `None` to wait for the end
    pub fire_at: Option<Duration>,
}

/// Run length, seeding and teardown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Simulation length; the alarm is raised when it elapses
    pub duration: Duration,
    /// Time the cashier takes per payment
    pub payment_time: Duration,
    /// Seed for party generation and reservations
    pub seed: Option<u64>,
    /// Log a table snapshot this often, `None` to disable
    pub snapshot_interval: Option<Duration>,
    /// How long to wait for each role when shutting down
    pub shutdown_timeout: Duration,
    /// Append logs to this file instead of stdout
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tables: TableLayout::default(),
            engine: EngineConfig {
                limits: StateLimits::default(),
                discipline: ReceiveDiscipline::default(),
            },
            parties: PartySettings {
                count: 30,
                interval: Duration::from_secs(1),
                max_size: 3,
                no_order_percent: 5,
                eating_time: Duration::from_secs(3),
            },
            schedule: ScheduleConfig {
                doubling_at: Some(Duration::from_secs(10)),
                reservation_at: Some(Duration::from_secs(15)),
                reservation_seats: 2,
                fire_at: Some(Duration::from_secs(29)),
            },
            run: RunConfig {
                duration: Duration::from_secs(30),
                payment_time: Duration::from_secs(2),
                seed: None,
                snapshot_interval: None,
                shutdown_timeout: Duration::from_secs(10),
                log_file: None,
            },
        }
    }
}

/// Parsed value of `TAVERN_{name}`, if set and well formed
fn var<T: FromStr>(name: &str) -> Option<T> {
    env::var(format!("TAVERN_{name}")).ok().and_then(|s| s.trim().parse().ok())
}

/// Offset variable: seconds, or `off` to disable
fn offset(name: &str, default: Option<Duration>) -> Option<Duration> {
    match env::var(format!("TAVERN_{name}")) {
        Ok(value) if value.trim().eq_ignore_ascii_case("off") => None,
        Ok(value) => value.trim().parse().ok().map(Duration::from_secs).or(default),
        Err(_) => default,
    }
}

impl Config {
    /// Load configuration from `TAVERN_*` environment variables
    ///
    /// Unset or malformed variables fall back to the defaults. Call
    /// [`validate`](Self::validate) before using the result.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let discipline = match var::<ReceiveDiscipline>("ENGINE_DISCIPLINE") {
            Some(ReceiveDiscipline::Polling { interval }) => ReceiveDiscipline::Polling {
                interval: var("ENGINE_POLL_MS").map_or(interval, Duration::from_millis),
            },
            Some(blocking) => blocking,
            None => defaults.engine.discipline,
        };

        Self {
            tables: TableLayout {
                ones: var("TABLES_1").unwrap_or(defaults.tables.ones),
                twos: var("TABLES_2").unwrap_or(defaults.tables.twos),
                threes: var("TABLES_3").unwrap_or(defaults.tables.threes),
                fours: var("TABLES_4").unwrap_or(defaults.tables.fours),
            },
            engine: EngineConfig {
                limits: StateLimits {
                    waiting_capacity: var("WAITING_CAPACITY")
                        .unwrap_or(defaults.engine.limits.waiting_capacity),
                    party_index_capacity: var("PARTY_INDEX_CAPACITY")
                        .unwrap_or(defaults.engine.limits.party_index_capacity),
                },
                discipline,
            },
            parties: PartySettings {
                count: var("PARTY_COUNT").unwrap_or(defaults.parties.count),
                interval: var("PARTY_INTERVAL_MS")
                    .map_or(defaults.parties.interval, Duration::from_millis),
                max_size: var("MAX_PARTY_SIZE").unwrap_or(defaults.parties.max_size),
                no_order_percent: var("NO_ORDER_PERCENT")
                    .unwrap_or(defaults.parties.no_order_percent),
                eating_time: var("EATING_SECS")
                    .map_or(defaults.parties.eating_time, Duration::from_secs),
            },
            schedule: ScheduleConfig {
                doubling_at: offset("DOUBLING_AT_SECS", defaults.schedule.doubling_at),
                reservation_at: offset("RESERVATION_AT_SECS", defaults.schedule.reservation_at),
                reservation_seats: var("RESERVATION_SEATS")
                    .unwrap_or(defaults.schedule.reservation_seats),
                fire_at: offset("FIRE_AT_SECS", defaults.schedule.fire_at),
            },
            run: RunConfig {
                duration: var("DURATION_SECS").map_or(defaults.run.duration, Duration::from_secs),
                payment_time: var("PAYMENT_SECS")
                    .map_or(defaults.run.payment_time, Duration::from_secs),
                seed: var("SEED"),
                snapshot_interval: var("SNAPSHOT_INTERVAL_MS").map(Duration::from_millis),
                shutdown_timeout: var("SHUTDOWN_TIMEOUT_SECS")
                    .map_or(defaults.run.shutdown_timeout, Duration::from_secs),
                log_file: env::var("TAVERN_LOG_FILE").ok().map(PathBuf::from),
            },
        }
    }

    /// Check the configuration can run
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tables.tables(false) == 0 {
            return Err(ConfigError::NoTables);
        }

        let needed = self.tables.max_parties(true);
        if self.engine.limits.party_index_capacity < needed {
            return Err(ConfigError::IndexTooSmall {
                capacity: self.engine.limits.party_index_capacity,
                needed,
            });
        }

        if PartySize::new(self.parties.max_size).is_none() {
            return Err(ConfigError::PartySize(self.parties.max_size));
        }
        if self.parties.no_order_percent > 100 {
            return Err(ConfigError::Percentage {
                name: "TAVERN_NO_ORDER_PERCENT",
                value: self.parties.no_order_percent,
            });
        }

        if self.run.duration.is_zero() {
            return Err(ConfigError::ZeroDuration("TAVERN_DURATION_SECS"));
        }
        if self.run.snapshot_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(ConfigError::ZeroDuration("TAVERN_SNAPSHOT_INTERVAL_MS"));
        }
        if let ReceiveDiscipline::Polling { interval } = self.engine.discipline {
            if interval.is_zero() {
                return Err(ConfigError::ZeroDuration("TAVERN_ENGINE_POLL_MS"));
            }
        }

        Ok(())
    }

    /// The coordinator's trigger schedule
    #[must_use]
    pub fn coordinator_schedule(&self) -> CoordinatorSchedule {
        CoordinatorSchedule {
            doubling_at: self.schedule.doubling_at,
            reservation_at: self.schedule.reservation_at,
            fire_at: self.schedule.fire_at,
            reservation_seats: self.schedule.reservation_seats,
            requester: RequesterId::new(1),
            reply_timeout: self.run.shutdown_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.tables, TableLayout::new(4, 3, 2, 2));
        assert_eq!(config.engine.discipline, ReceiveDiscipline::Blocking);
    }

    #[test]
    fn index_must_cover_a_full_room() {
        let mut config = Config::default();
        config.engine.limits.party_index_capacity = 10;
        assert_eq!(
            config.validate(),
            Err(ConfigError::IndexTooSmall {
                capacity: 10,
                needed: 4 + 2 * (3 + 4 + 2),
            })
        );
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = Config::default();
        config.parties.max_size = 5;
        assert_eq!(config.validate(), Err(ConfigError::PartySize(5)));

        let mut config = Config::default();
        config.tables = TableLayout::new(0, 0, 0, 0);
        assert_eq!(config.validate(), Err(ConfigError::NoTables));

        let mut config = Config::default();
        config.parties.no_order_percent = 101;
        assert!(matches!(config.validate(), Err(ConfigError::Percentage { .. })));

        let mut config = Config::default();
        config.run.snapshot_interval = Some(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroDuration("TAVERN_SNAPSHOT_INTERVAL_MS")));
    }

    #[test]
    fn schedule_carries_offsets() {
        let config = Config::default();
        let schedule = config.coordinator_schedule();
        assert_eq!(schedule.doubling_at, Some(Duration::from_secs(10)));
        assert_eq!(schedule.reservation_seats, 2);
        assert_eq!(schedule.fire_at, Some(Duration::from_secs(29)));
    }
}
