//! # Tavern
//!
//! A restaurant seat-allocation engine and the simulation around it.
//!
//! The [`engine`] owns every table. It runs as a reducer inside a
//! [`tavern_runtime::Store`], whose lock is the only guard over the
//! allocation state. Parties, the cashier and the manager are independent
//! tasks that reach the engine through the request [`channel`], a control
//! channel and the fire [`alarm`].
//!
//! ## Example
//!
//! ```no_run
//! use tavern::{Config, Simulation};
//!
//! # async fn demo() -> Result<(), tavern::SimulationError> {
//! let report = Simulation::new(Config::default())?.run().await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod alarm;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod mocks;
pub mod roles;
pub mod simulation;
pub mod snapshot;
pub mod state;
pub mod types;

pub use alarm::{FireAlarm, FireWatch};
pub use channel::{ChannelError, Message, MessageKind, MessageQueue, Outbox, ReplyKey, Selector};
pub use config::Config;
pub use engine::{EngineAction, SeatingReducer, SeatingService, SeatingStore};
pub use error::{ConfigError, SimulationError};
pub use simulation::{Simulation, SimulationReport, Tally};
pub use snapshot::AllocationSnapshot;
pub use state::{AllocationState, StateLimits, TableLayout};
pub use types::{PartyId, PartySize, RequesterId, SeatReply, TableClass, TableRef};
