//! Wiring: builds the engine and every role, runs them, tears them down.

use crate::alarm::FireAlarm;
use crate::channel::MessageQueue;
use crate::config::Config;
use crate::engine::{
    ControlEvent, EngineAction, RandomPicker, SeatingEnvironment, SeatingReducer, SeatingService,
    SeatingStore, ServiceExit,
};
use crate::error::{Result, SimulationError};
use crate::roles::{
    Cashier, CoordinatorAction, CoordinatorEnvironment, CoordinatorReducer, CoordinatorState,
    CoordinatorStore, Generator, Monitor, PartyOutcome,
};
use crate::snapshot::AllocationSnapshot;
use crate::state::AllocationState;
use crate::types::ReservationReport;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tavern_core::environment::SystemClock;
use tavern_runtime::{Store, StoreConfig, StoreError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

/// Grace period for the coordinator's unfired triggers
const COORDINATOR_GRACE: Duration = Duration::from_millis(100);

/// Engine events counted over a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    /// Parties seated on arrival
    pub seated: u32,
    /// Parties seated from the waiting queue
    pub seated_from_queue: u32,
    /// Parties that had to wait
    pub queued: u32,
    /// Parties turned away
    pub rejected: u32,
    /// Parties that left and freed their seats
    pub released: u32,
    /// Dish returns from parties that were not seated
    pub ignored_releases: u32,
}

impl Tally {
    /// Count one engine event; commands are ignored
    pub fn record(&mut self, action: &EngineAction) {
        match action {
            EngineAction::Seated {
                from_queue: false, ..
            } => self.seated += 1,
            EngineAction::Seated {
                from_queue: true, ..
            } => self.seated_from_queue += 1,
            EngineAction::Queued { .. } => self.queued += 1,
            EngineAction::Rejected { .. } => self.rejected += 1,
            EngineAction::Released { .. } => self.released += 1,
            EngineAction::ReleaseIgnored { .. } => self.ignored_releases += 1,
            _ => {},
        }
    }
}

/// Everything a finished run reports
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulationReport {
    /// Tables when the engine stopped
    pub snapshot: AllocationSnapshot,
    /// Engine events over the run
    pub tally: Tally,
    /// How every party's visit ended, in completion order
    pub outcomes: Vec<PartyOutcome>,
    /// Payments the cashier acknowledged
    pub payments: u32,
    /// The engine's answer to the manager's reservation, if one was made
    pub reservation: Option<ReservationReport>,
    /// Why the engine loop stopped
    pub engine_exit: ServiceExit,
}

impl SimulationReport {
    /// Parties whose visit ended with `outcome`
    #[must_use]
    pub fn count(&self, outcome: impl Fn(&PartyOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| outcome(o)).count()
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.tally;
        writeln!(
            f,
            "parties {} | served {} rejected {} evacuated {} left without ordering {}",
            self.outcomes.len(),
            self.count(|o| matches!(o, PartyOutcome::Served { .. })),
            self.count(|o| matches!(o, PartyOutcome::Rejected)),
            self.count(|o| matches!(o, PartyOutcome::Evacuated)),
            self.count(|o| matches!(o, PartyOutcome::LeftWithoutOrdering)),
        )?;
        writeln!(
            f,
            "engine: seated {} (+{} from queue) queued {} rejected {} released {} | payments {}",
            t.seated, t.seated_from_queue, t.queued, t.rejected, t.released, self.payments,
        )?;
        if let Some(report) = &self.reservation {
            writeln!(
                f,
                "reservation: {} of {} seats on {} tables",
                report.reserved_seats,
                report.requested_seats,
                report.reserved_tables.len()
            )?;
        }
        write!(f, "{}", self.snapshot)
    }
}

/// A configured, not yet started simulation
pub struct Simulation {
    config: Config,
    channel: MessageQueue,
    alarm: FireAlarm,
    store: SeatingStore,
    control: mpsc::UnboundedSender<ControlEvent>,
    control_rx: mpsc::UnboundedReceiver<ControlEvent>,
}

impl Simulation {
    /// Validate `config` and build the engine
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Config`] when the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let channel = MessageQueue::new();
        let alarm = FireAlarm::new();
        let (control, control_rx) = mpsc::unbounded_channel();

        let picker = config
            .run
            .seed
            .map_or_else(RandomPicker::from_entropy, RandomPicker::seeded);
        let env = SeatingEnvironment::new(Arc::new(channel.clone()), alarm.clone(), Arc::new(picker));
        let store = Store::with_config(
            AllocationState::new(config.tables, config.engine.limits),
            SeatingReducer::new(),
            env,
            StoreConfig::default()
                .with_broadcast_capacity(4096)
                .with_shutdown_timeout(config.run.shutdown_timeout),
        );

        Ok(Self {
            config,
            channel,
            alarm,
            store,
            control,
            control_rx,
        })
    }

    /// The alarm, for raising it from outside (e.g. on Ctrl+C)
    #[must_use]
    pub fn alarm(&self) -> FireAlarm {
        self.alarm.clone()
    }

    /// The engine store, for read-only inspection
    #[must_use]
    pub fn store(&self) -> SeatingStore {
        self.store.clone()
    }

    /// Run until the fire alarm or the end of the configured duration
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Store`] when a store cannot be started or
    /// shut down, and [`SimulationError::TaskFailed`] when the engine task
    /// dies.
    pub async fn run(self) -> Result<SimulationReport> {
        let Self {
            config,
            channel,
            alarm,
            store,
            control,
            control_rx,
        } = self;
        let timeout = config.run.shutdown_timeout;
        info!(
            tables = ?config.tables,
            duration = ?config.run.duration,
            parties = config.parties.count,
            "Opening the tavern"
        );

        let (stop_tally, tally) = spawn_tally(store.subscribe_actions());

        let engine = tokio::spawn(
            SeatingService::new(
                store.clone(),
                channel.clone(),
                control_rx,
                alarm.clone(),
                config.engine.discipline,
            )
            .run()
            .instrument(info_span!("engine")),
        );

        let cashier = tokio::spawn(
            Cashier::new(channel.clone(), alarm.clone(), config.run.payment_time)
                .run()
                .instrument(info_span!("cashier")),
        );

        let coordinator: CoordinatorStore = Store::new(
            CoordinatorState::default(),
            CoordinatorReducer::new(),
            CoordinatorEnvironment {
                clock: Arc::new(SystemClock),
                control: control.clone(),
                channel: channel.clone(),
                alarm: alarm.clone(),
                schedule: config.coordinator_schedule(),
            },
        );
        coordinator
            .send(CoordinatorAction::Start)
            .instrument(info_span!("coordinator"))
            .await?;

        let generator = tokio::spawn(
            Generator::new(config.parties, config.run.seed, channel.clone(), alarm.clone())
                .run()
                .instrument(info_span!("generator")),
        );

        let monitor = config.run.snapshot_interval.map(|interval| {
            tokio::spawn(
                Monitor::new(store.clone(), alarm.clone(), interval)
                    .run()
                    .instrument(info_span!("monitor")),
            )
        });

        let mut fire = alarm.subscribe();
        tokio::select! {
            () = fire.raised() => info!("Fire alarm raised, closing early"),
            () = tokio::time::sleep(config.run.duration) => {
                if alarm.raise() {
                    warn!("Time is up, raising the fire alarm");
                }
            },
        }

        // Everybody out, then the staff, then the engine
        let outcomes = match await_role("generator", generator, timeout).await {
            Ok(group) => group.join_all(timeout).await,
            Err(error) => {
                warn!(%error, "Generator lost, its parties are abandoned");
                Vec::new()
            },
        };
        let payments = await_role("cashier", cashier, timeout)
            .await
            .inspect_err(|error| warn!(%error, "Cashier did not close cleanly"))
            .unwrap_or_default();
        if let Some(monitor) = monitor {
            if let Err(error) = await_role("monitor", monitor, timeout).await {
                warn!(%error, "Monitor did not stop cleanly");
            }
        }

        match coordinator.shutdown(COORDINATOR_GRACE).await {
            Ok(()) => {},
            Err(StoreError::ShutdownTimeout(pending)) => {
                info!(pending, "Coordinator stopped with triggers that never fired");
            },
            Err(error) => warn!(%error, "Coordinator shutdown failed"),
        }
        let reservation = coordinator.state(|s| s.report.clone()).await;

        if control.send(ControlEvent::Shutdown).is_err() {
            warn!("Engine control channel already closed");
        }
        let engine_exit = await_role("engine", engine, timeout).await;

        store.shutdown(timeout).await?;
        channel.close();
        let snapshot = store.state(AllocationState::snapshot).await;
        if let Err(violation) = store.state(AllocationState::check_invariants).await {
            error!(%violation, "Allocation state inconsistent at shutdown");
        }

        // Nothing is produced after the store stopped
        let _ = stop_tally.send(());
        let tally = tally.await.unwrap_or_else(|error| {
            warn!(%error, "Tally observer failed");
            Tally::default()
        });

        let report = SimulationReport {
            snapshot,
            tally,
            outcomes,
            payments,
            reservation,
            engine_exit: engine_exit?,
        };
        info!("Tavern closed");
        Ok(report)
    }
}

/// Count engine events until told to stop, then drain what is buffered
fn spawn_tally(
    mut events: broadcast::Receiver<EngineAction>,
) -> (oneshot::Sender<()>, JoinHandle<Tally>) {
    let (stop, mut stopped) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let mut tally = Tally::default();
        loop {
            tokio::select! {
                biased;
                _ = &mut stopped => break,
                event = events.recv() => match event {
                    Ok(event) => tally.record(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Tally fell behind, counts are low");
                    },
                    Err(broadcast::error::RecvError::Closed) => return tally,
                },
            }
        }
        while let Ok(event) = events.try_recv() {
            tally.record(&event);
        }
        tally
    });
    (stop, handle)
}

/// Wait for a role's task, aborting it after `timeout`
async fn await_role<T>(role: &'static str, mut handle: JoinHandle<T>, timeout: Duration) -> Result<T> {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(value)) => {
            info!(role, "Stopped gracefully");
            Ok(value)
        },
        Ok(Err(error)) => Err(SimulationError::TaskFailed {
            role,
            reason: error.to_string(),
        }),
        Err(_) => {
            handle.abort();
            Err(SimulationError::TaskFailed {
                role,
                reason: format!("did not stop within {timeout:?}"),
            })
        },
    }
}
