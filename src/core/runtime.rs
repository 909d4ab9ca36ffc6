use crate::catalog::Catalog;
use crate::config::Config;
use crate::engine::{
    ControllerSettings, Navigation, RewardModifier, SessionController, TickOutcome, TICK_QUANTUM,
};
use crate::sync::backend::RewardBackend;
use crate::sync::ledger::BalanceView;
use crate::sync::{ServerSync, SyncEvent, SyncHandle};
use crate::telemetry::LogHandle;
use crate::time::Clock;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

/// Requests accepted by a running [`WatchRuntime`], applied in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCommand {
    Navigate(Navigation),
    RefreshBalance,
    Shutdown,
}

/// Cloneable front door to a running [`WatchRuntime`].
#[derive(Clone)]
pub struct RuntimeHandle {
    commands: mpsc::UnboundedSender<RuntimeCommand>,
}

impl RuntimeHandle {
    /// Returns false once the runtime has stopped.
    pub fn send(&self, command: RuntimeCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn navigate(&self, nav: Navigation) -> bool {
        self.send(RuntimeCommand::Navigate(nav))
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(RuntimeCommand::Shutdown);
    }
}

/// Drives one viewer: the 1 Hz tick, presence heartbeat, balance and rates
/// refresh, and navigation, all on a single task so session state is only
/// ever touched in order.
pub struct WatchRuntime<B: RewardBackend, C: Clock> {
    config: Config,
    sync: ServerSync<B, C>,
    controller: SessionController<C, SyncHandle>,
    worker: JoinHandle<()>,
    commands_tx: mpsc::UnboundedSender<RuntimeCommand>,
    commands_rx: mpsc::UnboundedReceiver<RuntimeCommand>,
    log_handle: Option<LogHandle>,
}

impl<B: RewardBackend, C: Clock> WatchRuntime<B, C> {
    /// Must be called from within a tokio runtime; the sync worker is spawned here.
    pub fn new(
        config: Config,
        backend: Arc<B>,
        clock: C,
        log_handle: Option<LogHandle>,
    ) -> Result<Self> {
        config.validate()?;
        let sync = ServerSync::new(backend, clock.clone(), config.sync.backoff());
        let (sink, worker) = sync.spawn();
        let settings = ControllerSettings::from_config(&config);
        let controller = SessionController::new(clock, sink, settings);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            sync,
            controller,
            worker,
            commands_tx,
            commands_rx,
            log_handle,
        })
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            commands: self.commands_tx.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sync.subscribe()
    }

    pub fn sync(&self) -> &ServerSync<B, C> {
        &self.sync
    }

    pub fn controller(&self) -> &SessionController<C, SyncHandle> {
        &self.controller
    }

    pub fn log_handle(&self) -> Option<LogHandle> {
        self.log_handle.clone()
    }

    /// Fetch the catalog from the backend and install it. Returns the number of playable ads.
    pub async fn load_catalog(&mut self) -> Result<usize> {
        let catalog = Catalog::fetch(self.sync.backend().as_ref(), self.config.session.shuffle)
            .await
            .context("failed to load ad catalog")?;
        let count = catalog.len();
        tracing::info!(ads = count, "catalog loaded");
        self.controller.load_catalog(catalog);
        Ok(count)
    }

    pub fn install_catalog(&mut self, catalog: Catalog) {
        self.controller.load_catalog(catalog);
    }

    /// Run until a shutdown command arrives or every handle is dropped. The
    /// active session is abandoned and in-flight submissions are drained
    /// before returning the final balance.
    pub async fn run(self) -> Result<BalanceView> {
        let Self {
            config,
            sync,
            mut controller,
            worker,
            commands_tx,
            mut commands_rx,
            ..
        } = self;
        drop(commands_tx);

        let start = Instant::now();
        let mut ticker = interval_at(start + TICK_QUANTUM, TICK_QUANTUM);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let heartbeat_every = Duration::from_secs(config.session.heartbeat_seconds);
        let mut heartbeat = interval_at(start + heartbeat_every, heartbeat_every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut balance = interval(Duration::from_secs(config.sync.balance_refresh_seconds));
        balance.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut rates = interval(Duration::from_secs(config.sync.rates_refresh_seconds));
        rates.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let base_modifier =
            RewardModifier::new(config.policy.multiplier, config.policy.bonus_points);
        let (modifier_tx, mut modifier_rx) = mpsc::unbounded_channel::<RewardModifier>();

        tracing::info!(ads = controller.catalog().len(), "watch runtime started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let TickOutcome::Credited { completed: true, .. } = controller.tick() {
                        tracing::info!("ad finished; waiting for navigation");
                    }
                }
                _ = heartbeat.tick() => {
                    if controller.active().is_some() {
                        let sync = sync.clone();
                        tokio::spawn(async move { sync.heartbeat().await });
                    }
                }
                _ = balance.tick() => {
                    let sync = sync.clone();
                    tokio::spawn(async move { sync.refresh_balance().await });
                }
                _ = rates.tick() => {
                    let sync = sync.clone();
                    let tx = modifier_tx.clone();
                    tokio::spawn(async move {
                        if let Some(modifier) = sync.fetch_modifier(base_modifier).await {
                            let _ = tx.send(modifier);
                        }
                    });
                }
                Some(modifier) = modifier_rx.recv() => {
                    if modifier != controller.settings().modifier {
                        controller.set_modifier(modifier);
                    }
                }
                command = commands_rx.recv() => match command {
                    Some(RuntimeCommand::Navigate(nav)) => {
                        // A fresh session gets a full quantum before its first tick.
                        if controller.navigate(nav) {
                            ticker.reset();
                        }
                    }
                    Some(RuntimeCommand::RefreshBalance) => {
                        let sync = sync.clone();
                        tokio::spawn(async move { sync.refresh_balance().await });
                    }
                    Some(RuntimeCommand::Shutdown) | None => break,
                },
            }
        }

        tracing::info!("watch runtime stopping");
        controller.close();
        drop(controller);
        if let Err(err) = worker.await {
            tracing::warn!("sync worker ended abnormally: {err:?}");
        }
        Ok(sync.refresh_balance().await)
    }
}
