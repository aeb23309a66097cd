//! Background Sync Scheduler
//!
//! Drives every registered collection on its own periodic interval using
//! Tokio tasks, plus on-demand triggers (app foreground, explicit user
//! action). Orchestrators are held behind the object-safe [`SyncDriver`]
//! trait so one scheduler mixes collections of different record types.
//!
//! All scheduled work goes through the drivers' silent path: a failed
//! background cycle is logged by the orchestrator and retried at the next
//! tick, never surfaced to the user.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use async_trait::async_trait;
use chrono::Utc;

use crate::db::Database;

use super::records::DataDomain;

/// Object-safe view of an orchestrator, as the scheduler drives it.
#[async_trait]
pub trait SyncDriver: Send + Sync {
    fn domain(&self) -> DataDomain;

    /// One background cycle; errors are logged inside, never returned.
    async fn sync_silent(&self);
}

/// Scheduler configuration stored in the settings table. Telemetry only:
/// sync correctness never depends on `last_run`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub last_run: Option<String>, // ISO 8601 timestamp
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            last_run: None,
        }
    }
}

/// Scheduler errors
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler is not running")]
    NotRunning,
}

/// Periodic driver of all registered collections.
#[derive(Clone)]
pub struct BackgroundScheduler {
    db: Arc<Database>,
    drivers: Arc<StdMutex<Vec<Arc<dyn SyncDriver>>>>,
    config: Arc<RwLock<SchedulerConfig>>,
    running: Arc<AtomicBool>,
    task_handles: Arc<StdMutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundScheduler {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            drivers: Arc::new(StdMutex::new(Vec::new())),
            config: Arc::new(RwLock::new(SchedulerConfig::default())),
            running: Arc::new(AtomicBool::new(false)),
            task_handles: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// Register a collection driver. Registration while running takes
    /// effect at the next start.
    pub fn register(&self, driver: Arc<dyn SyncDriver>) {
        log::debug!("Registering {} for background sync", driver.domain().as_str());
        self.drivers.lock().unwrap().push(driver);
    }

    /// Load configuration from database settings table
    pub async fn load_config(&self) -> Result<(), SchedulerError> {
        let config: SchedulerConfig = self
            .db
            .get_setting("scheduler_config")
            .map_err(|e| SchedulerError::Database(e.to_string()))?
            .unwrap_or_default();

        *self.config.write().await = config;
        Ok(())
    }

    /// Save configuration to database settings table
    pub async fn save_config(&self) -> Result<(), SchedulerError> {
        let config = self.config.read().await.clone();
        self.db
            .set_setting("scheduler_config", &config)
            .map_err(|e| SchedulerError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn get_config(&self) -> SchedulerConfig {
        self.config.read().await.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Spawn one interval loop per registered driver, each on its
    /// domain's cadence. The first tick fires immediately (sync on
    /// startup).
    pub fn start(&self) -> Result<(), SchedulerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let drivers = self.drivers.lock().unwrap().clone();
        let mut handles = self.task_handles.lock().unwrap();

        for driver in drivers {
            let running = self.running.clone();
            let config = self.config.clone();
            let db = self.db.clone();

            let handle = tokio::spawn(async move {
                let mut interval = tokio::time::interval(driver.domain().sync_interval());

                loop {
                    interval.tick().await;

                    if !running.load(Ordering::SeqCst) {
                        log::debug!(
                            "{}: scheduler loop stopping",
                            driver.domain().as_str()
                        );
                        break;
                    }

                    driver.sync_silent().await;

                    // Stamp last_run (telemetry, failures only logged)
                    let snapshot = {
                        let mut cfg = config.write().await;
                        cfg.last_run = Some(Utc::now().to_rfc3339());
                        cfg.clone()
                    };
                    if let Err(e) = db.set_setting("scheduler_config", &snapshot) {
                        log::error!("Failed to save scheduler last_run: {}", e);
                    }
                }
            });
            handles.push(handle);
        }

        log::info!("Background scheduler started ({} collections)", handles.len());
        Ok(())
    }

    /// Stop all interval loops.
    pub fn stop(&self) -> Result<(), SchedulerError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        let mut handles = self.task_handles.lock().unwrap();
        for handle in handles.drain(..) {
            handle.abort();
        }

        log::info!("Background scheduler stopped");
        Ok(())
    }

    /// Fire an immediate background pass over every collection, off the
    /// periodic cadence. Used on app foreground, after local mutations
    /// and on connectivity regain.
    pub fn trigger_all(&self) {
        let drivers = self.drivers.lock().unwrap().clone();
        log::debug!("Triggering immediate sync of {} collections", drivers.len());

        for driver in drivers {
            tokio::spawn(async move {
                driver.sync_silent().await;
            });
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingDriver {
        domain: DataDomain,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SyncDriver for CountingDriver {
        fn domain(&self) -> DataDomain {
            self.domain
        }

        async fn sync_silent(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn setup() -> (BackgroundScheduler, Arc<AtomicUsize>) {
        let db = Arc::new(Database::in_memory().unwrap());
        let scheduler = BackgroundScheduler::new(db);
        let calls = Arc::new(AtomicUsize::new(0));
        scheduler.register(Arc::new(CountingDriver {
            domain: DataDomain::Products,
            calls: calls.clone(),
        }));
        (scheduler, calls)
    }

    #[tokio::test]
    async fn test_new_scheduler_not_running() {
        let (scheduler, _) = setup();
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let (scheduler, _) = setup();

        scheduler.start().unwrap();
        let second = scheduler.start();
        assert!(matches!(second, Err(SchedulerError::AlreadyRunning)));

        scheduler.stop().unwrap();
    }

    #[tokio::test]
    async fn test_stop_not_running() {
        let (scheduler, _) = setup();
        assert!(matches!(scheduler.stop(), Err(SchedulerError::NotRunning)));
    }

    #[tokio::test]
    async fn test_first_tick_fires_immediately() {
        let (scheduler, calls) = setup();

        scheduler.start().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        scheduler.stop().unwrap();

        assert!(calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_trigger_all_runs_each_driver() {
        let (scheduler, calls) = setup();

        scheduler.trigger_all();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let (scheduler, _) = setup();

        {
            let mut cfg = scheduler.config.write().await;
            cfg.enabled = false;
            cfg.last_run = Some("2026-02-01T00:00:00Z".to_string());
        }
        scheduler.save_config().await.unwrap();

        // fresh default, then load back
        {
            let mut cfg = scheduler.config.write().await;
            *cfg = SchedulerConfig::default();
        }
        scheduler.load_config().await.unwrap();

        let cfg = scheduler.get_config().await;
        assert!(!cfg.enabled);
        assert_eq!(cfg.last_run.as_deref(), Some("2026-02-01T00:00:00Z"));
    }
}
