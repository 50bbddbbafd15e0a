//! Background volume enumerator
//!
//! A worker thread lists mounted volumes every `update_interval`. When the
//! listing differs from the published snapshot it swaps in the new snapshot
//! and posts a coalesced "drives changed" notification. The owner thread
//! drains those notifications (on a tick of a third of the interval) and
//! calls every registered [`DiskListObserver`].

use crate::notify::{NotificationQueue, QueueError, QueueSender, Tag};
use crate::system::volumes::{drives_changed, DiskInfo, SystemVolumes, VolumeSource};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default enumeration period
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(1000);

/// Queue tag shared by every drives-changed notification
pub const DRIVES_CHANGED_TAG: Tag = Tag::Coalesce(0);

/// Receives a callback when the volume list changes
///
/// Implementations re-read [`VolumeEnumerator::drives`] for the new data.
pub trait DiskListObserver: Send + Sync {
    /// The volume set or a volume's free space changed
    fn drives_changed(&self);
}

/// Registration handle returned by [`VolumeEnumerator::add_observer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// Errors from the volume enumerator
#[derive(Error, Debug)]
pub enum EnumeratorError {
    /// The same observer instance was registered twice
    #[error("observer is already registered as {0:?}")]
    AlreadyRegistered(ObserverId),

    /// Worker thread could not be started
    #[error("failed to spawn enumerator thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Notifications drained off the owner thread
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Result type alias for enumerator operations
pub type Result<T> = std::result::Result<T, EnumeratorError>;

#[derive(Default)]
struct ObserverRegistry {
    next_id: u64,
    observers: Vec<(ObserverId, Arc<dyn DiskListObserver>)>,
}

impl ObserverRegistry {
    fn find(&self, observer: &Arc<dyn DiskListObserver>) -> Option<ObserverId> {
        let wanted = Arc::as_ptr(observer) as *const ();
        self.observers
            .iter()
            .find(|(_, o)| Arc::as_ptr(o) as *const () == wanted)
            .map(|(id, _)| *id)
    }
}

fn lock_registry(registry: &Mutex<ObserverRegistry>) -> MutexGuard<'_, ObserverRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Call every observer registered at the time the notification runs
fn notify_observers(registry: &Mutex<ObserverRegistry>) {
    // Snapshot the list so callbacks may add or remove observers
    let observers: Vec<_> = lock_registry(registry)
        .observers
        .iter()
        .map(|(_, o)| Arc::clone(o))
        .collect();
    for observer in observers {
        observer.drives_changed();
    }
}

/// State shared by the worker thread and synchronous updates
struct Scanner {
    source: Mutex<Box<dyn VolumeSource>>,
    snapshot: RwLock<Arc<[DiskInfo]>>,
    sender: QueueSender,
    observers: Arc<Mutex<ObserverRegistry>>,
}

impl Scanner {
    fn snapshot(&self) -> Arc<[DiskInfo]> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// One enumeration pass; returns whether the snapshot was replaced
    fn scan(&self) -> bool {
        // Holding the source lock serializes the worker and synchronous passes
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = source.mounted_volumes();

        if !drives_changed(&fresh, &self.snapshot()) {
            return false;
        }

        tracing::info!("Volume list changed ({} volumes)", fresh.len());
        for disk in &fresh {
            tracing::debug!(
                "  {} at {} ({} free)",
                disk.name,
                disk.root_path.display(),
                humansize::format_size(disk.bytes_available, humansize::BINARY)
            );
        }

        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::from(fresh);

        let observers = Arc::clone(&self.observers);
        self.sender
            .enqueue(move || notify_observers(&observers), DRIVES_CHANGED_TAG);
        true
    }
}

/// Live, change-detected list of mounted volumes
pub struct VolumeEnumerator {
    scanner: Arc<Scanner>,
    queue: NotificationQueue,
    observers: Arc<Mutex<ObserverRegistry>>,
    update_interval: Duration,
    ticker: Receiver<Instant>,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl VolumeEnumerator {
    /// Watch the system's volumes with the default interval
    pub fn new() -> Result<Self> {
        Self::with_source(SystemVolumes::new(), DEFAULT_UPDATE_INTERVAL)
    }

    /// Watch `source`, polling it every `update_interval` on a worker thread
    pub fn with_source(source: impl VolumeSource + 'static, update_interval: Duration) -> Result<Self> {
        let mut enumerator = Self::manual(source, update_interval);

        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let scanner = Arc::clone(&enumerator.scanner);
        let worker = thread::Builder::new()
            .name("volume-enumerator".to_string())
            .spawn(move || {
                loop {
                    scanner.scan();
                    match shutdown_rx.recv_timeout(update_interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                tracing::debug!("Volume enumerator thread shutting down");
            })
            .map_err(EnumeratorError::Spawn)?;

        enumerator.shutdown = Some(shutdown_tx);
        enumerator.worker = Some(worker);
        Ok(enumerator)
    }

    /// Enumerator without a worker thread; the snapshot only changes
    /// through [`update_synchronously`](Self::update_synchronously)
    pub fn manual(source: impl VolumeSource + 'static, update_interval: Duration) -> Self {
        let queue = NotificationQueue::new();
        let observers = Arc::new(Mutex::new(ObserverRegistry::default()));
        let scanner = Arc::new(Scanner {
            source: Mutex::new(Box::new(source)),
            snapshot: RwLock::new(Arc::from(Vec::new())),
            sender: queue.sender(),
            observers: Arc::clone(&observers),
        });
        let update_interval = update_interval.max(Duration::from_millis(3));

        Self {
            scanner,
            queue,
            observers,
            update_interval,
            ticker: channel::tick(update_interval / 3),
            shutdown: None,
            worker: None,
        }
    }

    /// Register `observer`; registering the same instance twice is an error
    pub fn add_observer(&self, observer: Arc<dyn DiskListObserver>) -> Result<ObserverId> {
        let mut registry = lock_registry(&self.observers);
        if let Some(existing) = registry.find(&observer) {
            return Err(EnumeratorError::AlreadyRegistered(existing));
        }
        let id = ObserverId(registry.next_id);
        registry.next_id += 1;
        registry.observers.push((id, observer));
        Ok(id)
    }

    /// Unregister; unknown ids are ignored
    pub fn remove_observer(&self, id: ObserverId) {
        lock_registry(&self.observers)
            .observers
            .retain(|(existing, _)| *existing != id);
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        lock_registry(&self.observers).observers.len()
    }

    /// Latest published snapshot
    pub fn drives(&self) -> Arc<[DiskInfo]> {
        self.scanner.snapshot()
    }

    /// Run one enumeration pass on the calling thread
    ///
    /// Returns whether the snapshot changed (and a notification was queued).
    pub fn update_synchronously(&self) -> bool {
        self.scanner.scan()
    }

    /// Deliver pending notifications to observers; owner thread only
    pub fn process_notifications(&self) -> Result<usize> {
        Ok(self.queue.exec()?)
    }

    /// Drain if the drain tick has fired since the last call
    pub fn pump(&self) -> Result<usize> {
        if self.ticker.try_recv().is_ok() {
            self.process_notifications()
        } else {
            Ok(0)
        }
    }

    /// Block until the next drain tick, then drain
    pub fn wait_and_pump(&self) -> Result<usize> {
        let _ = self.ticker.recv();
        self.process_notifications()
    }

    /// Ticker firing every [`drain_interval`](Self::drain_interval), for
    /// integration into a caller's own select loop
    pub fn drain_ticker(&self) -> &Receiver<Instant> {
        &self.ticker
    }

    /// Enumeration period
    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Drain period (a third of the enumeration period)
    pub fn drain_interval(&self) -> Duration {
        self.update_interval / 3
    }

    /// Whether a background worker is running
    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for VolumeEnumerator {
    fn drop(&mut self) {
        // Dropping the sender disconnects the worker's shutdown channel
        self.shutdown.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("Volume enumerator thread panicked");
            }
        }
    }
}

impl fmt::Debug for VolumeEnumerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeEnumerator")
            .field("update_interval", &self.update_interval)
            .field("drives", &self.drives().len())
            .field("observers", &self.observer_count())
            .field("worker", &self.worker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const GIB: u64 = 1024 * 1024 * 1024;

    /// Source returning whatever the test last stored
    #[derive(Clone, Default)]
    struct ScriptedVolumes {
        current: Arc<Mutex<Vec<DiskInfo>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedVolumes {
        fn set(&self, disks: Vec<DiskInfo>) {
            *self.current.lock().unwrap() = disks;
        }
    }

    impl VolumeSource for ScriptedVolumes {
        fn mounted_volumes(&mut self) -> Vec<DiskInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.current.lock().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        hits: AtomicUsize,
    }

    impl DiskListObserver for CountingObserver {
        fn drives_changed(&self) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CountingObserver {
        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    fn manual() -> (VolumeEnumerator, ScriptedVolumes) {
        let source = ScriptedVolumes::default();
        let enumerator = VolumeEnumerator::manual(source.clone(), Duration::from_millis(30));
        (enumerator, source)
    }

    #[test]
    fn test_free_space_change_notifies_once() {
        let (enumerator, source) = manual();
        let observer = Arc::new(CountingObserver::default());
        enumerator.add_observer(observer.clone()).unwrap();

        source.set(vec![DiskInfo::new("sda1", "/", 500 * GIB)]);
        assert!(enumerator.update_synchronously());
        enumerator.process_notifications().unwrap();
        assert_eq!(observer.hits(), 1);

        source.set(vec![DiskInfo::new("sda1", "/", 480 * GIB)]);
        assert!(enumerator.update_synchronously());
        assert_eq!(enumerator.process_notifications().unwrap(), 1);
        assert_eq!(observer.hits(), 2);
        assert_eq!(enumerator.drives()[0].bytes_available, 480 * GIB);
    }

    #[test]
    fn test_identical_enumerations_are_silent() {
        let (enumerator, source) = manual();
        let observer = Arc::new(CountingObserver::default());
        enumerator.add_observer(observer.clone()).unwrap();

        source.set(vec![DiskInfo::new("sda1", "/", 500 * GIB)]);
        enumerator.update_synchronously();
        enumerator.process_notifications().unwrap();
        let before = enumerator.drives();

        assert!(!enumerator.update_synchronously());
        assert!(!enumerator.update_synchronously());
        assert_eq!(enumerator.process_notifications().unwrap(), 0);
        assert_eq!(observer.hits(), 1);
        assert!(Arc::ptr_eq(&before, &enumerator.drives()));
    }

    #[test]
    fn test_changes_before_drain_coalesce() {
        let (enumerator, source) = manual();
        let observer = Arc::new(CountingObserver::default());
        enumerator.add_observer(observer.clone()).unwrap();

        source.set(vec![DiskInfo::new("sda1", "/", 3 * GIB)]);
        enumerator.update_synchronously();
        source.set(vec![DiskInfo::new("sda1", "/", 2 * GIB)]);
        enumerator.update_synchronously();
        source.set(vec![DiskInfo::new("sda1", "/", GIB)]);
        enumerator.update_synchronously();

        assert_eq!(enumerator.process_notifications().unwrap(), 1);
        assert_eq!(observer.hits(), 1);
        assert_eq!(enumerator.drives()[0].bytes_available, GIB);
    }

    #[test]
    fn test_duplicate_observer_rejected() {
        let (enumerator, _source) = manual();
        let observer: Arc<dyn DiskListObserver> = Arc::new(CountingObserver::default());

        let id = enumerator.add_observer(Arc::clone(&observer)).unwrap();
        let err = enumerator.add_observer(Arc::clone(&observer)).unwrap_err();
        assert!(matches!(err, EnumeratorError::AlreadyRegistered(existing) if existing == id));
        assert_eq!(enumerator.observer_count(), 1);
    }

    #[test]
    fn test_remove_observer() {
        let (enumerator, source) = manual();
        let kept = Arc::new(CountingObserver::default());
        let removed = Arc::new(CountingObserver::default());
        enumerator.add_observer(kept.clone()).unwrap();
        let id = enumerator.add_observer(removed.clone()).unwrap();

        enumerator.remove_observer(id);
        enumerator.remove_observer(id);
        assert_eq!(enumerator.observer_count(), 1);

        // Ids are not reused after removal
        let again = enumerator.add_observer(removed.clone()).unwrap();
        assert_ne!(again, id);
        enumerator.remove_observer(again);

        source.set(vec![DiskInfo::new("sdb1", "/mnt", GIB)]);
        enumerator.update_synchronously();
        enumerator.process_notifications().unwrap();
        assert_eq!(kept.hits(), 1);
        assert_eq!(removed.hits(), 0);
    }

    #[test]
    fn test_drain_off_owner_thread_fails() {
        let (enumerator, source) = manual();
        source.set(vec![DiskInfo::new("sda1", "/", GIB)]);
        enumerator.update_synchronously();

        let enumerator = Arc::new(enumerator);
        let remote = Arc::clone(&enumerator);
        let result = thread::spawn(move || remote.process_notifications().map_err(|e| e.to_string()))
            .join()
            .unwrap();
        assert!(result.is_err());
        assert_eq!(enumerator.process_notifications().unwrap(), 1);
    }

    #[test]
    fn test_worker_detects_change() {
        let source = ScriptedVolumes::default();
        source.set(vec![DiskInfo::new("sda1", "/", 10 * GIB)]);
        let enumerator =
            VolumeEnumerator::with_source(source.clone(), Duration::from_millis(15)).unwrap();
        assert!(enumerator.has_worker());
        assert_eq!(enumerator.drain_interval(), Duration::from_millis(5));

        let observer = Arc::new(CountingObserver::default());
        enumerator.add_observer(observer.clone()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while observer.hits() == 0 && Instant::now() < deadline {
            enumerator.wait_and_pump().unwrap();
        }
        assert_eq!(observer.hits(), 1);

        source.set(vec![
            DiskInfo::new("sda1", "/", 10 * GIB),
            DiskInfo::new("sdc1", "/media/usb", 16 * GIB),
        ]);
        let deadline = Instant::now() + Duration::from_secs(5);
        while observer.hits() < 2 && Instant::now() < deadline {
            enumerator.wait_and_pump().unwrap();
        }
        assert_eq!(observer.hits(), 2);
        assert_eq!(enumerator.drives().len(), 2);
        assert!(source.calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_drop_stops_worker() {
        let source = ScriptedVolumes::default();
        let enumerator =
            VolumeEnumerator::with_source(source.clone(), Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(30));
        drop(enumerator);

        let calls = source.calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);
    }
}
