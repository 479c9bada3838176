//! The public entry point
//!
//! An [`Adapter`] is a cheap, cloneable handle on one stack. Every operation
//! takes the stack lock for its whole exchange, which keeps one HCI command and
//! one ATT request in flight at a time. Connection events and received
//! notifications are delivered to their callbacks after the lock is released,
//! so those callbacks may call back into the adapter.
//!
//! Characteristic write handlers (`CharacteristicConfig::with_write_event`)
//! are different: they run while a peer's request is being answered, with the
//! stack locked, and must not call into the adapter.

mod device;
mod poller;


pub use device::Device;

use crate::att::NotificationReceiver;
use crate::config::StackConfig;
use crate::error::Result;
use crate::gap::{Address, Advertisement, ConnectionParams, MacAddress, ScanResult};
use crate::gatt::{Characteristic, Service};
use crate::hci::{Transport, UartConfig, UartTransport};
use crate::stack::{Stack, StackEvent};
use log::{debug, error};
use poller::Poller;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::Duration;

pub type BoxedTransport = Box<dyn Transport + Send>;

/// Called with the peer address and `true` on connect, `false` on disconnect
pub type ConnectHandler = Box<dyn FnMut(Address, bool) + Send>;

/// Called with the value of each notification or indication
pub type NotificationHandler = Box<dyn FnMut(&[u8]) + Send>;

/// One registration. `handler` is empty while the callback runs.
struct NotificationSlot {
    id: u64,
    handler: Option<NotificationHandler>,
}

#[derive(Default)]
struct Handlers {
    connect: Option<ConnectHandler>,
    /// Keyed by (connection, value handle)
    notifications: BTreeMap<(u16, u16), NotificationSlot>,
    next_id: u64,
}

pub(crate) struct Shared {
    stack: Mutex<Stack<BoxedTransport>>,
    handlers: Mutex<Handlers>,
    /// Held by the one thread draining the queue
    notifications: Mutex<Option<NotificationReceiver>>,
    /// Set by every delivery attempt, cleared by the drainer
    notifications_pending: AtomicBool,
    poller: Mutex<Option<Poller>>,
    poll_sleep: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking callback must not take the stack down with it
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct Adapter {
    shared: Arc<Shared>,
}

impl Adapter {
    pub fn new<T>(transport: T, config: StackConfig) -> Self
    where
        T: Transport + Send + 'static,
    {
        let poll_sleep = config.poll_sleep();
        let mut stack = Stack::new(Box::new(transport) as BoxedTransport, config);
        let receiver = stack.att_mut().take_notification_receiver();

        Self {
            shared: Arc::new(Shared {
                stack: Mutex::new(stack),
                handlers: Mutex::new(Handlers::default()),
                notifications: Mutex::new(receiver),
                notifications_pending: AtomicBool::new(false),
                poller: Mutex::new(None),
                poll_sleep,
            }),
        }
    }

    /// Open a serial device and build an adapter on it
    pub fn open_uart(uart: &UartConfig, config: StackConfig) -> Result<Self> {
        let transport = UartTransport::open(uart)?;
        Ok(Self::new(transport, config))
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<Shared> {
        Arc::downgrade(&self.shared)
    }

    /// Run `f` with the stack locked, then deliver whatever events it produced
    pub fn with_stack<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Stack<BoxedTransport>) -> Result<R>,
    {
        let (result, events) = {
            let mut stack = lock(&self.shared.stack);
            let result = f(&mut stack);
            (result, stack.take_events())
        };
        self.deliver(events);
        result
    }

    /// Reset the controller and set up the event masks
    pub fn enable(&self) -> Result<()> {
        self.with_stack(|stack| stack.enable())
    }

    /// The controller's public address
    pub fn address(&self) -> Result<MacAddress> {
        self.with_stack(|stack| stack.read_bd_addr())
    }

    pub fn set_random_address(&self, address: MacAddress) -> Result<()> {
        self.with_stack(|stack| stack.set_random_address(address))
    }

    /// One cooperative step. Returns true if a packet was handled.
    pub fn poll(&self) -> Result<bool> {
        self.with_stack(|stack| stack.poll())
    }

    /// Scan until [`Adapter::stop_scan`] is called, which may happen from
    /// inside `callback`. The callback runs without the stack locked.
    pub fn scan<F>(&self, mut callback: F) -> Result<()>
    where
        F: FnMut(&Adapter, ScanResult),
    {
        self.with_stack(|stack| stack.start_scan())?;

        loop {
            let (report, scanning) = self.with_stack(|stack| {
                stack.poll()?;
                Ok((stack.take_adv_report(), stack.is_scanning()))
            })?;

            match report {
                Some(report) => callback(self, ScanResult::from_report(&report)),
                None if !scanning => return Ok(()),
                None => thread::sleep(self.shared.poll_sleep),
            }
        }
    }

    pub fn stop_scan(&self) -> Result<()> {
        self.with_stack(|stack| stack.stop_scan())
    }

    /// Connect to a peripheral, cancelling the attempt after the configured
    /// connect timeout
    pub fn connect(&self, address: Address, params: ConnectionParams) -> Result<Device> {
        let (handle, address) = self.with_stack(|stack| {
            let handle = stack.connect(address, params)?;
            let address = stack.connection(handle).map_or(address, |c| c.address);
            Ok((handle, address))
        })?;
        Ok(Device::new(self.clone(), handle, address))
    }

    /// Register a local service; one [`Characteristic`] per configured
    /// characteristic, in order
    pub fn add_service(&self, service: Service) -> Result<Vec<Characteristic>> {
        let handles = self.with_stack(|stack| stack.add_service(service))?;
        Ok(handles
            .characteristics
            .into_iter()
            .map(|handles| Characteristic::new(self.clone(), handles))
            .collect())
    }

    pub fn default_advertisement(&self) -> Advertisement {
        Advertisement::new(self.clone())
    }

    pub fn set_connect_handler<F>(&self, handler: F)
    where
        F: FnMut(Address, bool) + Send + 'static,
    {
        lock(&self.shared.handlers).connect = Some(Box::new(handler));
    }

    /// Poll from a helper thread until [`Adapter::stop`] or the last handle
    /// is dropped. Does nothing if the poller already runs.
    pub fn start_background_poller(&self) {
        let mut poller = lock(&self.shared.poller);
        if poller.is_some() {
            return;
        }
        match Poller::spawn(self.downgrade(), self.shared.poll_sleep) {
            Ok(p) => *poller = Some(p),
            Err(err) => error!("could not start the poller: {}", err),
        }
    }

    /// Stop the background poller
    pub fn stop(&self) {
        let poller = lock(&self.shared.poller).take();
        drop(poller);
    }

    /// Install or remove the callback for notifications of `handle` on
    /// `connection`
    pub(crate) fn register_notification(&self, connection: u16, handle: u16, handler: Option<NotificationHandler>) {
        let mut handlers = lock(&self.shared.handlers);
        match handler {
            Some(handler) => {
                let id = handlers.next_id;
                handlers.next_id += 1;
                handlers.notifications.insert(
                    (connection, handle),
                    NotificationSlot {
                        id,
                        handler: Some(handler),
                    },
                );
            }
            None => {
                handlers.notifications.remove(&(connection, handle));
            }
        }
    }

    pub(crate) fn drop_registrations(&self, connection: u16) {
        lock(&self.shared.handlers)
            .notifications
            .retain(|(c, _), _| *c != connection);
    }

    /// Notifications dropped because the queue was full
    pub fn dropped_notifications(&self) -> u64 {
        lock(&self.shared.stack).att().dropped_notifications()
    }

    fn deliver(&self, events: Vec<StackEvent>) {
        for event in events {
            let (address, connected) = match event {
                StackEvent::Connected { address, .. } => (address, true),
                StackEvent::Disconnected { handle, address, .. } => {
                    self.drop_registrations(handle);
                    (address, false)
                }
            };

            // Taken out while it runs so it may replace itself
            let handler = lock(&self.shared.handlers).connect.take();
            if let Some(mut handler) = handler {
                handler(address, connected);
                lock(&self.shared.handlers).connect.get_or_insert(handler);
            }
        }

        self.deliver_notifications();
    }

    /// Drain the notification queue into the registered callbacks.
    ///
    /// Only one thread drains at a time. A caller that finds the queue busy
    /// (another thread, or a callback re-entering the adapter) leaves the
    /// pending flag set and the drainer makes another pass.
    fn deliver_notifications(&self) {
        let shared = &self.shared;
        shared.notifications_pending.store(true, Ordering::SeqCst);
        loop {
            let guard = match shared.notifications.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };
            if !shared.notifications_pending.swap(false, Ordering::SeqCst) {
                return;
            }
            let Some(receiver) = guard.as_ref() else {
                return;
            };
            while let Ok(notification) = receiver.try_recv() {
                self.notify(notification.connection, notification.handle, &notification.value);
            }
        }
    }

    fn notify(&self, connection: u16, handle: u16, value: &[u8]) {
        let key = (connection, handle);
        let taken = lock(&self.shared.handlers)
            .notifications
            .get_mut(&key)
            .and_then(|slot| Some((slot.id, slot.handler.take()?)));
        let Some((id, mut handler)) = taken else {
            debug!("no callback for notification 0x{:04x} on 0x{:04x}", handle, connection);
            return;
        };

        handler(value);

        // Put it back unless it was removed or replaced while running
        let mut handlers = lock(&self.shared.handlers);
        if let Some(slot) = handlers.notifications.get_mut(&key).filter(|slot| slot.id == id) {
            slot.handler = Some(handler);
        }
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter").finish_non_exhaustive()
    }
}
