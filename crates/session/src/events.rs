//! In-process pub/sub for session output.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::mpsc;

/// Event categories listeners register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	/// Output text.
	Output,
	/// The session was reset.
	Reset,
}

/// Event published by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
	/// Output text. With `clear` set, consumers drop what they accumulated first.
	Output {
		/// New text, possibly empty for a bare clear.
		data: String,
		/// Wipe accumulated output before appending `data`.
		clear: bool,
	},
	/// Files, focus and backend were replaced.
	Reset,
}

impl SessionEvent {
	/// Appended output.
	pub fn output(data: impl Into<String>) -> Self {
		Self::Output {
			data: data.into(),
			clear: false,
		}
	}

	/// Clears accumulated output.
	pub fn clear() -> Self {
		Self::Output {
			data: String::new(),
			clear: true,
		}
	}

	/// Category of this event.
	pub fn kind(&self) -> EventKind {
		match self {
			Self::Output { .. } => EventKind::Output,
			Self::Reset => EventKind::Reset,
		}
	}
}

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

struct Registration {
	id: u64,
	kind: EventKind,
	listener: Listener,
}

#[derive(Default)]
struct Listeners {
	next_id: AtomicU64,
	registered: RwLock<Vec<Registration>>,
}

/// Listener registry. Cloning yields another handle to the same bus.
///
/// Each published batch is dispatched against a snapshot of the listeners
/// taken when the batch starts, so listeners may register or dispose others
/// (or themselves) while being called. Such changes apply from the next batch.
#[derive(Clone, Default)]
pub struct EventBus {
	listeners: Arc<Listeners>,
}

impl EventBus {
	/// Creates a bus with no listeners.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `listener` for events of `kind`.
	pub fn on(&self, kind: EventKind, listener: impl Fn(&SessionEvent) + Send + Sync + 'static) -> Subscription {
		let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
		self.listeners.registered.write().push(Registration {
			id,
			kind,
			listener: Arc::new(listener),
		});
		Subscription {
			id,
			listeners: Arc::downgrade(&self.listeners),
		}
	}

	/// Forwards every event into a channel.
	pub fn subscribe(&self) -> Subscriber {
		let (tx, rx) = mpsc::unbounded_channel();
		let subscriptions = [EventKind::Output, EventKind::Reset]
			.into_iter()
			.map(|kind| {
				let tx = tx.clone();
				self.on(kind, move |event| {
					let _ = tx.send(event.clone());
				})
			})
			.collect();
		Subscriber { rx, subscriptions }
	}

	/// Publishes one event.
	pub fn publish(&self, event: SessionEvent) {
		self.publish_batch(&[event]);
	}

	/// Publishes events in order. Listeners run in registration order for each event.
	pub fn publish_batch(&self, events: &[SessionEvent]) {
		let snapshot: Vec<(EventKind, Listener)> = self
			.listeners
			.registered
			.read()
			.iter()
			.map(|r| (r.kind, r.listener.clone()))
			.collect();
		for event in events {
			let kind = event.kind();
			for (_, listener) in snapshot.iter().filter(|(k, _)| *k == kind) {
				listener(event);
			}
		}
	}

	/// Number of registered listeners.
	pub fn listener_count(&self) -> usize {
		self.listeners.registered.read().len()
	}
}

impl std::fmt::Debug for EventBus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventBus")
			.field("listeners", &self.listener_count())
			.finish()
	}
}

/// Registration returned by [`EventBus::on`]. Dropping it keeps the listener;
/// call [`Subscription::dispose`] to unregister.
#[derive(Debug)]
#[must_use = "keep the subscription to be able to dispose the listener"]
pub struct Subscription {
	id: u64,
	listeners: Weak<Listeners>,
}

impl Subscription {
	/// Unregisters the listener. Disposing twice is a no-op.
	pub fn dispose(&self) {
		if let Some(listeners) = self.listeners.upgrade() {
			listeners.registered.write().retain(|r| r.id != self.id);
		}
	}
}

/// Channel-backed subscription to every event. Unregisters on drop.
#[derive(Debug)]
pub struct Subscriber {
	rx: mpsc::UnboundedReceiver<SessionEvent>,
	subscriptions: Vec<Subscription>,
}

impl Subscriber {
	/// Next event, waiting if none is queued.
	pub async fn recv(&mut self) -> Option<SessionEvent> {
		self.rx.recv().await
	}

	/// Next queued event without waiting.
	pub fn try_recv(&mut self) -> Option<SessionEvent> {
		self.rx.try_recv().ok()
	}

	/// Every queued event.
	pub fn drain(&mut self) -> Vec<SessionEvent> {
		std::iter::from_fn(|| self.try_recv()).collect()
	}
}

impl Drop for Subscriber {
	fn drop(&mut self) {
		for subscription in &self.subscriptions {
			subscription.dispose();
		}
	}
}

#[cfg(test)]
mod tests {
	use parking_lot::Mutex;
	use pretty_assertions::assert_eq;

	use super::*;

	fn recorder(bus: &EventBus, kind: EventKind, name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Subscription {
		let log = log.clone();
		bus.on(kind, move |event| log.lock().push(format!("{name}:{event:?}")))
	}

	#[test]
	fn listeners_run_in_registration_order_per_kind() {
		let bus = EventBus::new();
		let log = Arc::new(Mutex::new(Vec::new()));
		let _a = recorder(&bus, EventKind::Output, "a", &log);
		let _r = recorder(&bus, EventKind::Reset, "r", &log);
		let _b = recorder(&bus, EventKind::Output, "b", &log);

		bus.publish_batch(&[SessionEvent::Reset, SessionEvent::output("x")]);

		let output = format!("{:?}", SessionEvent::output("x"));
		assert_eq!(
			*log.lock(),
			vec![
				"r:Reset".to_string(),
				format!("a:{output}"),
				format!("b:{output}"),
			]
		);
	}

	#[test]
	fn dispose_during_dispatch_applies_from_next_batch() {
		let bus = EventBus::new();
		let calls = Arc::new(Mutex::new(Vec::new()));
		let victim_slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

		let _killer = bus.on(EventKind::Output, {
			let calls = calls.clone();
			let bus = bus.clone();
			let victim_slot = victim_slot.clone();
			move |_| {
				calls.lock().push("killer");
				if let Some(victim) = victim_slot.lock().take() {
					victim.dispose();
				}
				// Registering mid-dispatch must not deadlock.
				let _late = bus.on(EventKind::Reset, |_| {});
			}
		});
		let victim = bus.on(EventKind::Output, {
			let calls = calls.clone();
			move |_| calls.lock().push("victim")
		});
		*victim_slot.lock() = Some(victim);

		bus.publish(SessionEvent::output("1"));
		assert_eq!(*calls.lock(), vec!["killer", "victim"]);

		bus.publish(SessionEvent::output("2"));
		assert_eq!(*calls.lock(), vec!["killer", "victim", "killer"]);
	}

	#[test]
	fn dispose_is_idempotent() {
		let bus = EventBus::new();
		let sub = bus.on(EventKind::Output, |_| {});
		assert_eq!(bus.listener_count(), 1);
		sub.dispose();
		sub.dispose();
		assert_eq!(bus.listener_count(), 0);
	}

	#[tokio::test]
	async fn subscriber_receives_everything_until_dropped() {
		let bus = EventBus::new();
		let mut subscriber = bus.subscribe();
		bus.publish_batch(&[SessionEvent::clear(), SessionEvent::output("hi\n"), SessionEvent::Reset]);

		assert_eq!(subscriber.recv().await, Some(SessionEvent::clear()));
		assert_eq!(
			subscriber.drain(),
			vec![SessionEvent::output("hi\n"), SessionEvent::Reset]
		);

		drop(subscriber);
		assert_eq!(bus.listener_count(), 0);
	}
}
