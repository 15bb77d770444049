//! Process-wide engines shared by every session that uses them.
//!
//! In-browser interpreters and containers are expensive to start and may be
//! referenced by several sessions at once. A [`SharedRuntime`] loads one lazily
//! on first acquire and counts leases; releasing a lease never destroys the
//! engine while other leases remain.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::debug;

use crate::Result;

/// What happens when the last lease is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
	/// Keep the engine loaded for future sessions (load once per process).
	KeepLoaded,
	/// Hand the engine back to the releasing caller for shutdown.
	DropWhenUnused,
}

struct Slot<R: ?Sized> {
	runtime: Option<Arc<R>>,
	leases: usize,
	loads: u64,
}

/// Lazily-initialized, reference-counted engine slot.
pub struct SharedRuntime<R: ?Sized> {
	name: &'static str,
	retention: Retention,
	slot: Mutex<Slot<R>>,
}

impl<R: ?Sized + Send + Sync> SharedRuntime<R> {
	/// Creates an empty slot.
	pub fn new(name: &'static str, retention: Retention) -> Arc<Self> {
		Arc::new(Self {
			name,
			retention,
			slot: Mutex::new(Slot {
				runtime: None,
				leases: 0,
				loads: 0,
			}),
		})
	}

	/// Returns a lease on the engine, loading it first if needed.
	///
	/// Concurrent acquirers wait for a single load. When `load` fails nothing
	/// is stored, so the next acquire tries again from scratch.
	pub async fn acquire<F, Fut>(self: &Arc<Self>, load: F) -> Result<SharedLease<R>>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<Arc<R>>>,
	{
		let mut slot = self.slot.lock().await;
		let runtime = match &slot.runtime {
			Some(runtime) => runtime.clone(),
			None => {
				debug!(runtime = self.name, "shared.load");
				let runtime = load().await?;
				slot.runtime = Some(runtime.clone());
				slot.loads += 1;
				runtime
			}
		};
		slot.leases += 1;
		debug!(runtime = self.name, leases = slot.leases, "shared.acquire");
		Ok(SharedLease {
			runtime,
			owner: self.clone(),
			released: AtomicBool::new(false),
		})
	}

	/// Number of outstanding leases.
	pub async fn leases(&self) -> usize {
		self.slot.lock().await.leases
	}

	/// Returns true while an engine is loaded.
	pub async fn is_loaded(&self) -> bool {
		self.slot.lock().await.runtime.is_some()
	}

	/// How many times an engine was loaded into this slot.
	pub async fn load_count(&self) -> u64 {
		self.slot.lock().await.loads
	}

	async fn release(&self) -> Option<Arc<R>> {
		let mut slot = self.slot.lock().await;
		slot.leases = slot.leases.saturating_sub(1);
		debug!(runtime = self.name, leases = slot.leases, "shared.release");
		if slot.leases == 0 && self.retention == Retention::DropWhenUnused {
			return slot.runtime.take();
		}
		None
	}
}

/// One session's claim on a shared engine.
pub struct SharedLease<R: ?Sized + Send + Sync> {
	runtime: Arc<R>,
	owner: Arc<SharedRuntime<R>>,
	released: AtomicBool,
}

impl<R: ?Sized + Send + Sync> SharedLease<R> {
	/// The shared engine.
	pub fn runtime(&self) -> &Arc<R> {
		&self.runtime
	}

	/// Gives the lease back. Returns the engine when this was the last lease
	/// and the slot evicts unused engines; the caller then shuts it down.
	/// Releasing twice is a no-op.
	pub async fn release(&self) -> Option<Arc<R>> {
		if self.released.swap(true, Ordering::AcqRel) {
			return None;
		}
		self.owner.release().await
	}
}
