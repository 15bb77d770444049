//! Terminal-style output viewer.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::events::{EventBus, EventKind, SessionEvent, Subscription};

const STDOUT_PREFIX: &str = "stdout: ";
const STDERR_PREFIX: &str = "stderr: ";

type UpdateCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Viewer options.
#[derive(Default)]
pub struct TerminalOptions {
	/// Drop error-stream lines from the rendered text.
	pub hide_stderr: bool,
	/// Called with the rendered text after every change.
	pub on_update: Option<UpdateCallback>,
}

impl TerminalOptions {
	/// Sets [`Self::hide_stderr`].
	pub fn hide_stderr(mut self, hide: bool) -> Self {
		self.hide_stderr = hide;
		self
	}

	/// Sets [`Self::on_update`].
	pub fn on_update(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
		self.on_update = Some(Arc::new(callback));
		self
	}
}

impl std::fmt::Debug for TerminalOptions {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TerminalOptions")
			.field("hide_stderr", &self.hide_stderr)
			.field("on_update", &self.on_update.is_some())
			.finish()
	}
}

struct TerminalState {
	text: String,
	options: TerminalOptions,
}

impl TerminalState {
	/// Returns the update callback and the text to hand it, to be called
	/// once the view is unlocked.
	fn apply(&mut self, event: &SessionEvent) -> Option<(UpdateCallback, String)> {
		match event {
			SessionEvent::Output { data, clear } => {
				if *clear {
					self.text.clear();
				}
				self.text.push_str(data);
			}
			SessionEvent::Reset => self.text.clear(),
		}
		let callback = self.options.on_update.clone()?;
		Some((callback, render_output(&self.text, self.options.hide_stderr)))
	}
}

/// Accumulates session output from an [`EventBus`] and renders it with the
/// runner's stream-prefix convention.
pub struct TerminalView {
	state: Arc<Mutex<TerminalState>>,
	subscriptions: Vec<Subscription>,
}

impl TerminalView {
	/// Subscribes to output and reset events on `bus`.
	pub fn attach(bus: &EventBus, options: TerminalOptions) -> Self {
		let state = Arc::new(Mutex::new(TerminalState {
			text: String::new(),
			options,
		}));
		let subscriptions = [EventKind::Output, EventKind::Reset]
			.into_iter()
			.map(|kind| {
				let state = state.clone();
				bus.on(kind, move |event| {
					let update = state.lock().apply(event);
					if let Some((callback, text)) = update {
						callback(&text);
					}
				})
			})
			.collect();
		Self { state, subscriptions }
	}

	/// Accumulated text as received.
	pub fn raw(&self) -> String {
		self.state.lock().text.clone()
	}

	/// Text as displayed.
	pub fn rendered(&self) -> String {
		let state = self.state.lock();
		render_output(&state.text, state.options.hide_stderr)
	}

	/// Toggles the error-stream filter.
	pub fn set_hide_stderr(&self, hide: bool) {
		self.state.lock().options.hide_stderr = hide;
	}

	/// Stops listening. Accumulated text is kept.
	pub fn detach(&self) {
		for subscription in &self.subscriptions {
			subscription.dispose();
		}
	}
}

impl Drop for TerminalView {
	fn drop(&mut self) {
		self.detach();
	}
}

impl std::fmt::Debug for TerminalView {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TerminalView").finish_non_exhaustive()
	}
}

/// Renders output text for display.
///
/// Lines starting with `stderr:` are dropped when `hide_stderr` is set. The
/// `stdout: ` and `stderr: ` stream markers are stripped from the rest.
pub fn render_output(text: &str, hide_stderr: bool) -> String {
	let mut rendered = String::with_capacity(text.len());
	for line in text.split_inclusive('\n') {
		if hide_stderr && line.starts_with(STDERR_PREFIX.trim_end()) {
			continue;
		}
		let line = line
			.strip_prefix(STDOUT_PREFIX)
			.or_else(|| line.strip_prefix(STDERR_PREFIX))
			.unwrap_or(line);
		rendered.push_str(line);
	}
	rendered
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn render_strips_markers_and_filters_stderr() {
		let text = "stdout: hello\nstderr: warning: unused\nplain\nstderr:";
		assert_eq!(render_output(text, false), "hello\nwarning: unused\nplain\nstderr:");
		assert_eq!(render_output(text, true), "hello\nplain\n");
	}

	#[test]
	fn view_follows_clear_and_reset() {
		let bus = EventBus::new();
		let updates = Arc::new(Mutex::new(Vec::new()));
		let view = TerminalView::attach(
			&bus,
			TerminalOptions::default().hide_stderr(true).on_update({
				let updates = updates.clone();
				move |text| updates.lock().push(text.to_string())
			}),
		);

		bus.publish_batch(&[
			SessionEvent::output("stale\n"),
			SessionEvent::clear(),
			SessionEvent::output("stdout: hi\n"),
			SessionEvent::output("stderr: oops\n"),
		]);
		assert_eq!(view.raw(), "stdout: hi\nstderr: oops\n");
		assert_eq!(view.rendered(), "hi\n");
		assert_eq!(updates.lock().last().map(String::as_str), Some("hi\n"));

		view.set_hide_stderr(false);
		assert_eq!(view.rendered(), "hi\noops\n");

		bus.publish(SessionEvent::Reset);
		assert_eq!(view.raw(), "");
		assert_eq!(updates.lock().len(), 5);

		drop(view);
		assert_eq!(bus.listener_count(), 0);
	}

	#[test]
	fn callbacks_may_query_the_view() {
		let bus = EventBus::new();
		let slot: Arc<Mutex<Option<Arc<TerminalView>>>> = Arc::new(Mutex::new(None));
		let seen = Arc::new(Mutex::new(Vec::new()));
		let view = Arc::new(TerminalView::attach(
			&bus,
			TerminalOptions::default().on_update({
				let slot = slot.clone();
				let seen = seen.clone();
				move |_| {
					let view = slot.lock().clone();
					if let Some(view) = view {
						view.set_hide_stderr(true);
						seen.lock().push(view.rendered());
					}
				}
			}),
		));
		*slot.lock() = Some(view.clone());

		bus.publish(SessionEvent::output("stdout: hi\nstderr: oops\n"));
		assert_eq!(*seen.lock(), vec!["hi\n".to_string()]);

		slot.lock().take();
		view.detach();
	}
}
