use serde::{Deserialize, Serialize};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
	/// No backend handle yet, or a boot is in progress.
	#[default]
	Uninitialized,
	/// Booted and idle.
	Ready,
	/// A run is in flight.
	Running,
	/// The last boot failed. Only a reset leaves this state.
	Failed,
}

impl SessionStatus {
	/// Stable lowercase name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Uninitialized => "uninitialized",
			Self::Ready => "ready",
			Self::Running => "running",
			Self::Failed => "failed",
		}
	}
}

impl std::fmt::Display for SessionStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}
