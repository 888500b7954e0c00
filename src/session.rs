//! Autosave of the working scenario in `sessionStorage`.

use std::cell::RefCell;
use std::collections::HashMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::components::network_editor::state::EditorState;
use crate::components::network_editor::types::{Edge, GraphData, NodeType, RawNode};
use crate::error::EditorError;

pub const SESSION_KEY: &str = "autosave_graph";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
	#[serde(default)]
	pub graph: GraphData,
	#[serde(default)]
	pub scenario_name: Option<String>,
}

impl SessionSnapshot {
	pub fn capture(state: &EditorState) -> Self {
		Self {
			graph: state.graph().to_data(),
			scenario_name: Some(state.scenario_name().to_string()),
		}
	}

	pub fn to_json(&self) -> Result<String, EditorError> {
		serde_json::to_string(self).map_err(|e| EditorError::Snapshot(e.to_string()))
	}

	pub fn from_json(text: &str) -> Result<Self, EditorError> {
		serde_json::from_str(text).map_err(|e| EditorError::Snapshot(e.to_string()))
	}
}

/// Starter scenario: one land surface draining to one facility.
pub fn default_graph() -> GraphData {
	GraphData {
		nodes: vec![
			RawNode::new("0", NodeType::TreatmentFacility),
			RawNode::new("1", NodeType::LandSurface),
		],
		edges: vec![Edge::new("1", "0")],
	}
}

/// Key/value store holding snapshots.
pub trait SnapshotStore {
	fn read(&self, key: &str) -> Result<Option<String>, EditorError>;
	fn write(&self, key: &str, value: &str) -> Result<(), EditorError>;
	fn remove(&self, key: &str) -> Result<(), EditorError>;
}

/// The browser's `window.sessionStorage`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserSession;

impl BrowserSession {
	fn storage(&self) -> Result<web_sys::Storage, EditorError> {
		web_sys::window()
			.ok_or_else(|| EditorError::Storage("no window".into()))?
			.session_storage()
			.map_err(|e| EditorError::Storage(format!("{:?}", e)))?
			.ok_or_else(|| EditorError::Storage("sessionStorage unavailable".into()))
	}
}

impl SnapshotStore for BrowserSession {
	fn read(&self, key: &str) -> Result<Option<String>, EditorError> {
		self.storage()?
			.get_item(key)
			.map_err(|e| EditorError::Storage(format!("{:?}", e)))
	}

	fn write(&self, key: &str, value: &str) -> Result<(), EditorError> {
		self.storage()?
			.set_item(key, value)
			.map_err(|e| EditorError::Storage(format!("{:?}", e)))
	}

	fn remove(&self, key: &str) -> Result<(), EditorError> {
		self.storage()?
			.remove_item(key)
			.map_err(|e| EditorError::Storage(format!("{:?}", e)))
	}
}

#[derive(Debug, Default)]
pub struct MemoryStore(RefCell<HashMap<String, String>>);

impl SnapshotStore for MemoryStore {
	fn read(&self, key: &str) -> Result<Option<String>, EditorError> {
		Ok(self.0.borrow().get(key).cloned())
	}

	fn write(&self, key: &str, value: &str) -> Result<(), EditorError> {
		self.0.borrow_mut().insert(key.to_string(), value.to_string());
		Ok(())
	}

	fn remove(&self, key: &str) -> Result<(), EditorError> {
		self.0.borrow_mut().remove(key);
		Ok(())
	}
}

pub fn save(store: &impl SnapshotStore, snapshot: &SessionSnapshot) -> Result<(), EditorError> {
	store.write(SESSION_KEY, &snapshot.to_json()?)
}

/// Takes the saved snapshot out of `store`. A missing, unreadable or empty
/// snapshot gives the default graph; a saved scenario name is kept either way.
pub fn restore(store: &impl SnapshotStore) -> SessionSnapshot {
	let saved = match store.read(SESSION_KEY) {
		Ok(saved) => saved,
		Err(err) => {
			warn!("could not read session: {}", err);
			None
		}
	};
	let Some(text) = saved else {
		return SessionSnapshot {
			graph: default_graph(),
			scenario_name: None,
		};
	};
	if let Err(err) = store.remove(SESSION_KEY) {
		warn!("could not clear session: {}", err);
	}
	let mut snapshot = SessionSnapshot::from_json(&text).unwrap_or_else(|err| {
		warn!("discarding saved session: {}", err);
		SessionSnapshot::default()
	});
	if snapshot.graph.nodes.is_empty() {
		snapshot.graph = default_graph();
	} else {
		info!("restored {} nodes from session", snapshot.graph.nodes.len());
	}
	snapshot
}
