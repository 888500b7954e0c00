//! Editor defaults and the project configuration served by the backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::network_editor::types::{LongLat, NodeType};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeInfo {
	pub title: String,
	pub color: String,
	#[serde(default)]
	pub disabled: bool,
}

/// Client-side settings. Every field has a default so partial overrides
/// deserialize cleanly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
	pub default_node_size: f64,
	pub initial_scale: f64,
	pub initial_center: LongLat,
	pub min_scale: f64,
	pub max_scale: f64,
	pub fit_margin: f64,
	pub fit_iterations: u32,
	pub fit_max_scale: f64,
	pub transition_ms: f64,
	pub wheel_zoom_in: f64,
	pub wheel_zoom_out: f64,
	/// Pointer tolerance in pixels when hit-testing edges.
	pub edge_hit_tolerance: f64,
	pub max_graph_size: usize,
	pub node_types: BTreeMap<NodeType, NodeTypeInfo>,
	pub poll_interval_ms: u32,
	pub poll_max_attempts: u32,
	pub scenario_name: String,
}

impl Default for EditorConfig {
	fn default() -> Self {
		let node_types = [
			(NodeType::LandSurface, "Land Surface", "limegreen", false),
			(NodeType::TreatmentFacility, "Treatment Facility", "steelblue", false),
			(NodeType::TreatmentSite, "Treatment Site", "orangered", true),
			(NodeType::Untyped, "None", "dimgrey", false),
		]
		.into_iter()
		.map(|(t, title, color, disabled)| {
			(
				t,
				NodeTypeInfo {
					title: title.into(),
					color: color.into(),
					disabled,
				},
			)
		})
		.collect();

		Self {
			default_node_size: 20.0,
			initial_scale: (1u64 << 20) as f64,
			initial_center: LongLat(-116.9337, 32.74337),
			min_scale: (1u64 << 6) as f64,
			max_scale: (1u64 << 30) as f64,
			fit_margin: 0.9,
			fit_iterations: 1,
			fit_max_scale: (1u64 << 28) as f64,
			transition_ms: 800.0,
			wheel_zoom_in: 1.1,
			wheel_zoom_out: 0.9,
			edge_hit_tolerance: 6.0,
			max_graph_size: 100,
			node_types,
			poll_interval_ms: 1000,
			poll_max_attempts: 60,
			scenario_name: "New Scenario".into(),
		}
	}
}

impl EditorConfig {
	pub fn node_color(&self, node_type: NodeType) -> Option<&str> {
		self.node_types.get(&node_type).map(|info| info.color.as_str())
	}
}

/// Where a reference polygon dataset comes from and which property to read.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
	/// File hosted by the backend reference-data route.
	#[serde(default)]
	pub filepath: Option<String>,
	/// Any other location.
	#[serde(default)]
	pub url: Option<String>,
	/// Object name inside a topology.
	#[serde(default)]
	pub name: Option<String>,
	/// Feature property holding the value of interest.
	#[serde(default)]
	pub field: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSpatialData {
	#[serde(default)]
	pub state_boundaries: Option<DatasetDescriptor>,
	#[serde(default)]
	pub design_storm: Option<DatasetDescriptor>,
	#[serde(default)]
	pub ref_data_key: Option<DatasetDescriptor>,
}

/// Configuration served by `GET /config?state=&region=`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
	#[serde(default)]
	pub project_spatial_data: ProjectSpatialData,
}
