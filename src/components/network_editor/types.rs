use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::PayloadError;

/// Geographic coordinate pair, `[longitude, latitude]` in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LongLat(pub f64, pub f64);

impl LongLat {
	pub fn lon(&self) -> f64 {
		self.0
	}

	pub fn lat(&self) -> f64 {
		self.1
	}
}

/// A point on the map plane or on screen, depending on context.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Point {
	pub x: f64,
	pub y: f64,
}

impl Point {
	pub const fn new(x: f64, y: f64) -> Self {
		Self { x, y }
	}

	pub fn distance(&self, other: Point) -> f64 {
		let (dx, dy) = (self.x - other.x, self.y - other.y);
		(dx * dx + dy * dy).sqrt()
	}
}

#[derive(
	Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
	LandSurface,
	TreatmentFacility,
	TreatmentSite,
	#[default]
	#[serde(rename = "none", other)]
	Untyped,
}

impl NodeType {
	pub const ALL: [NodeType; 4] = [
		NodeType::LandSurface,
		NodeType::TreatmentFacility,
		NodeType::TreatmentSite,
		NodeType::Untyped,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			NodeType::LandSurface => "land_surface",
			NodeType::TreatmentFacility => "treatment_facility",
			NodeType::TreatmentSite => "treatment_site",
			NodeType::Untyped => "none",
		}
	}

	/// Design-storm and rain-zone attributes only apply to routing nodes.
	pub fn receives_zone_enrichment(&self) -> bool {
		!matches!(self, NodeType::LandSurface)
	}
}

/// Attributes derived from spatial lookups. Stored once per node; export
/// projects them into the payload records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
	pub state: Option<String>,
	pub design_storm_depth_inches: Option<f64>,
	pub ref_data_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LandSurfaceRecord {
	#[serde(default, deserialize_with = "de_id")]
	pub node_id: String,
	#[serde(deserialize_with = "de_id")]
	pub surface_key: String,
	pub area_acres: f64,
	pub imp_area_acres: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FacilityRecord {
	#[serde(default, deserialize_with = "de_id")]
	pub node_id: String,
	pub facility_type: String,
	/// Facility-type specific design parameters, validated by the backend.
	#[serde(flatten)]
	pub parameters: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreatmentSiteRecord {
	#[serde(default, deserialize_with = "de_id")]
	pub node_id: String,
	pub facility_type: String,
	#[serde(default)]
	pub area_pct: f64,
	#[serde(default)]
	pub captured_pct: f64,
	#[serde(default)]
	pub retained_pct: f64,
	#[serde(default)]
	pub eliminate_all_dry_weather_flow_override: bool,
}

/// Typed per-node payload, one variant per node type that carries data.
#[derive(Clone, Debug, PartialEq)]
pub enum NodePayload {
	LandSurface(Vec<LandSurfaceRecord>),
	TreatmentFacility(FacilityRecord),
	TreatmentSite(Vec<TreatmentSiteRecord>),
}

impl NodePayload {
	pub fn node_type(&self) -> NodeType {
		match self {
			NodePayload::LandSurface(_) => NodeType::LandSurface,
			NodePayload::TreatmentFacility(_) => NodeType::TreatmentFacility,
			NodePayload::TreatmentSite(_) => NodeType::TreatmentSite,
		}
	}

	/// Parses and validates the raw `data` value of a node. Enrichment values
	/// embedded in facility data are lifted out and returned as seeds.
	pub fn parse(node_type: NodeType, value: Value) -> Result<(Self, Enrichment), PayloadError> {
		let malformed = |err: serde_json::Error| PayloadError::Malformed {
			node_type: node_type.as_str(),
			message: err.to_string(),
		};
		let mut seeds = Enrichment::default();
		let payload = match node_type {
			NodeType::LandSurface => {
				NodePayload::LandSurface(serde_json::from_value(one_or_many(value)).map_err(malformed)?)
			}
			NodeType::TreatmentSite => {
				NodePayload::TreatmentSite(serde_json::from_value(one_or_many(value)).map_err(malformed)?)
			}
			NodeType::TreatmentFacility => {
				let value = match value {
					Value::Array(mut items) if items.len() == 1 => items.remove(0),
					other => other,
				};
				let mut record: FacilityRecord = serde_json::from_value(value).map_err(malformed)?;
				seeds.design_storm_depth_inches = record
					.parameters
					.remove("design_storm_depth_inches")
					.and_then(|v| number_like(&v));
				seeds.ref_data_key = record
					.parameters
					.remove("ref_data_key")
					.and_then(|v| string_like(&v));
				NodePayload::TreatmentFacility(record)
			}
			NodeType::Untyped => return Err(PayloadError::Unexpected(node_type.as_str())),
		};
		payload.validate()?;
		Ok((payload, seeds))
	}

	pub fn validate(&self) -> Result<(), PayloadError> {
		match self {
			NodePayload::LandSurface(records) => {
				for r in records {
					if !(r.area_acres > 0.0) {
						return Err(PayloadError::OutOfRange {
							field: "area_acres",
							rule: "> 0",
							value: r.area_acres,
						});
					}
					if !(r.imp_area_acres >= 0.0) {
						return Err(PayloadError::OutOfRange {
							field: "imp_area_acres",
							rule: ">= 0",
							value: r.imp_area_acres,
						});
					}
				}
			}
			NodePayload::TreatmentSite(records) => {
				for r in records {
					for (field, value) in [
						("area_pct", r.area_pct),
						("captured_pct", r.captured_pct),
						("retained_pct", r.retained_pct),
					] {
						if !(0.0..=100.0).contains(&value) {
							return Err(PayloadError::OutOfRange {
								field,
								rule: "within 0-100",
								value,
							});
						}
					}
					if r.retained_pct > r.captured_pct {
						return Err(PayloadError::RetainedExceedsCaptured {
							retained: r.retained_pct,
							captured: r.captured_pct,
						});
					}
				}
			}
			NodePayload::TreatmentFacility(r) => {
				if r.facility_type.is_empty() {
					return Err(PayloadError::Malformed {
						node_type: "treatment_facility",
						message: "facility_type is empty".into(),
					});
				}
			}
		}
		Ok(())
	}

	/// Records as transmitted to the backend: every record is stamped with the
	/// owning node id, facilities additionally carry the node's enrichment.
	pub fn records(&self, node_id: &str, enrichment: &Enrichment) -> Vec<Value> {
		let stamp = |v: Value| match v {
			Value::Object(mut map) => {
				map.insert("node_id".into(), Value::String(node_id.to_string()));
				Value::Object(map)
			}
			other => other,
		};
		match self {
			NodePayload::LandSurface(records) => records
				.iter()
				.filter_map(|r| serde_json::to_value(r).ok())
				.map(stamp)
				.collect(),
			NodePayload::TreatmentSite(records) => records
				.iter()
				.filter_map(|r| serde_json::to_value(r).ok())
				.map(stamp)
				.collect(),
			NodePayload::TreatmentFacility(record) => {
				let Ok(Value::Object(mut map)) = serde_json::to_value(record) else {
					return Vec::new();
				};
				if let Some(depth) = enrichment.design_storm_depth_inches {
					map.insert("design_storm_depth_inches".into(), Value::from(depth));
				}
				if let Some(key) = &enrichment.ref_data_key {
					map.insert("ref_data_key".into(), Value::String(key.clone()));
				}
				vec![stamp(Value::Object(map))]
			}
		}
	}
}

/// A node of the treatment network.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
	pub id: String,
	/// Authoritative position.
	pub longlat: LongLat,
	/// Cached screen projection of `longlat`.
	pub x: f64,
	pub y: f64,
	pub size: f64,
	pub node_type: NodeType,
	pub color: Option<String>,
	pub payload: Option<NodePayload>,
	pub enrichment: Enrichment,
}

impl Node {
	pub fn new(id: impl Into<String>, longlat: LongLat, size: f64) -> Self {
		Self {
			id: id.into(),
			longlat,
			x: 0.0,
			y: 0.0,
			size,
			node_type: NodeType::Untyped,
			color: None,
			payload: None,
			enrichment: Enrichment::default(),
		}
	}

	pub fn with_type(mut self, node_type: NodeType) -> Self {
		self.node_type = node_type;
		self
	}

	pub fn position(&self) -> Point {
		Point::new(self.x, self.y)
	}

	/// Payload records with node id and enrichment applied, flattened.
	pub fn records(&self) -> Vec<Value> {
		self.payload
			.as_ref()
			.map(|p| p.records(&self.id, &self.enrichment))
			.unwrap_or_default()
	}

	pub fn to_raw(&self) -> RawNode {
		let data = self.payload.as_ref().map(|p| {
			let mut records = p.records(&self.id, &self.enrichment);
			match p {
				NodePayload::TreatmentFacility(_) if records.len() == 1 => records.remove(0),
				_ => Value::Array(records),
			}
		});
		RawNode {
			id: Some(self.id.clone()),
			longlat: Some(self.longlat),
			x: Some(self.x),
			y: Some(self.y),
			size: Some(self.size),
			node_type: Some(self.node_type),
			color: self.color.clone(),
			data,
			state: self.enrichment.state.clone(),
			design_storm_depth_inches: self.enrichment.design_storm_depth_inches,
			ref_data_key: self.enrichment.ref_data_key.clone(),
		}
	}
}

/// Directed flow connection, addressed by node ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
	#[serde(deserialize_with = "de_id")]
	pub source: String,
	#[serde(deserialize_with = "de_id")]
	pub target: String,
}

impl Edge {
	pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
		Self {
			source: source.into(),
			target: target.into(),
		}
	}

	pub fn touches(&self, id: &str) -> bool {
		self.source == id || self.target == id
	}
}

/// Node as found in saved scenarios, uploads and session snapshots.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
	#[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub longlat: Option<LongLat>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub x: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub y: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub size: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub node_type: Option<NodeType>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub color: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub design_storm_depth_inches: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ref_data_key: Option<String>,
}

impl RawNode {
	pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
		Self {
			id: Some(id.into()),
			node_type: Some(node_type),
			..Self::default()
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
	#[serde(default)]
	pub nodes: Vec<RawNode>,
	#[serde(default)]
	pub edges: Vec<Edge>,
}

fn one_or_many(value: Value) -> Value {
	match value {
		Value::Array(_) => value,
		other => Value::Array(vec![other]),
	}
}

pub(crate) fn number_like(value: &Value) -> Option<f64> {
	match value {
		Value::Number(n) => n.as_f64(),
		Value::String(s) => s.trim().parse().ok(),
		_ => None,
	}
}

pub(crate) fn string_like(value: &Value) -> Option<String> {
	match value {
		Value::String(s) if !s.is_empty() => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		_ => None,
	}
}

/// Ids arrive as strings, numbers, or (in old autosaves) as whole node objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
	Str(String),
	Num(serde_json::Number),
	Obj { id: Box<IdRepr> },
}

impl IdRepr {
	fn into_string(self) -> String {
		match self {
			IdRepr::Str(s) => s,
			IdRepr::Num(n) => n.to_string(),
			IdRepr::Obj { id } => id.into_string(),
		}
	}
}

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
	IdRepr::deserialize(deserializer).map(IdRepr::into_string)
}

fn de_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
	Ok(Option::<IdRepr>::deserialize(deserializer)?.map(IdRepr::into_string))
}
