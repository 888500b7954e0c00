//! Point-in-polygon enrichment against reference zone datasets.
//!
//! Datasets arrive either as GeoJSON feature collections or as TopoJSON
//! topologies that have to be expanded into features first.

use std::collections::HashMap;

use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::transform::Extent;
use super::types::{LongLat, Node, Point, number_like, string_like};
use crate::config::DatasetDescriptor;
use crate::error::DatasetError;

type Position = Vec<f64>;

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
	Polygon { coordinates: Vec<Vec<Position>> },
	MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
	#[serde(other)]
	Other,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Feature {
	#[serde(default)]
	pub properties: Option<Map<String, Value>>,
	#[serde(default)]
	pub geometry: Option<Geometry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FeatureCollection {
	pub features: Vec<Feature>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TopoTransform {
	pub scale: [f64; 2],
	pub translate: [f64; 2],
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum TopoGeometry {
	GeometryCollection {
		geometries: Vec<TopoGeometry>,
	},
	Polygon {
		arcs: Vec<Vec<i64>>,
		#[serde(default)]
		properties: Option<Map<String, Value>>,
	},
	MultiPolygon {
		arcs: Vec<Vec<Vec<i64>>>,
		#[serde(default)]
		properties: Option<Map<String, Value>>,
	},
	#[serde(other)]
	Other,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Topology {
	#[serde(default)]
	pub transform: Option<TopoTransform>,
	pub arcs: Vec<Vec<Position>>,
	pub objects: HashMap<String, TopoGeometry>,
}

/// Body of a reference-data response.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ReferenceData {
	Topology(Topology),
	FeatureCollection(FeatureCollection),
}

impl ReferenceData {
	pub fn from_json(text: &str) -> Result<Self, DatasetError> {
		Ok(serde_json::from_str(text)?)
	}
}

/// Rings in `[lon, lat]`; the first ring is the exterior.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
	pub rings: Vec<Vec<Point>>,
}

impl Polygon {
	fn from_positions(rings: &[Vec<Position>]) -> Self {
		Self {
			rings: rings
				.iter()
				.map(|ring| {
					ring.iter()
						.filter(|p| p.len() >= 2)
						.map(|p| Point::new(p[0], p[1]))
						.collect()
				})
				.collect(),
		}
	}

	/// Even-odd rule over every ring, so holes fall out naturally.
	pub fn contains(&self, p: Point) -> bool {
		let mut inside = false;
		for ring in &self.rings {
			let n = ring.len();
			if n < 3 {
				continue;
			}
			let mut j = n - 1;
			for i in 0..n {
				let (a, b) = (ring[i], ring[j]);
				if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
					inside = !inside;
				}
				j = i;
			}
		}
		inside
	}

	/// Exterior clockwise, holes counter-clockwise.
	pub fn normalize_winding(&mut self) {
		for (i, ring) in self.rings.iter_mut().enumerate() {
			let clockwise = signed_area(ring) < 0.0;
			if (i == 0) != clockwise {
				ring.reverse();
			}
		}
	}
}

/// Shoelace area with y pointing north; positive means counter-clockwise.
pub fn signed_area(ring: &[Point]) -> f64 {
	if ring.len() < 3 {
		return 0.0;
	}
	let mut sum = 0.0;
	for (i, a) in ring.iter().enumerate() {
		let b = ring[(i + 1) % ring.len()];
		sum += a.x * b.y - b.x * a.y;
	}
	sum / 2.0
}

#[derive(Clone, Debug, PartialEq)]
pub struct ZoneFeature {
	pub polygons: Vec<Polygon>,
	pub properties: Map<String, Value>,
	pub bounds: Option<Extent>,
}

impl ZoneFeature {
	pub fn new(polygons: Vec<Polygon>, properties: Map<String, Value>) -> Self {
		let bounds = Extent::of_points(
			polygons
				.iter()
				.filter_map(|p| p.rings.first())
				.flatten()
				.copied(),
		);
		Self {
			polygons,
			properties,
			bounds,
		}
	}

	pub fn contains(&self, ll: LongLat) -> bool {
		let p = Point::new(ll.lon(), ll.lat());
		self.bounds.is_some_and(|b| b.contains(p)) && self.polygons.iter().any(|poly| poly.contains(p))
	}
}

/// A loaded zone dataset and the property it answers lookups with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolygonDataset {
	pub field: Option<String>,
	pub features: Vec<ZoneFeature>,
}

impl PolygonDataset {
	pub fn new(field: Option<String>, mut features: Vec<ZoneFeature>) -> Self {
		for feature in &mut features {
			feature.polygons.iter_mut().for_each(Polygon::normalize_winding);
		}
		Self { field, features }
	}

	pub fn from_reference(data: ReferenceData, descriptor: &DatasetDescriptor) -> Result<Self, DatasetError> {
		let features = match data {
			ReferenceData::FeatureCollection(fc) => features_from_collection(fc),
			ReferenceData::Topology(topology) => {
				let name = match (&descriptor.name, topology.objects.len()) {
					(Some(name), _) => name.clone(),
					(None, 1) => topology.objects.keys().next().cloned().unwrap_or_default(),
					(None, _) => return Err(DatasetError::UnnamedObject),
				};
				topology.features(&name)?
			}
		};
		debug!("loaded zone dataset with {} features", features.len());
		Ok(Self::new(descriptor.field.clone(), features))
	}

	pub fn feature_at(&self, ll: LongLat) -> Option<&ZoneFeature> {
		self.features.iter().find(|f| f.contains(ll))
	}

	pub fn property_at(&self, ll: LongLat, key: &str) -> Option<&Value> {
		self.feature_at(ll).and_then(|f| f.properties.get(key))
	}

	pub fn value_at(&self, ll: LongLat) -> Option<&Value> {
		let field = self.field.as_deref()?;
		self.property_at(ll, field)
	}

	/// Numeric range of the configured field, for colour scales.
	pub fn domain(&self) -> Option<(f64, f64)> {
		let field = self.field.as_deref()?;
		self.features
			.iter()
			.filter_map(|f| f.properties.get(field).and_then(number_like))
			.fold(None, |acc, v| match acc {
				None => Some((v, v)),
				Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
			})
	}
}

fn features_from_collection(fc: FeatureCollection) -> Vec<ZoneFeature> {
	fc.features
		.into_iter()
		.filter_map(|f| {
			let polygons = match f.geometry? {
				Geometry::Polygon { coordinates } => vec![Polygon::from_positions(&coordinates)],
				Geometry::MultiPolygon { coordinates } => {
					coordinates.iter().map(|p| Polygon::from_positions(p)).collect()
				}
				Geometry::Other => return None,
			};
			Some(ZoneFeature::new(polygons, f.properties.unwrap_or_default()))
		})
		.collect()
}

impl Topology {
	fn decode_arcs(&self) -> Vec<Vec<Point>> {
		self.arcs
			.iter()
			.map(|arc| match &self.transform {
				Some(t) => {
					let (mut x, mut y) = (0.0, 0.0);
					arc.iter()
						.filter(|p| p.len() >= 2)
						.map(|p| {
							x += p[0];
							y += p[1];
							Point::new(x * t.scale[0] + t.translate[0], y * t.scale[1] + t.translate[1])
						})
						.collect()
				}
				None => arc
					.iter()
					.filter(|p| p.len() >= 2)
					.map(|p| Point::new(p[0], p[1]))
					.collect(),
			})
			.collect()
	}

	/// Expands the named object into polygon features.
	pub fn features(&self, name: &str) -> Result<Vec<ZoneFeature>, DatasetError> {
		let object = self
			.objects
			.get(name)
			.ok_or_else(|| DatasetError::MissingObject(name.to_string()))?;
		let arcs = self.decode_arcs();
		let mut out = Vec::new();
		collect_features(object, &arcs, &mut out)?;
		Ok(out)
	}
}

fn collect_features(geometry: &TopoGeometry, arcs: &[Vec<Point>], out: &mut Vec<ZoneFeature>) -> Result<(), DatasetError> {
	match geometry {
		TopoGeometry::GeometryCollection { geometries } => {
			for g in geometries {
				collect_features(g, arcs, out)?;
			}
		}
		TopoGeometry::Polygon { arcs: rings, properties } => {
			let polygon = stitch_polygon(rings, arcs)?;
			out.push(ZoneFeature::new(vec![polygon], properties.clone().unwrap_or_default()));
		}
		TopoGeometry::MultiPolygon { arcs: polys, properties } => {
			let polygons = polys
				.iter()
				.map(|rings| stitch_polygon(rings, arcs))
				.collect::<Result<Vec<_>, _>>()?;
			out.push(ZoneFeature::new(polygons, properties.clone().unwrap_or_default()));
		}
		TopoGeometry::Other => {}
	}
	Ok(())
}

fn stitch_polygon(rings: &[Vec<i64>], arcs: &[Vec<Point>]) -> Result<Polygon, DatasetError> {
	let rings = rings
		.iter()
		.map(|indices| stitch_ring(indices, arcs))
		.collect::<Result<Vec<_>, _>>()?;
	Ok(Polygon { rings })
}

/// Concatenates arcs, sharing the joint point; a negative index `~i` walks
/// arc `i` backwards.
fn stitch_ring(indices: &[i64], arcs: &[Vec<Point>]) -> Result<Vec<Point>, DatasetError> {
	let mut points: Vec<Point> = Vec::new();
	for &i in indices {
		let idx = if i < 0 { !i } else { i };
		let arc = usize::try_from(idx)
			.ok()
			.and_then(|idx| arcs.get(idx))
			.ok_or(DatasetError::ArcOutOfBounds(i))?;
		points.pop();
		let start = points.len();
		points.extend_from_slice(arc);
		if i < 0 {
			points[start..].reverse();
		}
	}
	if points.len() < 4 {
		if let Some(&first) = points.first() {
			points.push(first);
		}
	}
	Ok(points)
}

/// Which enrichment a dataset feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DatasetKind {
	Boundary,
	DesignStorm,
	RainZone,
}

impl DatasetKind {
	pub const ALL: [DatasetKind; 3] = [DatasetKind::Boundary, DatasetKind::DesignStorm, DatasetKind::RainZone];
}

/// Looks up enrichment attributes for node positions. Any dataset may be
/// missing; lookups against a missing dataset simply find nothing.
#[derive(Clone, Debug, Default)]
pub struct SpatialResolver {
	boundary: Option<PolygonDataset>,
	design_storm: Option<PolygonDataset>,
	rain_zone: Option<PolygonDataset>,
}

impl SpatialResolver {
	pub fn set(&mut self, kind: DatasetKind, dataset: Option<PolygonDataset>) {
		*self.slot(kind) = dataset;
	}

	pub fn get(&self, kind: DatasetKind) -> Option<&PolygonDataset> {
		match kind {
			DatasetKind::Boundary => self.boundary.as_ref(),
			DatasetKind::DesignStorm => self.design_storm.as_ref(),
			DatasetKind::RainZone => self.rain_zone.as_ref(),
		}
	}

	fn slot(&mut self, kind: DatasetKind) -> &mut Option<PolygonDataset> {
		match kind {
			DatasetKind::Boundary => &mut self.boundary,
			DatasetKind::DesignStorm => &mut self.design_storm,
			DatasetKind::RainZone => &mut self.rain_zone,
		}
	}

	pub fn state_at(&self, ll: LongLat) -> Option<String> {
		let ds = self.boundary.as_ref()?;
		let field = ds.field.as_deref().unwrap_or("name");
		ds.property_at(ll, field).and_then(string_like)
	}

	/// Depth rounded to hundredths of an inch.
	pub fn design_storm_depth_at(&self, ll: LongLat) -> Option<f64> {
		let depth = self.design_storm.as_ref()?.value_at(ll).and_then(number_like)?;
		Some((depth * 100.0).round() / 100.0)
	}

	pub fn ref_data_key_at(&self, ll: LongLat) -> Option<String> {
		self.rain_zone.as_ref()?.value_at(ll).and_then(string_like)
	}

	/// Refresh a node's derived attributes from its `longlat`. Land-surface
	/// nodes only receive the boundary lookup; zone values that are not found
	/// leave the previous value in place. Until a boundary dataset is loaded
	/// the stored state is kept.
	pub fn enrich(&self, node: &mut Node) {
		if self.boundary.is_some() {
			node.enrichment.state = self.state_at(node.longlat);
		}
		if !node.node_type.receives_zone_enrichment() {
			return;
		}
		if let Some(depth) = self.design_storm_depth_at(node.longlat) {
			node.enrichment.design_storm_depth_inches = Some(depth);
		}
		if let Some(key) = self.ref_data_key_at(node.longlat) {
			node.enrichment.ref_data_key = Some(key);
		}
	}
}
