//! Geographic ↔ map-plane ↔ screen conversions.
//!
//! The map plane is a spherical Mercator projection. The screen is the map
//! plane under a [`ZoomTransform`] that pan and zoom gestures update. Node
//! positions are always re-derived through [`ViewPipeline::longlat_to_point`],
//! never nudged incrementally.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

use super::types::{LongLat, Point};

const MERCATOR_MAX_LAT_DEG: f64 = 85.051_128_78;

/// Spherical Mercator with a planar scale and translate, y pointing down.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
	pub scale: f64,
	pub translate: Point,
}

impl Default for Projection {
	/// The conventional 960×500 world map framing.
	fn default() -> Self {
		Self {
			scale: 961.0 / TAU,
			translate: Point::new(480.0, 250.0),
		}
	}
}

impl Projection {
	/// Unit world: the whole globe spans one map-plane unit around the origin,
	/// so zoom scale `k` equals the world width in pixels.
	pub fn web_map() -> Self {
		Self {
			scale: 1.0 / TAU,
			translate: Point::new(0.0, 0.0),
		}
	}

	pub fn project(&self, ll: LongLat) -> Point {
		let lambda = wrap_radians(ll.lon().to_radians());
		let phi = ll
			.lat()
			.clamp(-MERCATOR_MAX_LAT_DEG, MERCATOR_MAX_LAT_DEG)
			.to_radians();
		let y = (FRAC_PI_4 + phi / 2.0).tan().ln();
		Point::new(
			lambda * self.scale + self.translate.x,
			self.translate.y - y * self.scale,
		)
	}

	pub fn invert(&self, p: Point) -> LongLat {
		let lambda = wrap_radians((p.x - self.translate.x) / self.scale);
		let y = (self.translate.y - p.y) / self.scale;
		let phi = 2.0 * y.exp().atan() - FRAC_PI_2;
		LongLat(lambda.to_degrees(), phi.to_degrees())
	}
}

fn wrap_radians(lambda: f64) -> f64 {
	if lambda.abs() > PI {
		lambda - (lambda / TAU).round() * TAU
	} else {
		lambda
	}
}

/// Affine scale + translate from the map plane to the screen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomTransform {
	pub x: f64,
	pub y: f64,
	pub k: f64,
}

impl Default for ZoomTransform {
	fn default() -> Self {
		Self::IDENTITY
	}
}

impl ZoomTransform {
	pub const IDENTITY: ZoomTransform = ZoomTransform {
		x: 0.0,
		y: 0.0,
		k: 1.0,
	};

	pub fn apply(&self, p: Point) -> Point {
		Point::new(p.x * self.k + self.x, p.y * self.k + self.y)
	}

	pub fn invert(&self, p: Point) -> Point {
		Point::new((p.x - self.x) / self.k, (p.y - self.y) / self.k)
	}

	pub fn translate(&self, dx: f64, dy: f64) -> Self {
		Self {
			x: self.x + self.k * dx,
			y: self.y + self.k * dy,
			k: self.k,
		}
	}

	pub fn scale(&self, s: f64) -> Self {
		Self {
			k: self.k * s,
			..*self
		}
	}

	/// Transform at scale `k` that puts `map_point` in the middle of a
	/// `width`×`height` viewport.
	pub fn centered_on(map_point: Point, k: f64, width: f64, height: f64) -> Self {
		Self {
			x: width / 2.0 - k * map_point.x,
			y: height / 2.0 - k * map_point.y,
			k,
		}
	}

	pub fn panned(&self, dx: f64, dy: f64) -> Self {
		Self {
			x: self.x + dx,
			y: self.y + dy,
			k: self.k,
		}
	}

	/// Zoom by `factor` keeping the screen point `anchor` fixed.
	pub fn zoom_about(&self, anchor: Point, factor: f64, min_k: f64, max_k: f64) -> Self {
		let new_k = (self.k * factor).clamp(min_k, max_k);
		let ratio = new_k / self.k;
		Self {
			x: anchor.x - (anchor.x - self.x) * ratio,
			y: anchor.y - (anchor.y - self.y) * ratio,
			k: new_k,
		}
	}
}

/// Projection, live zoom transform and viewport size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewPipeline {
	pub projection: Projection,
	pub transform: ZoomTransform,
	pub width: f64,
	pub height: f64,
}

impl ViewPipeline {
	pub fn new(projection: Projection, transform: ZoomTransform, width: f64, height: f64) -> Self {
		Self {
			projection,
			transform,
			width,
			height,
		}
	}

	/// Map view centred on `center` at zoom scale `k`.
	pub fn centered(center: LongLat, k: f64, width: f64, height: f64) -> Self {
		let projection = Projection::web_map();
		let transform = ZoomTransform::centered_on(projection.project(center), k, width, height);
		Self::new(projection, transform, width, height)
	}

	pub fn point_to_longlat(&self, p: Point) -> LongLat {
		self.projection.invert(self.transform.invert(p))
	}

	pub fn longlat_to_point(&self, ll: LongLat) -> Point {
		self.transform.apply(self.projection.project(ll))
	}

	pub fn center(&self) -> Point {
		Point::new(self.width / 2.0, self.height / 2.0)
	}
}

/// Tuning for [`zoom_to_extent`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitOptions {
	/// Fraction of the viewport the extent may fill.
	pub margin: f64,
	pub iterations: u32,
	pub min_scale: f64,
	pub max_scale: f64,
}

impl Default for FitOptions {
	fn default() -> Self {
		Self {
			margin: 0.9,
			iterations: 1,
			min_scale: (1u64 << 6) as f64,
			max_scale: (1u64 << 28) as f64,
		}
	}
}

/// Screen-space axis aligned box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extent {
	pub min: Point,
	pub max: Point,
}

impl Extent {
	/// Bounding box of circles given as `(centre, radius)`.
	pub fn of_circles(circles: impl IntoIterator<Item = (Point, f64)>) -> Option<Self> {
		circles.into_iter().fold(None, |acc, (p, r)| {
			let (lo, hi) = (Point::new(p.x - r, p.y - r), Point::new(p.x + r, p.y + r));
			Some(match acc {
				None => Extent { min: lo, max: hi },
				Some(e) => Extent {
					min: Point::new(e.min.x.min(lo.x), e.min.y.min(lo.y)),
					max: Point::new(e.max.x.max(hi.x), e.max.y.max(hi.y)),
				},
			})
		})
	}

	pub fn of_points(points: impl IntoIterator<Item = Point>) -> Option<Self> {
		Self::of_circles(points.into_iter().map(|p| (p, 0.0)))
	}

	pub fn contains(&self, p: Point) -> bool {
		p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
	}

	pub fn width(&self) -> f64 {
		self.max.x - self.min.x
	}

	pub fn height(&self) -> f64 {
		self.max.y - self.min.y
	}

	pub fn center(&self) -> Point {
		Point::new(
			(self.min.x + self.max.x) / 2.0,
			(self.min.y + self.max.y) / 2.0,
		)
	}
}

/// Transform that frames `extent` (in current screen coordinates) in the
/// viewport. Returns `None` for an empty viewport.
pub fn zoom_to_extent(view: &ViewPipeline, extent: Extent, opts: FitOptions) -> Option<ZoomTransform> {
	if view.width <= 0.0 || view.height <= 0.0 {
		return None;
	}
	let fill = (extent.width() / view.width).max(extent.height() / view.height);
	let mut k = view.transform.k;
	for _ in 0..opts.iterations {
		k = (k * (opts.margin / fill)).min(opts.max_scale);
	}
	// Same floor as wheel zoom, so a fitted view can always be zoomed back.
	let k = k.clamp(opts.min_scale, opts.max_scale);
	let center = view.transform.invert(extent.center());
	Some(ZoomTransform::centered_on(center, k, view.width, view.height))
}

fn ease_in_out_cubic(t: f64) -> f64 {
	let t = t * 2.0;
	if t <= 1.0 {
		t * t * t / 2.0
	} else {
		let t = t - 2.0;
		(t * t * t + 2.0) / 2.0
	}
}

/// Animated change of zoom transform.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformTransition {
	from: ZoomTransform,
	to: ZoomTransform,
	width: f64,
	height: f64,
	elapsed_ms: f64,
	duration_ms: f64,
}

impl TransformTransition {
	pub fn new(view: &ViewPipeline, to: ZoomTransform, duration_ms: f64) -> Self {
		Self {
			from: view.transform,
			to,
			width: view.width,
			height: view.height,
			elapsed_ms: 0.0,
			duration_ms,
		}
	}

	pub fn target(&self) -> ZoomTransform {
		self.to
	}

	pub fn is_finished(&self) -> bool {
		self.elapsed_ms >= self.duration_ms
	}

	/// Advance by `dt_ms` and return the transform to show.
	pub fn tick(&mut self, dt_ms: f64) -> ZoomTransform {
		self.elapsed_ms = (self.elapsed_ms + dt_ms).min(self.duration_ms.max(0.0));
		if self.is_finished() {
			return self.to;
		}
		let e = ease_in_out_cubic(self.elapsed_ms / self.duration_ms);
		// interpolate the map point under the viewport centre, and the scale geometrically
		let mid = Point::new(self.width / 2.0, self.height / 2.0);
		let (c0, c1) = (self.from.invert(mid), self.to.invert(mid));
		let center = Point::new(c0.x + (c1.x - c0.x) * e, c0.y + (c1.y - c0.y) * e);
		let k = self.from.k * (self.to.k / self.from.k).powf(e);
		ZoomTransform::centered_on(center, k, self.width, self.height)
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	fn close(a: f64, b: f64, tol: f64) -> bool {
		(a - b).abs() <= tol
	}

	#[test]
	fn identity_transform_round_trips_screen_points() {
		let view = ViewPipeline::new(Projection::default(), ZoomTransform::IDENTITY, 800.0, 600.0);
		let ll = view.point_to_longlat(Point::new(100.0, 100.0));
		let back = view.longlat_to_point(ll);
		assert!(close(back.x, 100.0, 1e-9) && close(back.y, 100.0, 1e-9), "{back:?}");
	}

	#[test]
	fn centered_view_puts_center_in_middle() {
		let center = LongLat(-116.9337, 32.74337);
		let view = ViewPipeline::centered(center, (1u64 << 20) as f64, 1000.0, 800.0);
		let p = view.longlat_to_point(center);
		assert!(close(p.x, 500.0, 1e-6) && close(p.y, 400.0, 1e-6), "{p:?}");
	}

	#[test]
	fn web_map_spans_unit_world() {
		let proj = Projection::web_map();
		assert!(close(proj.project(LongLat(180.0, 0.0)).x, 0.5, 1e-12));
		assert!(close(proj.project(LongLat(0.0, 0.0)).y, 0.0, 1e-12));
		// north is up
		assert!(proj.project(LongLat(0.0, 45.0)).y < 0.0);
	}

	#[test]
	fn transform_composition_matches_centering() {
		let (w, h, k) = (640.0, 480.0, 1024.0);
		let p = Point::new(0.1, -0.2);
		let composed = ZoomTransform::IDENTITY
			.translate(w / 2.0, h / 2.0)
			.scale(-k)
			.translate(p.x, p.y)
			.scale(-1.0);
		assert_eq!(composed, ZoomTransform::centered_on(p, k, w, h));
	}

	#[test]
	fn zoom_about_keeps_anchor_fixed() {
		let t = ZoomTransform { x: 30.0, y: -20.0, k: 2.0 };
		let anchor = Point::new(200.0, 150.0);
		let before = t.invert(anchor);
		let zoomed = t.zoom_about(anchor, 1.1, 0.1, 10.0);
		let after = zoomed.invert(anchor);
		assert!(close(before.x, after.x, 1e-9) && close(before.y, after.y, 1e-9));
		assert_eq!(t.zoom_about(anchor, 100.0, 0.1, 10.0).k, 10.0);
	}

	#[test]
	fn fit_centres_and_scales_extent() {
		let view = ViewPipeline::new(Projection::web_map(), ZoomTransform { x: 0.0, y: 0.0, k: 1000.0 }, 800.0, 600.0);
		let extent = Extent {
			min: Point::new(100.0, 100.0),
			max: Point::new(300.0, 200.0),
		};
		let fitted = zoom_to_extent(&view, extent, FitOptions::default()).unwrap();
		// 200/800 vs 100/600 → width bound, 0.9 / 0.25 = 3.6
		assert!(close(fitted.k, 3600.0, 1e-9));
		let centre = fitted.apply(view.transform.invert(extent.center()));
		assert!(close(centre.x, 400.0, 1e-9) && close(centre.y, 300.0, 1e-9));
	}

	#[test]
	fn fit_respects_scale_ceiling() {
		let view = ViewPipeline::new(Projection::web_map(), ZoomTransform { x: 0.0, y: 0.0, k: 1000.0 }, 800.0, 600.0);
		let extent = Extent {
			min: Point::new(10.0, 10.0),
			max: Point::new(10.0, 10.0),
		};
		let fitted = zoom_to_extent(&view, extent, FitOptions::default()).unwrap();
		assert_eq!(fitted.k, FitOptions::default().max_scale);
	}

	#[test]
	fn fit_stops_at_scale_floor() {
		let view = ViewPipeline::new(Projection::web_map(), ZoomTransform { x: 0.0, y: 0.0, k: 1000.0 }, 800.0, 600.0);
		let extent = Extent {
			min: Point::new(0.0, 0.0),
			max: Point::new(80_000.0, 100.0),
		};
		let fitted = zoom_to_extent(&view, extent, FitOptions::default()).unwrap();
		assert_eq!(fitted.k, FitOptions::default().min_scale);
		let unclamped = FitOptions {
			min_scale: 1.0,
			..FitOptions::default()
		};
		assert!(close(zoom_to_extent(&view, extent, unclamped).unwrap().k, 9.0, 1e-9));
	}

	#[test]
	fn transition_ends_on_target() {
		let view = ViewPipeline::new(Projection::web_map(), ZoomTransform { x: 0.0, y: 0.0, k: 100.0 }, 800.0, 600.0);
		let to = ZoomTransform { x: 50.0, y: 20.0, k: 400.0 };
		let mut transition = TransformTransition::new(&view, to, 800.0);
		let halfway = transition.tick(400.0);
		assert!(halfway.k > 100.0 && halfway.k < 400.0);
		assert!(!transition.is_finished());
		assert_eq!(transition.tick(500.0), to);
		assert!(transition.is_finished());
	}

	proptest! {
		#[test]
		fn longlat_round_trips_through_screen(
			lon in -179.999f64..179.999,
			lat in -80.0f64..80.0,
			k in 64.0f64..1.0e9,
			tx in -1.0e6f64..1.0e6,
			ty in -1.0e6f64..1.0e6,
		) {
			let view = ViewPipeline::new(Projection::web_map(), ZoomTransform { x: tx, y: ty, k }, 800.0, 600.0);
			let back = view.point_to_longlat(view.longlat_to_point(LongLat(lon, lat)));
			prop_assert!(close(back.lon(), lon, 1e-6), "lon {} -> {}", lon, back.lon());
			prop_assert!(close(back.lat(), lat, 1e-6), "lat {} -> {}", lat, back.lat());
		}
	}
}
