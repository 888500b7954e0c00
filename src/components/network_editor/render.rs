use std::f64::consts::PI;

use wasm_bindgen::JsValue;
use web_sys::CanvasRenderingContext2d;

use super::reconcile::{ARROW_LENGTH, EdgeView, NodeView};
use super::spatial::DatasetKind;
use super::state::EditorState;
use super::types::{LongLat, Point, number_like};

const BACKGROUND: &str = "#f4f6f8";
const EDGE_COLOR: &str = "rgba(60, 60, 60, 0.8)";
const SELECTED_EDGE_COLOR: &str = "rgb(255, 99, 71)";

fn ease_out_cubic(t: f64) -> f64 {
	1.0 - (1.0 - t).powi(3)
}

pub fn render(state: &EditorState, ctx: &CanvasRenderingContext2d) {
	let view = state.view();
	ctx.set_fill_style_str(BACKGROUND);
	ctx.fill_rect(0.0, 0.0, view.width, view.height);
	draw_datasets(state, ctx);
	for edge in state.reconciler().edges() {
		draw_edge(edge, ctx);
	}
	draw_drag_line(state, ctx);
	for node in state.reconciler().nodes() {
		draw_node(node, ctx);
	}
}

fn draw_datasets(state: &EditorState, ctx: &CanvasRenderingContext2d) {
	let view = state.view();
	for (kind, stroke) in [
		(DatasetKind::Boundary, "rgba(80, 80, 80, 0.6)"),
		(DatasetKind::RainZone, "rgba(70, 130, 180, 0.35)"),
		(DatasetKind::DesignStorm, "rgba(50, 205, 50, 0.35)"),
	] {
		let Some(dataset) = state.resolver().get(kind) else {
			continue;
		};
		ctx.set_stroke_style_str(stroke);
		ctx.set_line_width(1.0);
		let domain = if kind == DatasetKind::DesignStorm { dataset.domain() } else { None };
		let field = dataset.field.as_deref().unwrap_or_default();
		for feature in &dataset.features {
			ctx.begin_path();
			for ring in feature.polygons.iter().flat_map(|p| &p.rings) {
				let mut points = ring.iter().map(|p| view.longlat_to_point(LongLat(p.x, p.y)));
				let Some(first) = points.next() else {
					continue;
				};
				ctx.move_to(first.x, first.y);
				for p in points {
					ctx.line_to(p.x, p.y);
				}
				ctx.close_path();
			}
			let depth = feature.properties.get(field).and_then(number_like);
			if let (Some(domain), Some(depth)) = (domain, depth) {
				ctx.set_fill_style_str(&storm_fill(domain, depth));
				ctx.fill();
			}
			ctx.stroke();
		}
	}
}

/// Translucent green, denser for deeper design storms.
fn storm_fill((lo, hi): (f64, f64), depth: f64) -> String {
	let t = if hi > lo { ((depth - lo) / (hi - lo)).clamp(0.0, 1.0) } else { 1.0 };
	format!("rgba(50, 205, 50, {:.2})", 0.05 + 0.25 * t)
}

fn draw_edge(edge: &EdgeView, ctx: &CanvasRenderingContext2d) {
	let (from, to) = (edge.from, edge.to);
	let dist = from.distance(to);
	if dist < 0.001 {
		return;
	}
	let color = if edge.selected { SELECTED_EDGE_COLOR } else { EDGE_COLOR };
	ctx.set_stroke_style_str(color);
	ctx.set_line_width(if edge.selected { 3.0 } else { 1.5 });
	ctx.begin_path();
	ctx.move_to(from.x, from.y);
	ctx.line_to(to.x, to.y);
	ctx.stroke();
	draw_arrow_head(ctx, from, to, color);
}

fn draw_arrow_head(ctx: &CanvasRenderingContext2d, from: Point, tip: Point, color: &str) {
	let dist = from.distance(tip);
	let (ux, uy) = ((tip.x - from.x) / dist, (tip.y - from.y) / dist);
	let size = ARROW_LENGTH * 2.0;
	let (back_x, back_y) = (tip.x - ux * size, tip.y - uy * size);
	let (px, py) = (-uy * size * 0.5, ux * size * 0.5);
	ctx.set_fill_style_str(color);
	ctx.begin_path();
	ctx.move_to(tip.x, tip.y);
	ctx.line_to(back_x + px, back_y + py);
	ctx.line_to(back_x - px, back_y - py);
	ctx.close_path();
	ctx.fill();
}

fn draw_drag_line(state: &EditorState, ctx: &CanvasRenderingContext2d) {
	let Some((source, pointer)) = state.interaction().drag_line() else {
		return;
	};
	let Some(view) = state.reconciler().node(source) else {
		return;
	};
	ctx.set_stroke_style_str(EDGE_COLOR);
	ctx.set_line_width(1.5);
	let _ = ctx.set_line_dash(&js_sys::Array::of2(
		&JsValue::from_f64(6.0),
		&JsValue::from_f64(4.0),
	));
	ctx.begin_path();
	ctx.move_to(view.center.x, view.center.y);
	ctx.line_to(pointer.x, pointer.y);
	ctx.stroke();
	let _ = ctx.set_line_dash(&js_sys::Array::new());
}

fn draw_node(node: &NodeView, ctx: &CanvasRenderingContext2d) {
	let Point { x, y } = node.center;
	let t = ease_out_cubic(node.emphasis_t);

	if t > 0.01 {
		let glow = node.radius * (1.2 + 0.5 * t);
		if let Ok(gradient) = ctx.create_radial_gradient(x, y, node.radius * 0.8, x, y, glow) {
			let _ = gradient.add_color_stop(0.0, &format!("rgba(255, 255, 255, {})", 0.6 * t));
			let _ = gradient.add_color_stop(1.0, "rgba(255, 255, 255, 0)");
			ctx.begin_path();
			let _ = ctx.arc(x, y, glow, 0.0, 2.0 * PI);
			#[allow(deprecated)]
			ctx.set_fill_style(&gradient);
			ctx.fill();
		}
	}

	ctx.begin_path();
	let _ = ctx.arc(x, y, node.radius, 0.0, 2.0 * PI);
	ctx.set_fill_style_str(&node.fill.to_css());
	ctx.fill();
	ctx.set_stroke_style_str(&node.stroke.to_css());
	ctx.set_line_width(1.5);
	ctx.stroke();

	ctx.set_fill_style_str("rgb(30, 30, 30)");
	ctx.set_font("11px sans-serif");
	let _ = ctx.fill_text(&node.key, x + node.radius + 3.0, y + 4.0);
}
