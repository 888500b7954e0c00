use std::cell::{Cell, RefCell};
use std::rc::Rc;

use leptos::prelude::*;
use log::{error, warn};
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, Event, HtmlCanvasElement, KeyboardEvent, MouseEvent, WheelEvent, Window};

use super::context::{EditorEvent, EventKind};
use super::graph::Graph;
use super::interaction::{InputEvent, Key, Modifiers};
use super::render;
use super::spatial::{DatasetKind, PolygonDataset};
use super::state::EditorState;
use super::types::{GraphData, Point};
use crate::config::EditorConfig;
use crate::session::{self, BrowserSession, SessionSnapshot};

type Shared<T> = Rc<RefCell<Option<T>>>;
type Listener = Shared<Closure<dyn FnMut(Event)>>;

/// Reference datasets keyed by the enrichment they feed.
pub type LoadedDatasets = Vec<(DatasetKind, PolygonDataset)>;

fn window_size(window: &Window) -> Option<(f64, f64)> {
	Some((
		window.inner_width().ok()?.as_f64()?,
		window.inner_height().ok()?.as_f64()?,
	))
}

fn pointer(canvas_ref: NodeRef<leptos::html::Canvas>, ev: &MouseEvent) -> Option<Point> {
	let canvas: HtmlCanvasElement = canvas_ref.get()?.into();
	let rect = canvas.get_bounding_client_rect();
	Some(Point::new(
		ev.client_x() as f64 - rect.left(),
		ev.client_y() as f64 - rect.top(),
	))
}

fn modifiers(ev: &MouseEvent) -> Modifiers {
	Modifiers {
		shift: ev.shift_key(),
		ctrl: ev.ctrl_key(),
	}
}

fn key_of(ev: &Event) -> Key {
	ev.dyn_ref::<KeyboardEvent>()
		.map(|k| Key::from_dom(&k.key()))
		.unwrap_or(Key::Other)
}

fn add_window_listener(window: &Window, event: &str, slot: &Listener, f: impl FnMut(Event) + 'static) {
	let closure = Closure::<dyn FnMut(Event)>::new(f);
	if window
		.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
		.is_err()
	{
		warn!("could not listen for window {}", event);
	}
	*slot.borrow_mut() = Some(closure);
}

#[component]
pub fn NetworkEditorCanvas(
	#[prop(into)] data: Signal<GraphData>,
	/// Data layered over the current graph whenever it becomes `Some`.
	#[prop(into, default = Signal::stored(None))]
	merge: Signal<Option<GraphData>>,
	#[prop(into, default = Signal::stored(true))] edit_mode: Signal<bool>,
	#[prop(into, default = Signal::stored(Vec::new()))] datasets: Signal<LoadedDatasets>,
	#[prop(default = EditorConfig::default())] config: EditorConfig,
	#[prop(optional)] on_event: Option<Callback<EditorEvent>>,
	/// Receives a copy of the graph after every edit, at most once per frame.
	#[prop(optional)]
	on_graph_change: Option<Callback<Graph>>,
	#[prop(default = false)] fullscreen: bool,
	#[prop(default = false)] autosave: bool,
	#[prop(default = None)] width: Option<f64>,
	#[prop(default = None)] height: Option<f64>,
) -> impl IntoView {
	let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
	let state: Shared<EditorState> = Rc::new(RefCell::new(None));
	let animate: Shared<Closure<dyn FnMut()>> = Rc::new(RefCell::new(None));
	let resize_cb: Listener = Rc::new(RefCell::new(None));
	let keydown_cb: Listener = Rc::new(RefCell::new(None));
	let keyup_cb: Listener = Rc::new(RefCell::new(None));
	let mouseup_cb: Listener = Rc::new(RefCell::new(None));
	let blur_cb: Listener = Rc::new(RefCell::new(None));
	let unload_cb: Listener = Rc::new(RefCell::new(None));

	let state_init = state.clone();
	Effect::new(move |_| {
		let Some(canvas) = canvas_ref.get() else {
			return;
		};
		let canvas: HtmlCanvasElement = canvas.into();
		let Some(window) = web_sys::window() else {
			return;
		};

		let (w, h) = if fullscreen {
			window_size(&window).unwrap_or((800.0, 600.0))
		} else {
			(
				width.unwrap_or_else(|| {
					canvas
						.parent_element()
						.map(|p| p.client_width() as f64)
						.unwrap_or(800.0)
				}),
				height.unwrap_or_else(|| {
					canvas
						.parent_element()
						.map(|p| p.client_height() as f64)
						.unwrap_or(600.0)
				}),
			)
		};
		canvas.set_width(w as u32);
		canvas.set_height(h as u32);

		let ctx: CanvasRenderingContext2d = match canvas.get_context("2d") {
			Ok(Some(ctx)) => match ctx.dyn_into() {
				Ok(ctx) => ctx,
				Err(_) => return,
			},
			_ => {
				error!("canvas has no 2d context");
				return;
			}
		};

		let mut editor = EditorState::new(config.clone(), w, h);
		if let Some(cb) = on_event {
			editor.subscribe_all(move |e| cb.run(e.clone()));
		}
		let graph_dirty = Rc::new(Cell::new(true));
		for kind in [EventKind::GraphChanged, EventKind::GraphReplaced] {
			let dirty = graph_dirty.clone();
			editor.subscribe(kind, move |_| dirty.set(true));
		}
		for (kind, dataset) in datasets.get_untracked() {
			editor.set_dataset(kind, Some(dataset));
		}
		editor.set_edit_mode(edit_mode.get_untracked());
		editor.replace_graph(data.get_untracked());
		*state_init.borrow_mut() = Some(editor);

		if fullscreen {
			let (state_resize, canvas_resize) = (state_init.clone(), canvas.clone());
			add_window_listener(&window, "resize", &resize_cb, move |_: Event| {
				let Some((nw, nh)) = web_sys::window().as_ref().and_then(window_size) else {
					return;
				};
				canvas_resize.set_width(nw as u32);
				canvas_resize.set_height(nh as u32);
				if let Some(ref mut s) = *state_resize.borrow_mut() {
					s.resize(nw, nh);
				}
			});
		}

		let state_kd = state_init.clone();
		add_window_listener(&window, "keydown", &keydown_cb, move |ev: Event| {
			if let Some(ref mut s) = *state_kd.borrow_mut() {
				s.handle(InputEvent::KeyDown(key_of(&ev)));
			}
		});
		let state_ku = state_init.clone();
		add_window_listener(&window, "keyup", &keyup_cb, move |ev: Event| {
			if let Some(ref mut s) = *state_ku.borrow_mut() {
				s.handle(InputEvent::KeyUp(key_of(&ev)));
			}
		});
		let state_wu = state_init.clone();
		add_window_listener(&window, "mouseup", &mouseup_cb, move |_: Event| {
			if let Some(ref mut s) = *state_wu.borrow_mut() {
				s.handle(InputEvent::WindowPointerUp);
			}
		});
		let state_bl = state_init.clone();
		add_window_listener(&window, "blur", &blur_cb, move |_: Event| {
			if let Some(ref mut s) = *state_bl.borrow_mut() {
				s.handle(InputEvent::WindowBlur);
			}
		});
		if autosave {
			let state_ul = state_init.clone();
			add_window_listener(&window, "beforeunload", &unload_cb, move |_: Event| {
				if let Some(ref s) = *state_ul.borrow() {
					if let Err(err) = session::save(&BrowserSession, &SessionSnapshot::capture(s)) {
						error!("autosave failed: {}", err);
					}
				}
			});
		}

		let (state_anim, animate_inner) = (state_init.clone(), animate.clone());
		let mut last_frame = js_sys::Date::now();
		*animate.borrow_mut() = Some(Closure::new(move || {
			let now = js_sys::Date::now();
			let dt = (now - last_frame).min(100.0);
			last_frame = now;
			if let Some(ref mut s) = *state_anim.borrow_mut() {
				s.tick(dt);
				render::render(s, &ctx);
				if graph_dirty.replace(false) {
					if let Some(cb) = on_graph_change {
						cb.run(s.graph().clone());
					}
				}
			}
			if let (Some(cb), Some(win)) = (&*animate_inner.borrow(), web_sys::window()) {
				let _ = win.request_animation_frame(cb.as_ref().unchecked_ref());
			}
		}));
		if let Some(ref cb) = *animate.borrow() {
			let _ = window.request_animation_frame(cb.as_ref().unchecked_ref());
		}
	});

	let state_data = state.clone();
	Effect::new(move |prev: Option<()>| {
		let graph = data.get();
		if prev.is_none() {
			return;
		}
		if let Some(ref mut s) = *state_data.borrow_mut() {
			s.replace_graph(graph);
		}
	});

	let state_merge = state.clone();
	Effect::new(move |_| {
		let Some(staged) = merge.get() else {
			return;
		};
		if let Some(ref mut s) = *state_merge.borrow_mut() {
			s.merge_graph(staged);
		}
	});

	let state_mode = state.clone();
	Effect::new(move |_| {
		let on = edit_mode.get();
		if let Some(ref mut s) = *state_mode.borrow_mut() {
			if s.edit_mode() != on {
				s.set_edit_mode(on);
			}
		}
	});

	let state_sets = state.clone();
	Effect::new(move |prev: Option<()>| {
		let sets = datasets.get();
		if prev.is_none() {
			return;
		}
		if let Some(ref mut s) = *state_sets.borrow_mut() {
			for kind in DatasetKind::ALL {
				let dataset = sets.iter().find(|(k, _)| *k == kind).map(|(_, d)| d.clone());
				if dataset.as_ref() != s.resolver().get(kind) {
					s.set_dataset(kind, dataset);
				}
			}
		}
	});

	let state_md = state.clone();
	let on_mousedown = move |ev: MouseEvent| {
		let Some(at) = pointer(canvas_ref, &ev) else {
			return;
		};
		if let Some(ref mut s) = *state_md.borrow_mut() {
			let target = s.hit_test(at);
			s.handle(InputEvent::PointerDown {
				at,
				target,
				modifiers: modifiers(&ev),
			});
		}
	};

	let state_mm = state.clone();
	let on_mousemove = move |ev: MouseEvent| {
		let Some(at) = pointer(canvas_ref, &ev) else {
			return;
		};
		if let Some(ref mut s) = *state_mm.borrow_mut() {
			s.hover_at(at);
			s.handle(InputEvent::PointerMove { at });
		}
	};

	let state_mu = state.clone();
	let on_mouseup = move |ev: MouseEvent| {
		let Some(at) = pointer(canvas_ref, &ev) else {
			return;
		};
		if let Some(ref mut s) = *state_mu.borrow_mut() {
			let target = s.hit_test(at);
			s.handle(InputEvent::PointerUp { at, target });
		}
	};

	let state_cl = state.clone();
	let on_click = move |ev: MouseEvent| {
		let Some(at) = pointer(canvas_ref, &ev) else {
			return;
		};
		if let Some(ref mut s) = *state_cl.borrow_mut() {
			let target = s.hit_test(at);
			s.handle(InputEvent::Click {
				at,
				target,
				modifiers: modifiers(&ev),
			});
		}
	};

	let state_me = state.clone();
	let on_mouseenter = move |_: MouseEvent| {
		if let Some(ref mut s) = *state_me.borrow_mut() {
			s.handle(InputEvent::PointerEnter);
		}
	};

	let state_ml = state.clone();
	let on_mouseleave = move |_: MouseEvent| {
		if let Some(ref mut s) = *state_ml.borrow_mut() {
			s.handle(InputEvent::PointerLeave);
		}
	};

	let state_wh = state.clone();
	let on_wheel = move |ev: WheelEvent| {
		ev.prevent_default();
		let Some(at) = pointer(canvas_ref, &ev) else {
			return;
		};
		if let Some(ref mut s) = *state_wh.borrow_mut() {
			s.handle(InputEvent::Wheel {
				at,
				delta_y: ev.delta_y(),
			});
		}
	};

	view! {
		<canvas
			node_ref=canvas_ref
			class="network-editor-canvas"
			on:mousedown=on_mousedown
			on:mousemove=on_mousemove
			on:mouseup=on_mouseup
			on:click=on_click
			on:mouseenter=on_mouseenter
			on:mouseleave=on_mouseleave
			on:wheel=on_wheel
			style="display: block; cursor: crosshair;"
		/>
	}
}
