//! Client for the analysis backend.
//!
//! Requests go through a [`Transport`]; the browser implementation uses
//! `fetch`. Every call site that may race holds a [`RequestGeneration`] and
//! only applies the result of its newest ticket.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, error, warn};
use serde::Serialize;
use serde_json::Value;

use crate::components::network_editor::graph::Graph;
use crate::components::network_editor::spatial::{PolygonDataset, ReferenceData};
use crate::config::{DatasetDescriptor, ProjectConfig};
use crate::error::{ApiError, EditorError};
use crate::export;

/// Raw HTTP access returning response bodies.
#[allow(async_fn_in_trait)]
pub trait Transport {
	async fn get(&self, url: &str) -> Result<String, ApiError>;
	async fn post(&self, url: &str, body: String) -> Result<String, ApiError>;
}

/// `window.fetch` transport. 422 responses carry a JSON body and are passed
/// through like successes.
#[derive(Clone, Copy, Debug, Default)]
pub struct FetchTransport;

impl FetchTransport {
	async fn send(&self, url: &str, method: &str, body: Option<String>) -> Result<String, ApiError> {
		use wasm_bindgen::JsCast;
		use wasm_bindgen_futures::JsFuture;
		use web_sys::{Headers, Request, RequestInit, RequestMode, Response};

		let js_err = |e: wasm_bindgen::JsValue| ApiError::Network(format!("{:?}", e));

		let opts = RequestInit::new();
		opts.set_method(method);
		opts.set_mode(RequestMode::Cors);
		if let Some(body) = body {
			let headers = Headers::new().map_err(js_err)?;
			headers.set("Content-Type", "application/json").map_err(js_err)?;
			opts.set_headers(&headers);
			opts.set_body(&wasm_bindgen::JsValue::from_str(&body));
		}
		let request = Request::new_with_str_and_init(url, &opts).map_err(js_err)?;

		let window = web_sys::window().ok_or_else(|| ApiError::Network("no window".into()))?;
		let resp: Response = JsFuture::from(window.fetch_with_request(&request))
			.await
			.map_err(js_err)?
			.dyn_into()
			.map_err(|_| ApiError::Network("response is not a Response".into()))?;

		if !resp.ok() && resp.status() != 422 {
			return Err(ApiError::Status(resp.status()));
		}
		let text = JsFuture::from(resp.text().map_err(js_err)?)
			.await
			.map_err(js_err)?;
		text.as_string()
			.ok_or_else(|| ApiError::Decode("body is not text".into()))
	}
}

impl Transport for FetchTransport {
	async fn get(&self, url: &str) -> Result<String, ApiError> {
		debug!("GET {}", url);
		self.send(url, "GET", None).await
	}

	async fn post(&self, url: &str, body: String) -> Result<String, ApiError> {
		debug!("POST {}", url);
		self.send(url, "POST", Some(body)).await
	}
}

/// Resolves after `ms` milliseconds using `setTimeout`.
pub async fn browser_sleep(ms: u32) {
	use wasm_bindgen_futures::JsFuture;

	let promise = js_sys::Promise::new(&mut |resolve, _reject| {
		if let Some(window) = web_sys::window() {
			let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms as i32);
		}
	});
	let _ = JsFuture::from(promise).await;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
	pub interval_ms: u32,
	/// Zero means no limit.
	pub max_attempts: u32,
}

impl Default for PollPolicy {
	fn default() -> Self {
		Self {
			interval_ms: 1000,
			max_attempts: 60,
		}
	}
}

/// Calls `fetch` until `done` accepts its result, sleeping between attempts.
/// Fails with [`ApiError::ExceededMaxAttempts`] once the attempt cap is hit.
pub async fn poll<T, F, Fut, S, SFut>(
	mut fetch: F,
	done: impl Fn(&T) -> bool,
	policy: PollPolicy,
	mut sleep: S,
) -> Result<T, ApiError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, ApiError>>,
	S: FnMut(u32) -> SFut,
	SFut: Future<Output = ()>,
{
	let mut attempts = 0;
	loop {
		let result = fetch().await?;
		attempts += 1;
		if done(&result) {
			return Ok(result);
		}
		if policy.max_attempts > 0 && attempts >= policy.max_attempts {
			return Err(ApiError::ExceededMaxAttempts(attempts));
		}
		debug!("poll attempt {} not finished, retrying", attempts);
		sleep(policy.interval_ms).await;
	}
}

/// Generation counter for one async call site.
#[derive(Clone, Debug, Default)]
pub struct RequestGeneration(Arc<AtomicU64>);

impl RequestGeneration {
	/// Starts a new request, superseding every earlier ticket.
	pub fn next(&self) -> Ticket {
		let generation = self.0.fetch_add(1, Ordering::SeqCst) + 1;
		Ticket {
			generation,
			latest: self.0.clone(),
		}
	}
}

#[derive(Clone, Debug)]
pub struct Ticket {
	generation: u64,
	latest: Arc<AtomicU64>,
}

impl Ticket {
	pub fn is_current(&self) -> bool {
		self.latest.load(Ordering::SeqCst) == self.generation
	}

	/// Passes `value` through only if no newer request has started.
	pub fn accept<T>(&self, value: T) -> Result<T, ApiError> {
		if self.is_current() {
			Ok(value)
		} else {
			debug!("dropping result of superseded request {}", self.generation);
			Err(ApiError::Superseded)
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
	Success,
	Error,
}

/// User-facing outcome of a backend action.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notice {
	pub title: String,
	pub message: String,
	pub kind: NoticeKind,
}

impl Notice {
	pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			title: title.into(),
			message: message.into(),
			kind: NoticeKind::Success,
		}
	}

	pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			title: title.into(),
			message: message.into(),
			kind: NoticeKind::Error,
		}
	}

	pub fn is_error(&self) -> bool {
		self.kind == NoticeKind::Error
	}

	/// Collapses several notices: the first error wins, carrying every error
	/// message, otherwise a single success.
	pub fn combine(notices: &[Notice]) -> Notice {
		let errors: Vec<&Notice> = notices.iter().filter(|n| n.is_error()).collect();
		match errors.first() {
			Some(first) => Notice::error(
				first.title.clone(),
				errors.iter().map(|n| n.message.as_str()).collect::<Vec<_>>().join("\n"),
			),
			None => Notice::success("Validation Successful", ""),
		}
	}
}

pub struct AnalysisClient<T> {
	transport: T,
	host: String,
	api: String,
	state: String,
	region: String,
	poll: PollPolicy,
}

impl<T: Transport> AnalysisClient<T> {
	pub fn new(transport: T, host: impl Into<String>, state: impl Into<String>, region: impl Into<String>) -> Self {
		Self {
			transport,
			host: host.into().trim_end_matches('/').to_string(),
			api: "/api/v1".into(),
			state: state.into(),
			region: region.into(),
			poll: PollPolicy::default(),
		}
	}

	pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
		self.poll = poll;
		self
	}

	fn query(&self) -> String {
		format!("state={}&region={}", self.state, self.region)
	}

	pub fn config_url(&self) -> String {
		format!("{}/config?{}", self.host, self.query())
	}

	/// Backend file route for `filepath`, else the external `url`.
	pub fn reference_url(&self, descriptor: &DatasetDescriptor) -> Option<String> {
		match (&descriptor.filepath, &descriptor.url) {
			(Some(file), _) => Some(format!(
				"{}{}/reference_data_file?{}&filename={}",
				self.host,
				self.api,
				self.query(),
				file
			)),
			(None, Some(url)) => Some(url.clone()),
			(None, None) => None,
		}
	}

	fn route(&self, path: &str) -> String {
		format!("{}{}/{}?{}", self.host, self.api, path, self.query())
	}

	async fn get_json(&self, url: &str) -> Result<Value, ApiError> {
		let body = self.transport.get(url).await?;
		Ok(serde_json::from_str(&body)?)
	}

	async fn post_json(&self, url: &str, payload: &impl Serialize) -> Result<Value, ApiError> {
		let body = serde_json::to_string(payload)?;
		let text = self.transport.post(url, body).await?;
		Ok(serde_json::from_str(&text)?)
	}

	/// Project configuration. A backend without a config for this
	/// jurisdiction yields the defaults.
	pub async fn get_config(&self) -> Result<ProjectConfig, ApiError> {
		let value = self.get_json(&self.config_url()).await?;
		let no_config = value
			.get("detail")
			.and_then(Value::as_str)
			.is_some_and(|d| d.to_lowercase().contains("no config"));
		if no_config {
			warn!("no config for {} {}", self.state, self.region);
			return Ok(ProjectConfig::default());
		}
		Ok(serde_json::from_value(value)?)
	}

	pub async fn get_reference_data(&self, descriptor: &DatasetDescriptor) -> Result<PolygonDataset, EditorError> {
		let url = self
			.reference_url(descriptor)
			.ok_or_else(|| crate::error::DatasetError::Unsupported("descriptor has no source".into()))?;
		let body = self.transport.get(&url).await?;
		let data = ReferenceData::from_json(&body)?;
		Ok(PolygonDataset::from_reference(data, descriptor)?)
	}

	/// Follows a task handle until the backend reports a final status.
	async fn settle<S, SFut>(&self, response: Value, sleep: S) -> Result<Value, ApiError>
	where
		S: FnMut(u32) -> SFut,
		SFut: Future<Output = ()>,
	{
		let pending = !is_final(&response) && response.get("data").is_none_or(Value::is_null);
		let route = response.get("result_route").and_then(Value::as_str).map(str::to_string);
		let response = match route {
			Some(route) if pending => {
				let url = format!("{}{}", self.host, route);
				poll(|| self.get_json(&url), is_final, self.poll, sleep).await?
			}
			_ => response,
		};
		let failed = response
			.get("status")
			.and_then(Value::as_str)
			.filter(|status| is_final(&response) && !status.eq_ignore_ascii_case("success"))
			.map(str::to_string);
		match failed {
			Some(status) => Err(ApiError::TaskFailed(status)),
			None => Ok(response),
		}
	}

	pub async fn validate_network<S, SFut>(&self, graph: &Graph, sleep: S) -> Notice
	where
		S: FnMut(u32) -> SFut,
		SFut: Future<Output = ()>,
	{
		let result = async {
			let rsp = self.post_json(&self.route("network/validate"), &export::network(graph)).await?;
			self.settle(rsp, sleep).await
		}
		.await;
		match result {
			Ok(rsp) if rsp.pointer("/data/isvalid").and_then(Value::as_bool) == Some(true) => {
				Notice::success("Validation Succeeded", "Success")
			}
			Ok(rsp) => Notice::error("Validation Errors", pretty(rsp.get("data").unwrap_or(&Value::Null))),
			Err(err) => {
				error!("network validation failed: {}", err);
				Notice::error("Validation Error", err.to_string())
			}
		}
	}

	pub async fn validate_facilities<S, SFut>(&self, graph: &Graph, sleep: S) -> Notice
	where
		S: FnMut(u32) -> SFut,
		SFut: Future<Output = ()>,
	{
		let payload = serde_json::json!({ "treatment_facilities": export::treatment_facilities(graph) });
		let result = async {
			let rsp = self.post_json(&self.route("treatment_facility/validate"), &payload).await?;
			self.settle(rsp, sleep).await
		}
		.await;
		match result {
			Ok(rsp) => {
				let errors = facility_errors(&rsp);
				if errors.is_empty() {
					Notice::success("Validation Succeeded", "")
				} else {
					Notice::error("Validation Errors", errors.join("\n"))
				}
			}
			Err(err) => {
				error!("facility validation failed: {}", err);
				Notice::error("Validation Error", err.to_string())
			}
		}
	}

	/// Submits the watershed and waits for the solution. The graph is never
	/// touched.
	pub async fn solve_watershed<S, SFut>(&self, graph: &Graph, sleep: S) -> Result<Value, ApiError>
	where
		S: FnMut(u32) -> SFut,
		SFut: Future<Output = ()>,
	{
		let rsp = self
			.post_json(&self.route("watershed/solve"), &export::watershed_request(graph))
			.await?;
		let rsp = self.settle(rsp, sleep).await?;
		if let Some(errors) = rsp.pointer("/data/errors").and_then(Value::as_array) {
			if !errors.is_empty() {
				warn!("watershed solved with {} errors", errors.len());
			}
		}
		Ok(rsp)
	}
}

fn is_final(rsp: &Value) -> bool {
	rsp.get("status")
		.and_then(Value::as_str)
		.is_some_and(|s| matches!(s.to_uppercase().as_str(), "SUCCESS" | "FAILURE"))
}

fn pretty(value: &Value) -> String {
	serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn facility_errors(rsp: &Value) -> Vec<String> {
	let mut errors = Vec::new();
	let facilities = rsp
		.pointer("/data/treatment_facilities")
		.and_then(Value::as_array)
		.map(Vec::as_slice)
		.unwrap_or_default();
	for facility in facilities {
		if let Some(e) = facility.get("errors").and_then(Value::as_str) {
			if !e.is_empty() {
				errors.push(e.replace('\n', " "));
			}
		}
	}
	let general = rsp
		.pointer("/data/errors")
		.and_then(Value::as_array)
		.map(Vec::as_slice)
		.unwrap_or_default();
	for e in general.iter().filter_map(Value::as_str) {
		let head: String = e.chars().take(6).collect();
		if head.to_lowercase().contains("error") {
			errors.push(e.to_string());
		}
	}
	errors
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::collections::VecDeque;

	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	#[derive(Default)]
	struct Scripted {
		responses: RefCell<VecDeque<Result<String, ApiError>>>,
		requests: RefCell<Vec<String>>,
	}

	impl Scripted {
		fn new(responses: Vec<Value>) -> Self {
			Self {
				responses: RefCell::new(responses.into_iter().map(|v| Ok(v.to_string())).collect()),
				requests: RefCell::default(),
			}
		}

		fn next(&self, url: &str) -> Result<String, ApiError> {
			self.requests.borrow_mut().push(url.to_string());
			self.responses
				.borrow_mut()
				.pop_front()
				.unwrap_or(Err(ApiError::Network("script exhausted".into())))
		}
	}

	impl Transport for &Scripted {
		async fn get(&self, url: &str) -> Result<String, ApiError> {
			self.next(url)
		}

		async fn post(&self, url: &str, _body: String) -> Result<String, ApiError> {
			self.next(url)
		}
	}

	async fn no_sleep(_: u32) {}

	fn client(script: &Scripted) -> AnalysisClient<&Scripted> {
		AnalysisClient::new(script, "http://nereid/", "ca", "cosd").with_poll_policy(PollPolicy {
			interval_ms: 0,
			max_attempts: 3,
		})
	}

	#[test]
	fn poll_gives_up_after_max_attempts() {
		let mut calls = 0;
		let result = pollster::block_on(poll(
			|| {
				calls += 1;
				async { Ok::<_, ApiError>(false) }
			},
			|done| *done,
			PollPolicy {
				interval_ms: 0,
				max_attempts: 4,
			},
			no_sleep,
		));
		assert_eq!(result, Err(ApiError::ExceededMaxAttempts(4)));
		assert_eq!(calls, 4);
	}

	#[test]
	fn poll_returns_first_accepted_result() {
		let mut n = 0;
		let result = pollster::block_on(poll(
			|| {
				n += 1;
				let v = n;
				async move { Ok::<_, ApiError>(v) }
			},
			|v| *v == 2,
			PollPolicy::default(),
			no_sleep,
		));
		assert_eq!(result, Ok(2));
	}

	#[test]
	fn only_latest_ticket_is_accepted() {
		let generation = RequestGeneration::default();
		let first = generation.next();
		let second = generation.next();
		assert_eq!(first.accept("stale"), Err(ApiError::Superseded));
		assert_eq!(second.accept("fresh"), Ok("fresh"));
	}

	#[test]
	fn urls_carry_jurisdiction() {
		let script = Scripted::default();
		let c = client(&script);
		assert_eq!(c.config_url(), "http://nereid/config?state=ca&region=cosd");
		let descriptor = DatasetDescriptor {
			filepath: Some("zones.json".into()),
			..DatasetDescriptor::default()
		};
		assert_eq!(
			c.reference_url(&descriptor).as_deref(),
			Some("http://nereid/api/v1/reference_data_file?state=ca&region=cosd&filename=zones.json")
		);
		assert_eq!(c.reference_url(&DatasetDescriptor::default()), None);
	}

	#[test]
	fn missing_config_falls_back_to_defaults() {
		let script = Scripted::new(vec![json!({"detail": "No config found"})]);
		let cfg = pollster::block_on(client(&script).get_config()).unwrap();
		assert_eq!(cfg, ProjectConfig::default());
	}

	#[test]
	fn solve_follows_result_route() {
		let script = Scripted::new(vec![
			json!({"status": "STARTED", "task_id": "t1", "result_route": "/api/v1/watershed/solve/t1"}),
			json!({"status": "STARTED"}),
			json!({"status": "SUCCESS", "data": {"results": [], "errors": []}}),
		]);
		let rsp = pollster::block_on(client(&script).solve_watershed(&Graph::default(), no_sleep)).unwrap();
		assert_eq!(rsp["status"], "SUCCESS");
		assert_eq!(
			script.requests.borrow().last().map(String::as_str),
			Some("http://nereid/api/v1/watershed/solve/t1")
		);
	}

	#[test]
	fn solve_poll_exhaustion_is_reported() {
		let script = Scripted::new(vec![
			json!({"status": "STARTED", "result_route": "/api/v1/watershed/solve/t1"}),
			json!({"status": "STARTED"}),
			json!({"status": "STARTED"}),
			json!({"status": "STARTED"}),
		]);
		let err = pollster::block_on(client(&script).solve_watershed(&Graph::default(), no_sleep)).unwrap_err();
		assert_eq!(err, ApiError::ExceededMaxAttempts(3));
	}

	#[test]
	fn network_validation_becomes_notice() {
		let script = Scripted::new(vec![json!({"status": "SUCCESS", "data": {"isvalid": true}})]);
		let notice = pollster::block_on(client(&script).validate_network(&Graph::default(), no_sleep));
		assert_eq!(notice, Notice::success("Validation Succeeded", "Success"));

		let script = Scripted::new(vec![]);
		let notice = pollster::block_on(client(&script).validate_network(&Graph::default(), no_sleep));
		assert!(notice.is_error());
		assert_eq!(notice.title, "Validation Error");
	}

	#[test]
	fn facility_errors_are_collected() {
		let script = Scripted::new(vec![json!({"status": "SUCCESS", "data": {
			"treatment_facilities": [{"node_id": "0", "errors": "bad\nvalue"}, {"node_id": "1"}],
			"errors": ["ERROR: missing area", "warning: ok"]
		}})]);
		let notice = pollster::block_on(client(&script).validate_facilities(&Graph::default(), no_sleep));
		assert_eq!(notice, Notice::error("Validation Errors", "bad value\nERROR: missing area"));
	}

	#[test]
	fn failed_solve_task_is_an_error() {
		let script = Scripted::new(vec![
			json!({"status": "STARTED", "result_route": "/api/v1/watershed/solve/t1"}),
			json!({"status": "FAILURE", "data": null}),
		]);
		let err = pollster::block_on(client(&script).solve_watershed(&Graph::default(), no_sleep)).unwrap_err();
		assert_eq!(err, ApiError::TaskFailed("FAILURE".into()));

		let script = Scripted::new(vec![json!({"status": "failure"})]);
		let err = pollster::block_on(client(&script).solve_watershed(&Graph::default(), no_sleep)).unwrap_err();
		assert_eq!(err, ApiError::TaskFailed("failure".into()));
	}

	#[test]
	fn failed_facility_task_is_not_a_success() {
		let script = Scripted::new(vec![json!({"status": "FAILURE", "data": null})]);
		let notice = pollster::block_on(client(&script).validate_facilities(&Graph::default(), no_sleep));
		assert_eq!(
			notice,
			Notice::error("Validation Error", "backend task ended with status FAILURE")
		);

		let script = Scripted::new(vec![json!({"status": "FAILURE"})]);
		let notice = pollster::block_on(client(&script).validate_network(&Graph::default(), no_sleep));
		assert_eq!(notice.title, "Validation Error");
	}

	#[test]
	fn tickets_can_cross_threads() {
		fn assert_send_sync<T: Send + Sync + 'static>(_: &T) {}
		let generation = RequestGeneration::default();
		assert_send_sync(&generation);
		let ticket = generation.next();
		assert_send_sync(&ticket);
		let handle = std::thread::spawn(move || ticket.is_current());
		assert!(handle.join().unwrap());
	}

	#[test]
	fn combined_notice_keeps_every_error() {
		let combined = Notice::combine(&[
			Notice::success("Validation Succeeded", ""),
			Notice::error("Validation Errors", "a"),
			Notice::error("Validation Errors", "b"),
		]);
		assert_eq!(combined, Notice::error("Validation Errors", "a\nb"));
	}
}
