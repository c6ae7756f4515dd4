use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::domain::report::{ExecutionResult, ExecutionSummary, TestResult};
use crate::domain::types::{AuthSpec, Collection, Environment, Event, Item, RequestSpec};
use crate::engine::auth::apply_auth;
use crate::engine::cancel::cancel_requested;
use crate::engine::env::build_scope;
use crate::engine::http::{ReqwestTransport, Transport, WireRequest, WireResponse};
use crate::engine::request::{append_query, build_body, build_headers, build_url};
use crate::engine::script::{
    run_script, ScriptPhase, ScriptRequest, ScriptResponse, DEFAULT_SCRIPT_BUDGET,
};

const PRE_REQUEST: &str = "prerequest";
const TEST: &str = "test";

/// Per-run knobs. Defaults: 5 s script budget, 30 s transport deadline,
/// response bodies kept up to 10 000 characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunOptions {
    /// `None` reproduces the unbounded legacy behavior.
    pub request_timeout_ms: Option<u64>,
    pub script_budget_ms: u64,
    pub max_response_body_chars: usize,
    pub proxy_url: Option<String>,
    pub verify_ssl: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            request_timeout_ms: Some(30_000),
            script_budget_ms: DEFAULT_SCRIPT_BUDGET.as_millis() as u64,
            max_response_body_chars: 10_000,
            proxy_url: None,
            verify_ssl: true,
        }
    }
}

/// A request leaf after flattening: breadcrumb label plus the inherited
/// event chain (collection first, then each folder, then the leaf's own).
struct FlatLeaf<'a> {
    request: &'a RequestSpec,
    label: String,
    events: Vec<&'a Event>,
}

fn flatten(collection: &Collection) -> Vec<FlatLeaf<'_>> {
    let mut leaves = Vec::new();
    let inherited: Vec<&Event> = collection.event.iter().collect();
    walk(&collection.item, "", &inherited, &mut leaves);
    leaves
}

fn walk<'a>(
    items: &'a [Item],
    prefix: &str,
    inherited: &[&'a Event],
    leaves: &mut Vec<FlatLeaf<'a>>,
) {
    for item in items {
        let label = if prefix.is_empty() {
            item.name.clone()
        } else {
            format!("{prefix} > {}", item.name)
        };

        let mut events = inherited.to_vec();
        events.extend(item.event.iter());

        if let Some(request) = &item.request {
            leaves.push(FlatLeaf {
                request,
                label: label.clone(),
                events: events.clone(),
            });
        }
        if let Some(children) = &item.item {
            walk(children, &label, &events, leaves);
        }
    }
}

/// Drives one collection at a time: flatten, then strictly sequential
/// request pipelines sharing a single mutable variable scope. Failures are
/// absorbed per leaf; the run always yields one result per request node.
pub struct Runner {
    transport: Box<dyn Transport>,
    options: RunOptions,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new(RunOptions::default())
    }
}

impl Runner {
    pub fn new(options: RunOptions) -> Self {
        Self::with_transport(Box::new(ReqwestTransport), options)
    }

    pub fn with_transport(transport: Box<dyn Transport>, options: RunOptions) -> Self {
        Self { transport, options }
    }

    pub async fn run(
        &self,
        collection: &Collection,
        environment: Option<&Environment>,
    ) -> ExecutionSummary {
        // Keep the sender alive so an idle receiver never reads as cancelled.
        let (_cancel_tx, mut cancel_rx) = broadcast::channel(1);
        self.run_with_cancel(collection, environment, &mut cancel_rx)
            .await
    }

    pub async fn run_with_cancel(
        &self,
        collection: &Collection,
        environment: Option<&Environment>,
        cancel_rx: &mut broadcast::Receiver<()>,
    ) -> ExecutionSummary {
        let started = Instant::now();
        let mut scope = build_scope(environment, &collection.variable);
        let leaves = flatten(collection);
        info!(
            collection = %collection.info.name,
            requests = leaves.len(),
            "starting collection run"
        );

        let mut results = Vec::with_capacity(leaves.len());
        let mut cancelled = false;
        for leaf in &leaves {
            if cancelled || cancel_requested(cancel_rx) {
                cancelled = true;
                results.push(cancelled_result(leaf, &scope));
                continue;
            }

            let result = self
                .execute_leaf(leaf, collection.auth.as_ref(), &mut scope, cancel_rx)
                .await;
            results.push(result);
        }

        let summary = ExecutionSummary::from_results(results, started.elapsed().as_millis() as u64);
        info!(
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            errors = summary.errors,
            "collection run finished"
        );
        summary
    }

    async fn execute_leaf(
        &self,
        leaf: &FlatLeaf<'_>,
        collection_auth: Option<&AuthSpec>,
        scope: &mut HashMap<String, String>,
        cancel_rx: &mut broadcast::Receiver<()>,
    ) -> ExecutionResult {
        let started = Instant::now();
        let spec = leaf.request;
        let method = if spec.method.is_empty() {
            "GET".to_string()
        } else {
            spec.method.clone()
        };

        let mut test_results: Vec<TestResult> = Vec::new();

        // Pre-request scripts first; they may rewrite the scope the builders
        // read below.
        let pre_view = self.script_view(spec, &method, scope);
        for event in leaf.events.iter().copied().filter(|event| event.listen == PRE_REQUEST) {
            let (_, failure) = self
                .run_event(event, ScriptPhase::PreRequest, scope, &pre_view, None)
                .await;
            if let Some(message) = failure {
                test_results.push(synthetic_failure(ScriptPhase::PreRequest, message));
            }
        }

        // Build the wire request with whatever the scripts left in the scope.
        let mut headers = build_headers(&spec.header, scope);
        let mut extra_query = None;
        if let Some(auth) = spec.auth.as_ref().or(collection_auth) {
            match apply_auth(auth, &mut headers, scope) {
                Ok(pair) => extra_query = pair,
                Err(err) => {
                    return self.failed_result(leaf, &method, scope, started, test_results, err.to_string());
                }
            }
        }

        let mut url = build_url(&spec.url, scope);
        if let Some((key, value)) = extra_query {
            append_query(&mut url, &key, &value);
        }

        let body = match build_body(spec.body.as_ref(), scope, &mut headers) {
            Ok(body) => body,
            Err(err) => {
                return self.failed_result(leaf, &method, scope, started, test_results, err.to_string());
            }
        };

        debug!(request = %leaf.label, method = %method, url = %url, "executing request");
        let wire = WireRequest {
            method: method.clone(),
            url: url.clone(),
            headers,
            body,
            timeout: self.options.request_timeout_ms.map(Duration::from_millis),
            proxy_url: self.options.proxy_url.clone(),
            verify_ssl: self.options.verify_ssl,
        };

        let response = match self.transport.send(wire, cancel_rx).await {
            Ok(response) => response,
            Err(err) => {
                warn!(request = %leaf.label, "request failed: {err}");
                return ExecutionResult {
                    request_name: leaf.label.clone(),
                    request_method: method,
                    request_url: url,
                    status_code: None,
                    response_time: Some(started.elapsed().as_millis() as u64),
                    success: false,
                    error: Some(err.to_string()),
                    response_body: None,
                    response_headers: None,
                    test_results,
                };
            }
        };

        // Test scripts see the resolved URL and the captured response.
        let test_view = ScriptRequest {
            method: method.clone(),
            url: url.clone(),
            headers: raw_headers(spec),
            body: spec.body.clone(),
        };
        let script_response = script_response(&response);
        for event in leaf.events.iter().copied().filter(|event| event.listen == TEST) {
            let (tests, failure) = self
                .run_event(
                    event,
                    ScriptPhase::Test,
                    scope,
                    &test_view,
                    Some(script_response.clone()),
                )
                .await;
            test_results.extend(tests);
            if let Some(message) = failure {
                test_results.push(synthetic_failure(ScriptPhase::Test, message));
            }
        }

        let all_passed = test_results.iter().all(|test| test.passed);
        ExecutionResult {
            request_name: leaf.label.clone(),
            request_method: method,
            request_url: url,
            status_code: Some(response.status),
            response_time: Some(started.elapsed().as_millis() as u64),
            success: response.is_success() && all_passed,
            error: None,
            response_body: Some(truncate_chars(
                &response.body,
                self.options.max_response_body_chars,
            )),
            response_headers: Some(response.headers),
            test_results,
        }
    }

    /// Run one event's script off the reactor. On success the scope is
    /// replaced with the script's view; on a join failure the scope is left
    /// untouched and the failure surfaces like a thrown script error.
    async fn run_event(
        &self,
        event: &Event,
        phase: ScriptPhase,
        scope: &mut HashMap<String, String>,
        request: &ScriptRequest,
        response: Option<ScriptResponse>,
    ) -> (Vec<TestResult>, Option<String>) {
        let Some(script) = event.script.as_ref() else {
            return (Vec::new(), None);
        };
        if script.exec.is_empty() {
            return (Vec::new(), None);
        }

        let source = script.exec.source();
        let vars = scope.clone();
        let request = request.clone();
        let budget = Duration::from_millis(self.options.script_budget_ms);

        let joined = tokio::task::spawn_blocking(move || {
            run_script(&source, phase, vars, &request, response.as_ref(), budget)
        })
        .await;

        match joined {
            Ok(outcome) => {
                *scope = outcome.vars;
                if let Some(message) = &outcome.failure {
                    warn!(?phase, "script failed: {message}");
                }
                (outcome.tests, outcome.failure)
            }
            Err(err) => (Vec::new(), Some(format!("script task failed: {err}"))),
        }
    }

    fn script_view(
        &self,
        spec: &RequestSpec,
        method: &str,
        scope: &HashMap<String, String>,
    ) -> ScriptRequest {
        ScriptRequest {
            method: method.to_string(),
            url: build_url(&spec.url, scope),
            headers: raw_headers(spec),
            body: spec.body.clone(),
        }
    }

    fn failed_result(
        &self,
        leaf: &FlatLeaf<'_>,
        method: &str,
        scope: &HashMap<String, String>,
        started: Instant,
        test_results: Vec<TestResult>,
        error: String,
    ) -> ExecutionResult {
        warn!(request = %leaf.label, "request build failed: {error}");
        ExecutionResult {
            request_name: leaf.label.clone(),
            request_method: method.to_string(),
            request_url: build_url(&leaf.request.url, scope),
            status_code: None,
            response_time: Some(started.elapsed().as_millis() as u64),
            success: false,
            error: Some(error),
            response_body: None,
            response_headers: None,
            test_results,
        }
    }
}

fn synthetic_failure(phase: ScriptPhase, message: String) -> TestResult {
    TestResult {
        test_name: phase.failure_label().to_string(),
        passed: false,
        error: Some(message),
    }
}

fn raw_headers(spec: &RequestSpec) -> HashMap<String, String> {
    spec.header
        .iter()
        .filter(|header| !header.disabled)
        .map(|header| (header.key.clone(), header.value.clone()))
        .collect()
}

fn script_response(response: &WireResponse) -> ScriptResponse {
    ScriptResponse {
        code: response.status,
        status_text: response.status_text.clone(),
        headers: response.headers.clone(),
        body: response.body.clone(),
    }
}

fn cancelled_result(leaf: &FlatLeaf<'_>, scope: &HashMap<String, String>) -> ExecutionResult {
    let spec = leaf.request;
    ExecutionResult {
        request_name: leaf.label.clone(),
        request_method: if spec.method.is_empty() {
            "GET".to_string()
        } else {
            spec.method.clone()
        },
        request_url: build_url(&spec.url, scope),
        status_code: None,
        response_time: None,
        success: false,
        error: Some("run cancelled".to_string()),
        response_body: None,
        response_headers: None,
        test_results: Vec::new(),
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// One-shot convenience over the default reqwest transport.
pub async fn execute_collection(
    collection: &Collection,
    environment: Option<&Environment>,
) -> ExecutionSummary {
    Runner::default().run(collection, environment).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse::parse_collection;
    use serde_json::json;

    fn tree() -> Collection {
        parse_collection(json!({
            "info": { "name": "Nested" },
            "event": [
                { "listen": "prerequest", "script": { "exec": ["// root"] } },
            ],
            "item": [
                { "name": "Ping", "request": { "method": "GET", "url": "https://x.dev/ping" } },
                {
                    "name": "Users",
                    "event": [
                        { "listen": "test", "script": { "exec": ["// folder"] } },
                    ],
                    "item": [
                        {
                            "name": "List",
                            "request": { "method": "GET", "url": "https://x.dev/users" },
                            "event": [
                                { "listen": "test", "script": { "exec": ["// leaf"] } },
                            ],
                        },
                        {
                            "name": "Admin",
                            "item": [
                                { "name": "Create", "request": { "method": "POST", "url": "https://x.dev/users" } },
                            ],
                        },
                    ],
                },
            ],
        }))
        .unwrap()
    }

    #[test]
    fn flatten_preserves_depth_first_order_and_breadcrumbs() {
        let collection = tree();
        let leaves = flatten(&collection);

        let labels: Vec<&str> = leaves.iter().map(|leaf| leaf.label.as_str()).collect();
        assert_eq!(labels, vec!["Ping", "Users > List", "Users > Admin > Create"]);
    }

    #[test]
    fn flatten_accumulates_parent_events_before_leaf_events() {
        let collection = tree();
        let leaves = flatten(&collection);

        // Root event only.
        assert_eq!(leaves[0].events.len(), 1);

        // Root, folder, then the leaf's own — in that order.
        let sources: Vec<String> = leaves[1]
            .events
            .iter()
            .map(|event| event.script.as_ref().unwrap().exec.source())
            .collect();
        assert_eq!(sources, vec!["// root", "// folder", "// leaf"]);

        // Nested folder without own events inherits root + folder.
        assert_eq!(leaves[2].events.len(), 2);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("ok", 10), "ok");
    }
}
