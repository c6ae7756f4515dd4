//! Sandbox for user-authored collection scripts.
//!
//! Each invocation gets a fresh QuickJS runtime with a wall-clock interrupt,
//! a memory cap, and no ambient I/O: the only capabilities a script sees are
//! the `pm`/`console` surface built by the embedded prelude over a handful of
//! injected hooks. Script-internal errors never escape as Rust errors; they
//! end up as failed test records or as the invocation's `failure` message.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rquickjs::function::Func;
use rquickjs::{CatchResultExt, CaughtError, Context, Runtime};
use serde::Serialize;
use tracing::debug;

use crate::domain::report::TestResult;
use crate::domain::types::BodySpec;

pub const DEFAULT_SCRIPT_BUDGET: Duration = Duration::from_millis(5000);

const PRELUDE: &str = include_str!("prelude.js");
const MEMORY_LIMIT: usize = 32 * 1024 * 1024;
const STACK_LIMIT: usize = 512 * 1024;

/// Which lifecycle hook a script is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptPhase {
    PreRequest,
    Test,
}

impl ScriptPhase {
    /// Name given to the synthetic result when a script dies at top level.
    pub fn failure_label(self) -> &'static str {
        match self {
            ScriptPhase::PreRequest => "Pre-request Script",
            ScriptPhase::Test => "Script Execution",
        }
    }
}

/// Read-only request view handed to `pm.request`. Header values are the raw
/// declared ones; the URL is the resolved form.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<BodySpec>,
}

/// Response view handed to `pm.response` in the test phase.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResponse {
    pub code: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Everything a single sandbox invocation produced.
#[derive(Debug)]
pub struct ScriptOutcome {
    /// The scope after the script ran; mutations survive into later phases
    /// and later requests.
    pub vars: HashMap<String, String>,
    pub tests: Vec<TestResult>,
    pub console: Vec<String>,
    /// Top-level throw or budget exhaustion. Assertion failures are not
    /// failures of the invocation itself.
    pub failure: Option<String>,
}

/// Run one script source. Never panics and never returns a Rust-level error
/// for anything the script did.
pub fn run_script(
    source: &str,
    phase: ScriptPhase,
    vars: HashMap<String, String>,
    request: &ScriptRequest,
    response: Option<&ScriptResponse>,
    budget: Duration,
) -> ScriptOutcome {
    let scope = Rc::new(RefCell::new(vars));
    let tests: Rc<RefCell<Vec<TestResult>>> = Rc::new(RefCell::new(Vec::new()));
    let console: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    debug!(?phase, "running script");
    let failure = execute(source, request, response, &scope, &tests, &console, budget).err();

    let vars = scope.borrow().clone();
    let tests = tests.borrow().clone();
    let console = console.borrow().clone();
    ScriptOutcome {
        vars,
        tests,
        console,
        failure,
    }
}

fn execute(
    source: &str,
    request: &ScriptRequest,
    response: Option<&ScriptResponse>,
    scope: &Rc<RefCell<HashMap<String, String>>>,
    tests: &Rc<RefCell<Vec<TestResult>>>,
    console: &Rc<RefCell<Vec<String>>>,
    budget: Duration,
) -> Result<(), String> {
    let runtime =
        Runtime::new().map_err(|err| format!("failed to start script runtime: {err}"))?;
    runtime.set_memory_limit(MEMORY_LIMIT);
    runtime.set_max_stack_size(STACK_LIMIT);

    let started = Instant::now();
    let deadline = started + budget;
    runtime.set_interrupt_handler(Some(Box::new(move || Instant::now() >= deadline)));

    let context =
        Context::full(&runtime).map_err(|err| format!("failed to create script context: {err}"))?;

    let request_json = serde_json::to_string(request)
        .map_err(|err| format!("failed to encode request view: {err}"))?;
    let response_json = response
        .map(serde_json::to_string)
        .transpose()
        .map_err(|err| format!("failed to encode response view: {err}"))?;

    let result = context.with(|ctx| -> Result<(), String> {
        let globals = ctx.globals();

        globals
            .set("__request_json", request_json.as_str())
            .map_err(engine_error)?;
        globals
            .set("__response_json", response_json.clone())
            .map_err(engine_error)?;

        {
            let scope = Rc::clone(scope);
            globals
                .set(
                    "__scope_get",
                    Func::from(move |key: String| -> Option<String> {
                        scope.borrow().get(&key).cloned()
                    }),
                )
                .map_err(engine_error)?;
        }
        {
            let scope = Rc::clone(scope);
            globals
                .set(
                    "__scope_set",
                    Func::from(move |key: String, value: String| {
                        scope.borrow_mut().insert(key, value);
                    }),
                )
                .map_err(engine_error)?;
        }
        {
            let scope = Rc::clone(scope);
            globals
                .set(
                    "__scope_unset",
                    Func::from(move |key: String| {
                        scope.borrow_mut().remove(&key);
                    }),
                )
                .map_err(engine_error)?;
        }
        {
            let scope = Rc::clone(scope);
            globals
                .set(
                    "__scope_entries",
                    Func::from(move || -> String {
                        serde_json::to_string(&*scope.borrow()).unwrap_or_else(|_| "{}".to_string())
                    }),
                )
                .map_err(engine_error)?;
        }
        {
            let tests = Rc::clone(tests);
            globals
                .set(
                    "__record_test",
                    Func::from(move |name: String, passed: bool, error: Option<String>| {
                        tests.borrow_mut().push(TestResult {
                            test_name: name,
                            passed,
                            error,
                        });
                    }),
                )
                .map_err(engine_error)?;
        }
        {
            let console = Rc::clone(console);
            globals
                .set(
                    "__console_log",
                    Func::from(move |level: String, message: String| {
                        debug!(target: "runman::script", "console.{level}: {message}");
                        console.borrow_mut().push(format!("[{level}] {message}"));
                    }),
                )
                .map_err(engine_error)?;
        }

        ctx.eval::<(), _>(PRELUDE).catch(&ctx).map_err(describe)?;
        ctx.eval::<(), _>(source).catch(&ctx).map_err(describe)?;
        Ok(())
    });

    match result {
        Ok(()) => Ok(()),
        // The interrupt handler surfaces as an opaque exception; report the
        // budget instead when the clock has clearly run out.
        Err(_) if started.elapsed() >= budget => {
            Err(format!("script exceeded the {} ms budget", budget.as_millis()))
        }
        Err(message) => Err(message),
    }
}

fn engine_error(err: rquickjs::Error) -> String {
    format!("script engine error: {err}")
}

fn describe(err: CaughtError<'_>) -> String {
    match err {
        CaughtError::Exception(exception) => exception
            .message()
            .unwrap_or_else(|| "unknown script exception".to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ScriptRequest {
        ScriptRequest {
            method: "GET".to_string(),
            url: "http://svc.local/health".to_string(),
            headers: HashMap::from([("X-Trace".to_string(), "{{trace}}".to_string())]),
            body: None,
        }
    }

    fn response(code: u16, body: &str) -> ScriptResponse {
        ScriptResponse {
            code,
            status_text: "OK".to_string(),
            headers: HashMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]),
            body: body.to_string(),
        }
    }

    fn run(source: &str, vars: HashMap<String, String>, resp: Option<&ScriptResponse>) -> ScriptOutcome {
        run_script(
            source,
            if resp.is_some() {
                ScriptPhase::Test
            } else {
                ScriptPhase::PreRequest
            },
            vars,
            &request(),
            resp,
            DEFAULT_SCRIPT_BUDGET,
        )
    }

    #[test]
    fn passing_and_failing_tests_are_both_recorded() {
        let resp = response(200, "{}");
        let outcome = run(
            r#"
            pm.test("ok", () => pm.expect(1).to.equal(1));
            pm.test("bad", () => { throw new Error("x") });
            pm.test("still runs", () => pm.expect("ab").to.include("a"));
            "#,
            HashMap::new(),
            Some(&resp),
        );

        assert!(outcome.failure.is_none());
        assert_eq!(outcome.tests.len(), 3);
        assert_eq!(outcome.tests[0], TestResult { test_name: "ok".into(), passed: true, error: None });
        assert_eq!(
            outcome.tests[1],
            TestResult { test_name: "bad".into(), passed: false, error: Some("x".into()) }
        );
        assert!(outcome.tests[2].passed);
    }

    #[test]
    fn environment_mutations_survive_the_invocation() {
        let outcome = run(
            r#"
            pm.environment.set("token", "xyz");
            pm.environment.set("stale", "1");
            pm.environment.unset("stale");
            "#,
            HashMap::new(),
            None,
        );

        assert!(outcome.failure.is_none());
        assert_eq!(outcome.vars.get("token").map(String::as_str), Some("xyz"));
        assert!(!outcome.vars.contains_key("stale"));
    }

    #[test]
    fn environment_and_variables_share_one_backing_map() {
        let resp = response(200, "{}");
        let outcome = run(
            r#"
            pm.variables.set("shared", "42");
            pm.test("visible across objects", () =>
                pm.expect(pm.environment.get("shared")).to.equal("42"));
            pm.test("toObject sees it too", () =>
                pm.expect(pm.variables.toObject().shared).to.equal("42"));
            "#,
            HashMap::new(),
            Some(&resp),
        );

        assert!(outcome.tests.iter().all(|test| test.passed), "{:?}", outcome.tests);
    }

    #[test]
    fn scope_reads_see_initial_variables() {
        let resp = response(200, "{}");
        let vars = HashMap::from([("base".to_string(), "1".to_string())]);
        let outcome = run(
            r#"pm.test("reads seed", () => pm.expect(pm.environment.get("base")).to.equal("1"));"#,
            vars,
            Some(&resp),
        );
        assert!(outcome.tests[0].passed, "{:?}", outcome.tests);
    }

    #[test]
    fn response_surface_parses_json_and_checks_status() {
        let resp = response(200, r#"{"status":"up","count":3}"#);
        let outcome = run(
            r#"
            pm.test("status", () => pm.response.to.have.status(200));
            pm.test("chainable", () => pm.response.to.have.status(200).status(200));
            pm.test("json body", () => pm.expect(pm.response.json().status).to.equal("up"));
            pm.test("text body", () => pm.expect(pm.response.text()).to.include("count"));
            pm.test("header lookup", () =>
                pm.expect(pm.response.headers.get("content-type")).to.equal("application/json"));
            "#,
            HashMap::new(),
            Some(&resp),
        );

        assert!(outcome.tests.iter().all(|test| test.passed), "{:?}", outcome.tests);
    }

    #[test]
    fn wrong_status_fails_with_the_expected_message() {
        let resp = response(500, "oops");
        let outcome = run(
            r#"pm.test("status", () => pm.response.to.have.status(200));"#,
            HashMap::new(),
            Some(&resp),
        );

        assert!(!outcome.tests[0].passed);
        assert_eq!(
            outcome.tests[0].error.as_deref(),
            Some("Expected status 200, got 500")
        );
    }

    #[test]
    fn malformed_json_body_reads_as_null() {
        let resp = response(200, "not json");
        let outcome = run(
            r#"pm.test("json is null", () => pm.expect(pm.response.json()).to.equal(null));"#,
            HashMap::new(),
            Some(&resp),
        );
        assert!(outcome.tests[0].passed, "{:?}", outcome.tests);
    }

    #[test]
    fn request_view_is_exposed_read_only() {
        let outcome = run(
            r#"
            pm.environment.set("method", pm.request.method);
            pm.environment.set("url", pm.request.url.toString());
            pm.environment.set("trace", pm.request.headers.get("x-trace"));
            "#,
            HashMap::new(),
            None,
        );

        assert_eq!(outcome.vars.get("method").map(String::as_str), Some("GET"));
        assert_eq!(
            outcome.vars.get("url").map(String::as_str),
            Some("http://svc.local/health")
        );
        assert_eq!(outcome.vars.get("trace").map(String::as_str), Some("{{trace}}"));
    }

    #[test]
    fn top_level_throw_becomes_a_failure_message() {
        let outcome = run("throw new Error('boom');", HashMap::new(), None);
        assert_eq!(outcome.failure.as_deref(), Some("boom"));
    }

    #[test]
    fn syntax_errors_become_a_failure_message() {
        let outcome = run("this is not javascript", HashMap::new(), None);
        assert!(outcome.failure.is_some());
    }

    #[test]
    fn endless_loops_hit_the_budget() {
        let started = Instant::now();
        let outcome = run_script(
            "while (true) {}",
            ScriptPhase::PreRequest,
            HashMap::new(),
            &request(),
            None,
            Duration::from_millis(100),
        );

        assert_eq!(
            outcome.failure.as_deref(),
            Some("script exceeded the 100 ms budget")
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn console_output_is_captured() {
        let outcome = run(
            r#"console.log("checking", 42); console.warn({"a": 1});"#,
            HashMap::new(),
            None,
        );

        assert_eq!(
            outcome.console,
            vec!["[log] checking 42".to_string(), "[warn] {\"a\":1}".to_string()]
        );
    }

    #[test]
    fn timer_stubs_are_inert() {
        let outcome = run(
            r#"
            var id = setTimeout(function () { pm.environment.set("fired", "yes"); }, 10);
            clearTimeout(id);
            setInterval(function () {}, 10);
            clearInterval(0);
            "#,
            HashMap::new(),
            None,
        );

        assert!(outcome.failure.is_none());
        assert!(!outcome.vars.contains_key("fired"));
    }
}
