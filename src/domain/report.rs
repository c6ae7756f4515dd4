use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One `pm.test` assertion, or the synthetic record for a script that died
/// at top level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub test_name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one request leaf. `error` is set only for pipeline failures
/// (build, transport); assertion failures live in `test_results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub request_name: String,
    pub request_method: String,
    pub request_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub test_results: Vec<TestResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub total_time: u64,
    pub results: Vec<ExecutionResult>,
}

impl ExecutionSummary {
    /// The aggregate is always recomputed from the full result list, never
    /// maintained incrementally.
    pub fn from_results(results: Vec<ExecutionResult>, total_time: u64) -> Self {
        let passed = results.iter().filter(|result| result.success).count();
        let failed = results.len() - passed;
        let errors = results.iter().filter(|result| result.error.is_some()).count();

        Self {
            total: results.len(),
            passed,
            failed,
            errors,
            total_time,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(success: bool, error: Option<&str>) -> ExecutionResult {
        ExecutionResult {
            request_name: "Ping".to_string(),
            request_method: "GET".to_string(),
            request_url: "https://x.dev/ping".to_string(),
            status_code: success.then_some(200),
            response_time: Some(12),
            success,
            error: error.map(str::to_string),
            response_body: None,
            response_headers: None,
            test_results: Vec::new(),
        }
    }

    #[test]
    fn summary_counts_are_recomputed_from_results() {
        let summary = ExecutionSummary::from_results(
            vec![
                result(true, None),
                result(false, None),
                result(false, Some("connection refused")),
            ],
            40,
        );

        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.passed + summary.failed, summary.total);
        assert_eq!(summary.total_time, 40);
    }

    #[test]
    fn wire_naming_is_camel_case() {
        let value = serde_json::to_value(ExecutionSummary::from_results(
            vec![result(true, None)],
            7,
        ))
        .unwrap();

        assert_eq!(value["totalTime"], 7);
        let first = &value["results"][0];
        assert_eq!(first["requestName"], "Ping");
        assert_eq!(first["requestUrl"], "https://x.dev/ping");
        assert_eq!(first["statusCode"], 200);
        assert!(first.get("error").is_none());
    }
}
