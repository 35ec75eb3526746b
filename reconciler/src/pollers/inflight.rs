//! OCM4001 inflight-check expansion (`SPEC_FULL.md` §4.6, boundary B2).

use crate::downstream::InflightCheck;
use reconciler_types::{InflightCheckState, OperationError, OperationErrorDetail};

/// Expands the list of inflight checks for an `OCM4001` cluster error into
/// an `OperationError` body. Zero failures is treated as anomalous (B2):
/// `OCM4001` with no failed checks should not occur, so it is logged at warn
/// in addition to the generic body it produces.
pub fn expand(checks: &[InflightCheck]) -> OperationError {
    let failed: Vec<&InflightCheck> = checks
        .iter()
        .filter(|c| c.state == InflightCheckState::Failed)
        .collect();

    match failed.as_slice() {
        [] => {
            tracing::warn!("OCM4001 reported with zero failed inflight checks; returning generic error");
            OperationError::internal("cluster provisioning failed an inflight check")
        }
        [single] => OperationError {
            code: "InflightCheckFailed".to_string(),
            message: single
                .error
                .clone()
                .unwrap_or_else(|| format!("inflight check {} failed", single.name)),
            details: Vec::new(),
        },
        many => OperationError {
            code: "MultipleErrorsOccurred".to_string(),
            message: "multiple inflight checks failed".to_string(),
            details: many
                .iter()
                .map(|c| OperationErrorDetail {
                    code: c.name.clone(),
                    message: c.error.clone().unwrap_or_else(|| "inflight check failed".to_string()),
                })
                .collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, state: InflightCheckState, error: Option<&str>) -> InflightCheck {
        InflightCheck {
            name: name.to_string(),
            state,
            error: error.map(String::from),
        }
    }

    #[test]
    fn zero_failures_returns_generic_error() {
        let checks = vec![check("subnet", InflightCheckState::Passed, None)];
        let error = expand(&checks);
        assert_eq!(error.code, "InternalServerError");
    }

    #[test]
    fn single_failure_extracts_detail_message() {
        let checks = vec![
            check("subnet", InflightCheckState::Failed, Some("subnet missing")),
            check("nsg", InflightCheckState::Passed, None),
        ];
        let error = expand(&checks);
        assert_eq!(error.code, "InflightCheckFailed");
        assert_eq!(error.message, "subnet missing");
    }

    #[test]
    fn two_failures_produce_multiple_errors_occurred() {
        let checks = vec![
            check("subnet", InflightCheckState::Failed, Some("subnet missing")),
            check("nsg", InflightCheckState::Failed, Some("nsg missing")),
        ];
        let error = expand(&checks);
        assert_eq!(error.code, "MultipleErrorsOccurred");
        assert_eq!(error.details.len(), 2);
        assert_eq!(error.details[0].message, "subnet missing");
        assert_eq!(error.details[1].message, "nsg missing");
    }
}
