//! Aggregated per-host outcomes

use std::collections::HashMap;

use serde::Serialize;

use crate::error::ExecError;

/// Flat summary of one host's outcome, ready for rendering
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    /// Host the unit of work ran against
    pub host: String,
    /// Whether the unit of work succeeded
    pub ok: bool,
    /// Captured output (command runs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Error message for failed hosts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Flatten a result map into outcomes sorted by host.
///
/// `payload` extracts the printable output from a success value; uploads
/// have none and return `None`.
pub fn summarize<T, F>(
    results: &HashMap<String, Result<T, ExecError>>,
    payload: F,
) -> Vec<TaskOutcome>
where
    F: Fn(&T) -> Option<String>,
{
    let mut outcomes: Vec<TaskOutcome> = results
        .iter()
        .map(|(host, result)| match result {
            Ok(value) => TaskOutcome {
                host: host.clone(),
                ok: true,
                output: payload(value),
                error: None,
            },
            Err(e) => TaskOutcome {
                host: host.clone(),
                ok: false,
                output: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    outcomes.sort_by(|a, b| a.host.cmp(&b.host));
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_sorts_and_splits() {
        let mut results: HashMap<String, Result<String, ExecError>> = HashMap::new();
        results.insert("beta".to_string(), Ok("out\n".to_string()));
        results.insert(
            "alpha".to_string(),
            Err(ExecError::ConnectionFailed("refused".to_string())),
        );

        let outcomes = summarize(&results, |out| Some(out.clone()));

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].host, "alpha");
        assert!(!outcomes[0].ok);
        assert!(outcomes[0].error.as_deref().unwrap().contains("refused"));
        assert_eq!(outcomes[1].host, "beta");
        assert!(outcomes[1].ok);
        assert_eq!(outcomes[1].output.as_deref(), Some("out\n"));
    }

    #[test]
    fn outcome_json_omits_empty_fields() {
        let outcome = TaskOutcome {
            host: "h1".to_string(),
            ok: true,
            output: None,
            error: None,
        };

        let json = serde_json::to_string(&outcome).unwrap();
        assert_eq!(json, r#"{"host":"h1","ok":true}"#);
    }
}
