//! Risk classification service
//!
//! The classifier receives a batch of tax identifiers and answers with a
//! per-identifier risk assessment. The service itself is opaque; the only
//! concrete implementation here runs an external command that reads the
//! batch as JSON on stdin and writes its verdict as JSON on stdout.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::collaborators::CollaboratorError;
use crate::core::RiskLevel;

/// Identifiers sent per classification request
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// How long an external classifier may run before it is killed
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSummary {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedIdentifier {
    #[serde(alias = "rfc")]
    pub identifier: String,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub recommendation: String,
}

/// Verdict returned by the service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskClassification {
    #[serde(alias = "total_rfcs_analyzed")]
    pub total_analyzed: usize,
    pub risk_summary: RiskSummary,
    #[serde(alias = "flagged_rfcs")]
    pub flagged: Vec<FlaggedIdentifier>,
    pub general_observations: String,
    pub compliance_score: Option<f64>,
}

/// Outcome of the classification step as it appears in the report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassificationSection {
    Available(RiskClassification),
    Unavailable { reason: String },
    Skipped { reason: String },
}

pub trait RiskClassifier: Send + Sync {
    fn classify(&self, identifiers: &[String]) -> Result<RiskClassification, CollaboratorError>;

    fn name(&self) -> &str;
}

/// Parse a service answer, tolerating a Markdown code fence around the JSON
pub fn parse_classification_response(text: &str) -> Result<RiskClassification, CollaboratorError> {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }

    let body = body.trim();
    if body.is_empty() {
        return Err(CollaboratorError::InvalidResponse("empty response".to_string()));
    }
    Ok(serde_json::from_str(body)?)
}

/// Classifier backed by an external program
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandClassifier {
    pub fn new<S: Into<String>>(program: S, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Kill the command and report the service unavailable after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from a whitespace-separated command line
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

impl RiskClassifier for CommandClassifier {
    fn classify(&self, identifiers: &[String]) -> Result<RiskClassification, CollaboratorError> {
        let payload = serde_json::to_vec(identifiers)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CollaboratorError::Unavailable(format!("{}: {}", self.program, e)))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&payload) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        }

        // None when the timeout is too large to represent: wait indefinitely
        let deadline = Instant::now().checked_add(self.timeout);
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CollaboratorError::Unavailable(format!(
                    "{} timed out after {:?}",
                    self.program, self.timeout
                )));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout.join().unwrap_or_default();
        if !status.success() {
            let stderr = stderr.join().unwrap_or_default();
            return Err(CollaboratorError::Unavailable(format!(
                "{} exited with {}: {}",
                self.program,
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        parse_classification_response(&String::from_utf8_lossy(&stdout))
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Read a child pipe to the end on its own thread
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        buffer
    })
}

/// Run the classifier over the first `batch_size` identifiers
///
/// Any collaborator failure is logged and reported as `Unavailable`; the
/// rest of the analysis is unaffected.
pub fn classify_identifiers(
    classifier: Option<&dyn RiskClassifier>,
    identifiers: &[String],
    batch_size: usize,
) -> ClassificationSection {
    let Some(classifier) = classifier else {
        return ClassificationSection::Skipped {
            reason: "no classifier configured".to_string(),
        };
    };
    if identifiers.is_empty() {
        return ClassificationSection::Skipped {
            reason: "no identifiers extracted".to_string(),
        };
    }

    let batch = &identifiers[..identifiers.len().min(batch_size)];
    debug!("Sending {} identifiers to {}", batch.len(), classifier.name());

    match classifier.classify(batch) {
        Ok(classification) => ClassificationSection::Available(classification),
        Err(e) => {
            warn!("Risk classification via {} failed: {}", classifier.name(), e);
            ClassificationSection::Unavailable {
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MockClassifier {
        response: Result<RiskClassification, String>,
        seen: Mutex<Vec<usize>>,
    }

    impl RiskClassifier for MockClassifier {
        fn classify(&self, identifiers: &[String]) -> Result<RiskClassification, CollaboratorError> {
            self.seen.lock().unwrap().push(identifiers.len());
            self.response
                .clone()
                .map_err(CollaboratorError::Unavailable)
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("AAA0101{:02}XX{}", i % 28 + 1, i % 10)).collect()
    }

    #[test]
    fn test_parse_fenced_response() {
        let text = "```json\n{\"total_rfcs_analyzed\": 2, \"risk_summary\": {\"low\": 1, \"critical\": 1},\n\
                    \"flagged_rfcs\": [{\"rfc\": \"TEJ2304191I0\", \"risk_level\": \"CRÍTICO\", \"reason\": \"recent\"}]}\n```";
        let parsed = parse_classification_response(text).unwrap();
        assert_eq!(parsed.total_analyzed, 2);
        assert_eq!(parsed.risk_summary.critical, 1);
        assert_eq!(parsed.flagged[0].identifier, "TEJ2304191I0");
        assert_eq!(parsed.flagged[0].risk_level, RiskLevel::Critical);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_classification_response("sorry, I cannot help"),
            Err(CollaboratorError::InvalidResponse(_))
        ));
        assert!(parse_classification_response("```\n```").is_err());
    }

    #[test]
    fn test_batch_is_capped() {
        let mock = MockClassifier {
            response: Ok(RiskClassification::default()),
            seen: Mutex::new(Vec::new()),
        };
        let section = classify_identifiers(Some(&mock as &dyn RiskClassifier), &ids(80), DEFAULT_BATCH_SIZE);
        assert!(matches!(section, ClassificationSection::Available(_)));
        assert_eq!(*mock.seen.lock().unwrap(), vec![50]);
    }

    #[test]
    fn test_failure_degrades_to_unavailable() {
        let mock = MockClassifier {
            response: Err("timeout".to_string()),
            seen: Mutex::new(Vec::new()),
        };
        let section = classify_identifiers(Some(&mock as &dyn RiskClassifier), &ids(3), DEFAULT_BATCH_SIZE);
        match section {
            ClassificationSection::Unavailable { reason } => assert!(reason.contains("timeout")),
            other => panic!("unexpected section {:?}", other),
        }
    }

    #[test]
    fn test_skipped_without_classifier_or_identifiers() {
        assert!(matches!(
            classify_identifiers(None, &ids(3), DEFAULT_BATCH_SIZE),
            ClassificationSection::Skipped { .. }
        ));
        let mock = MockClassifier {
            response: Ok(RiskClassification::default()),
            seen: Mutex::new(Vec::new()),
        };
        assert!(matches!(
            classify_identifiers(Some(&mock as &dyn RiskClassifier), &[], DEFAULT_BATCH_SIZE),
            ClassificationSection::Skipped { .. }
        ));
        assert!(mock.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_command_is_unavailable() {
        let classifier = CommandClassifier::new("/no/such/classifier-binary", vec![]);
        let result = classifier.classify(&ids(1));
        assert!(matches!(result, Err(CollaboratorError::Unavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_classifier_reads_stdout() {
        let script = r#"cat > /dev/null; echo '{"total_analyzed": 1, "flagged": []}'"#;
        let classifier = CommandClassifier::new("sh", vec!["-c".to_string(), script.to_string()]);
        let result = classifier.classify(&ids(1)).unwrap();
        assert_eq!(result.total_analyzed, 1);
        assert!(result.flagged.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_command_times_out() {
        let classifier = CommandClassifier::new("sh", vec!["-c".to_string(), "exec sleep 5".to_string()])
            .with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        match classifier.classify(&ids(1)) {
            Err(CollaboratorError::Unavailable(reason)) => assert!(reason.contains("timed out")),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_from_command_line() {
        let classifier = CommandClassifier::from_command_line("python3 classify.py --fast").unwrap();
        assert_eq!(classifier.name(), "python3");
        assert_eq!(classifier.args, vec!["classify.py", "--fast"]);
        assert!(CommandClassifier::from_command_line("   ").is_none());
    }
}
