//! Inference capability client
//!
//! Defines the client trait and request type for the schema-constrained
//! inference capability. Two implementations:
//! - `CommandClient`: spawns a configured program, JSON request on stdin,
//!   JSON inventory on stdout (production)
//! - `MockClient`: returns preconfigured inventories (testing)
//!
//! The capability is a black box: a call either yields an `Inventory`
//! that conforms to the schema, or an error.

use super::schema::Inventory;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// One inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub category: String,
    /// Raw record contents, markup samples first
    pub samples: Vec<String>,
    /// Category-specific "what to look for" prompt
    pub instruction: String,
    /// JSON Schema the response must validate against
    pub schema: serde_json::Value,
}

/// Errors from the inference capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceError {
    #[error("inference capability not available: {0}")]
    Unavailable(String),
    #[error("inference timed out after {0}s")]
    Timeout(u64),
    #[error("quota or rate limit exceeded: {0}")]
    Quota(String),
    #[error("invocation failed: {0}")]
    InvocationFailed(String),
    #[error("response does not conform to schema: {0}")]
    NonConforming(String),
    #[error("artifact cache error: {0}")]
    Cache(String),
}

/// Client trait for the inference capability.
///
/// Abstracts over transport (subprocess, HTTP, mock) so the inference
/// engine doesn't depend on how the capability is reached.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Check if the capability is reachable.
    async fn is_available(&self) -> bool;

    /// Run one schema-constrained inference.
    async fn infer(&self, request: &InferenceRequest) -> Result<Inventory, InferenceError>;
}

// ---------------------------------------------------------------------------
// Command client
// ---------------------------------------------------------------------------

/// Runs an external program per request.
///
/// The request is written to stdin as JSON; stdout must be exactly one
/// `Inventory` JSON document. The process is killed when the timeout
/// elapses.
pub struct CommandClient {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandClient {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Build from a `[program, args...]` list.
    pub fn from_command_line(command: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec(), timeout))
    }

    fn classify_failure(status: std::process::ExitStatus, stderr: &[u8]) -> InferenceError {
        let message = String::from_utf8_lossy(stderr);
        let message = message.trim();
        let excerpt: String = message.chars().take(200).collect();
        let lower = message.to_lowercase();

        if lower.contains("quota") || lower.contains("rate limit") {
            InferenceError::Quota(excerpt)
        } else {
            InferenceError::InvocationFailed(format!("exit status {}: {}", status, excerpt))
        }
    }
}

#[async_trait]
impl InferenceClient for CommandClient {
    async fn is_available(&self) -> bool {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return program.is_file();
        }
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
            .unwrap_or(false)
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<Inventory, InferenceError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| InferenceError::InvocationFailed(format!("cannot encode request: {}", e)))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InferenceError::Unavailable(format!("{}: {}", self.program, e)))?;

        // The writer runs beside the timed wait: a program that never reads
        // stdin must not block past the timeout on a full pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                // Dropping stdin afterwards closes the pipe so the program sees EOF
                stdin.write_all(&payload).await
            })
        });

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| InferenceError::InvocationFailed(e.to_string()))?,
            Err(_) => {
                if let Some(writer) = &writer {
                    writer.abort();
                }
                return Err(InferenceError::Timeout(self.timeout.as_secs()));
            }
        };

        if !output.status.success() {
            return Err(Self::classify_failure(output.status, &output.stderr));
        }

        // A program may answer without consuming all of stdin; only other
        // write failures matter.
        if let Some(writer) = writer {
            match writer.await {
                Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    return Err(InferenceError::InvocationFailed(format!("writing request: {}", e)));
                }
                Err(e) => {
                    return Err(InferenceError::InvocationFailed(format!("writing request: {}", e)));
                }
                _ => {}
            }
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| InferenceError::NonConforming(format!("response is not UTF-8: {}", e)))?;
        Inventory::from_response(&stdout)
    }
}

// ---------------------------------------------------------------------------
// Mock client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum MockReply {
    Inventory(Inventory),
    Raw(String),
    Failure(InferenceError),
}

/// Mock client for testing: returns preconfigured inventories.
///
/// Records every request and counts calls so tests can assert on what
/// was sent and on cache short-circuits.
pub struct MockClient {
    available: bool,
    replies: HashMap<String, MockReply>,
    latency: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl MockClient {
    /// Create a mock client that reports as available.
    pub fn available() -> Self {
        Self {
            available: true,
            replies: HashMap::new(),
            latency: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock client that reports as unavailable.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    /// Register an inventory for a category.
    pub fn with_inventory(mut self, category: impl Into<String>, inventory: Inventory) -> Self {
        self.replies
            .insert(category.into(), MockReply::Inventory(inventory));
        self
    }

    /// Register a raw response text, parsed as a real response would be.
    pub fn with_raw_response(mut self, category: impl Into<String>, text: impl Into<String>) -> Self {
        self.replies.insert(category.into(), MockReply::Raw(text.into()));
        self
    }

    /// Register a failure for a category.
    pub fn with_failure(mut self, category: impl Into<String>, error: InferenceError) -> Self {
        self.replies.insert(category.into(), MockReply::Failure(error));
        self
    }

    /// Delay every call, to exercise concurrency bounds.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `infer` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Requests received, in call order.
    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl InferenceClient for MockClient {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<Inventory, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if !self.available {
            return Err(InferenceError::Unavailable(
                "mock client configured as unavailable".to_string(),
            ));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.replies.get(&request.category) {
            Some(MockReply::Inventory(inventory)) => Ok(inventory.clone()),
            Some(MockReply::Raw(text)) => Inventory::from_response(text),
            Some(MockReply::Failure(error)) => Err(error.clone()),
            None => Err(InferenceError::InvocationFailed(format!(
                "no mock response for category '{}'",
                request.category
            ))),
        }
    }
}
