//! In-memory HTTP client for testing the sidecar probe.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::collector::traits::HttpClient;

#[derive(Debug, Default)]
struct Endpoint {
    /// One-shot outcomes consumed before `steady`.
    queued: VecDeque<Result<String, String>>,
    steady: Option<Result<String, String>>,
}

/// HTTP client answering from scripted per-URL outcomes.
///
/// Unknown URLs fail with "connection refused".
#[derive(Debug, Clone, Default)]
pub struct MockHttp {
    endpoints: Arc<Mutex<HashMap<String, Endpoint>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every GET of `url` returns `body`.
    pub fn respond(&self, url: impl Into<String>, body: impl Into<String>) {
        self.endpoint(url.into(), |e| e.steady = Some(Ok(body.into())));
    }

    /// Every GET of `url` fails.
    pub fn fail(&self, url: impl Into<String>, message: impl Into<String>) {
        self.endpoint(url.into(), |e| e.steady = Some(Err(message.into())));
    }

    /// Queues one-shot outcomes for `url`, returned before the steady one.
    pub fn script(&self, url: impl Into<String>, outcomes: Vec<Result<String, String>>) {
        self.endpoint(url.into(), |e| e.queued.extend(outcomes));
    }

    /// URLs requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of requests made to `url`.
    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|u| *u == url).count()
    }

    fn endpoint(&self, url: String, f: impl FnOnce(&mut Endpoint)) {
        let mut endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        f(endpoints.entry(url).or_default());
    }
}

impl HttpClient for MockHttp {
    fn get(&self, url: &str) -> Result<String, String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());

        let mut endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        let Some(endpoint) = endpoints.get_mut(url) else {
            return Err("connection refused".to_string());
        };
        if let Some(outcome) = endpoint.queued.pop_front() {
            return outcome;
        }
        endpoint
            .steady
            .clone()
            .unwrap_or_else(|| Err("connection refused".to_string()))
    }
}
