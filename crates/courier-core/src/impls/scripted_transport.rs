//! ScriptedTransport - 応答を台本で決める Transport
//!
//! # 用途
//! - テスト: 失敗・遅延を注入し、呼び出し区間を記録して相互排他を検証
//! - デモ: サーバーなしで pipeline を一通り動かす
//!
//! 応答は path ごとのキューから先頭を取り出します。キューが空なら
//! fallback（既定はリクエスト body をそのまま返す 200 相当）を使います。

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use crate::domain::{CorrelationId, ResolvedRequest, TransportError};
use crate::ports::Transport;

/// One scripted answer.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub delay: Duration,
    pub outcome: Result<Value, TransportError>,
}

impl ScriptedResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Ok(body),
        }
    }

    pub fn err(error: TransportError) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Err(error),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// What happens when no scripted response is queued for a path.
#[derive(Debug, Clone)]
enum Fallback {
    EchoBody(Duration),
    Fixed(ScriptedResponse),
}

/// One observed network call.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub correlation_id: CorrelationId,
    pub request: ResolvedRequest,
    /// As they would go on the wire.
    pub headers: Vec<(&'static str, String)>,
    pub started_at: Instant,
    pub finished_at: Instant,
}

impl CallRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Do the two calls' in-flight windows overlap?
    pub fn overlaps(&self, other: &CallRecord) -> bool {
        self.started_at < other.finished_at && other.started_at < self.finished_at
    }
}

#[derive(Default)]
struct Script {
    by_path: HashMap<String, VecDeque<ScriptedResponse>>,
    calls: Vec<CallRecord>,
}

pub struct ScriptedTransport {
    script: Mutex<Script>,
    fallback: Fallback,
}

impl ScriptedTransport {
    /// Every call succeeds immediately, echoing the request body (or `{}`).
    pub fn new() -> Self {
        Self::echo_after(Duration::ZERO)
    }

    /// Like `new`, but each call takes `delay`.
    pub fn echo_after(delay: Duration) -> Self {
        Self {
            script: Mutex::new(Script::default()),
            fallback: Fallback::EchoBody(delay),
        }
    }

    /// Unscripted calls all get `response`.
    pub fn always(response: ScriptedResponse) -> Self {
        Self {
            script: Mutex::new(Script::default()),
            fallback: Fallback::Fixed(response),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a response for the next call to `path`.
    pub fn push(&self, path: impl Into<String>, response: ScriptedResponse) -> &Self {
        self.lock()
            .by_path
            .entry(path.into())
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn next_response(&self, request: &ResolvedRequest) -> ScriptedResponse {
        let scripted = self
            .lock()
            .by_path
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front);
        if let Some(response) = scripted {
            return response;
        }
        match &self.fallback {
            Fallback::EchoBody(delay) => ScriptedResponse {
                delay: *delay,
                outcome: Ok(request
                    .body
                    .clone()
                    .unwrap_or_else(|| Value::Object(Default::default()))),
            },
            Fallback::Fixed(response) => response.clone(),
        }
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        request: &ResolvedRequest,
        correlation_id: CorrelationId,
    ) -> Result<Value, TransportError> {
        let response = self.next_response(request);
        let started_at = Instant::now();
        if !response.delay.is_zero() {
            tokio::time::sleep(response.delay).await;
        }
        // Not recorded when the caller drops us mid-flight (timeout / cancel).
        self.lock().calls.push(CallRecord {
            correlation_id,
            request: request.clone(),
            headers: request.headers(correlation_id),
            started_at,
            finished_at: Instant::now(),
        });
        response.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Method;
    use serde_json::json;
    use ulid::Ulid;

    fn request(path: &str, body: Option<Value>) -> ResolvedRequest {
        ResolvedRequest {
            method: Method::Patch,
            path: path.to_string(),
            body,
        }
    }

    #[tokio::test]
    async fn scripted_responses_are_consumed_in_order() {
        let transport = ScriptedTransport::new();
        transport
            .push("/entities/1", ScriptedResponse::err(TransportError::Network("reset".into())))
            .push("/entities/1", ScriptedResponse::ok(json!({"id": 1})));

        let cid = CorrelationId::from_ulid(Ulid::new());
        let req = request("/entities/1", None);
        assert!(transport.execute(&req, cid).await.is_err());
        assert_eq!(transport.execute(&req, cid).await.unwrap(), json!({"id": 1}));
        // script exhausted: falls back to echo
        assert_eq!(transport.execute(&req, cid).await.unwrap(), json!({}));

        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| c.correlation_id == cid));
        let expected = cid.to_string();
        assert!(calls
            .iter()
            .all(|c| c.header("x-correlation-id") == Some(expected.as_str())));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_reflected_in_the_call_window() {
        let transport = ScriptedTransport::echo_after(Duration::from_millis(100));
        let body = json!({"title": "t"});
        let out = transport
            .execute(&request("/x", Some(body.clone())), CorrelationId::from_ulid(Ulid::new()))
            .await
            .unwrap();
        assert_eq!(out, body);

        let call = &transport.calls()[0];
        assert_eq!(call.finished_at - call.started_at, Duration::from_millis(100));
    }

    #[test]
    fn overlap_detection() {
        let t0 = Instant::now();
        let record = |start: u64, end: u64| CallRecord {
            correlation_id: CorrelationId::from_ulid(Ulid::new()),
            request: request("/x", None),
            headers: Vec::new(),
            started_at: t0 + Duration::from_millis(start),
            finished_at: t0 + Duration::from_millis(end),
        };
        assert!(record(0, 10).overlaps(&record(5, 15)));
        assert!(!record(0, 10).overlaps(&record(10, 20)));
    }
}
