//! Scripted in-memory API server for unit tests

use crate::client::{ApiResponse, KubeApi};
use crate::error::{LoadTestError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One request seen by [`ScriptedApi`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

/// Replays scripted responses per (method, path)
///
/// The last scripted reply for a route repeats forever. Routes without a
/// script answer 404. A `None` reply simulates a connection failure.
#[derive(Default)]
pub struct ScriptedApi {
    routes: Mutex<HashMap<(&'static str, String), VecDeque<Option<ApiResponse>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, method: &'static str, path: &str, replies: Vec<Option<ApiResponse>>) {
        self.routes
            .lock()
            .unwrap()
            .insert((method, path.to_string()), replies.into());
    }

    pub fn script_get(&self, path: &str, replies: Vec<ApiResponse>) {
        self.script("GET", path, replies.into_iter().map(Some).collect());
    }

    pub fn script_post(&self, path: &str, replies: Vec<ApiResponse>) {
        self.script("POST", path, replies.into_iter().map(Some).collect());
    }

    pub fn script_delete(&self, path: &str, replies: Vec<ApiResponse>) {
        self.script("DELETE", path, replies.into_iter().map(Some).collect());
    }

    /// Make every request on a route fail at the transport level
    pub fn fail(&self, method: &'static str, path: &str) {
        self.script(method, path, vec![None]);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    pub fn count_method(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    fn reply(
        &self,
        method: &'static str,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });

        let mut routes = self.routes.lock().unwrap();
        let reply = match routes.get_mut(&(method, path.to_string())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().flatten(),
            Some(queue) => queue.front().cloned().flatten(),
            None => Some(ApiResponse::new(404, "")),
        };

        reply.ok_or_else(|| LoadTestError::Parse(format!("connection refused: {} {}", method, path)))
    }
}

#[async_trait]
impl KubeApi for ScriptedApi {
    async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.reply("GET", path, None)
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<ApiResponse> {
        self.reply("POST", path, Some(body))
    }

    async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.reply("DELETE", path, None)
    }
}
