//! Scripted transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_core::transport::{HttpRequest, HttpResponse, HttpTransport, ResponseBody, TransportError};

type Scripted = Result<HttpResponse, TransportError>;

/// Replays canned responses and records every request.
///
/// Responses are queued per URL, with `*` as the catch-all queue. With
/// `echo_request_ids` on, a literal `"id":0` in a response body is rewritten
/// to the id of the request it answers.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<HttpRequest>>,
    echo_ids: Mutex<bool>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
        let transport = Self::default();
        transport.routes.lock().insert(
            "*".to_string(),
            responses.into_iter().map(Ok).collect(),
        );
        Arc::new(transport)
    }

    /// Queue responses for one URL.
    pub fn route(&self, url: &str, responses: Vec<Scripted>) {
        self.routes
            .lock()
            .entry(url.to_string())
            .or_default()
            .extend(responses);
    }

    pub fn echo_request_ids(&self) {
        *self.echo_ids.lock() = true;
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests_to(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.url == url).count()
    }
}

fn request_id(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("id").map(|id| id.to_string())
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());

        let next = {
            let mut routes = self.routes.lock();
            let from_url = routes.get_mut(&request.url).and_then(VecDeque::pop_front);
            from_url.or_else(|| routes.get_mut("*").and_then(VecDeque::pop_front))
        };
        let mut response = next
            .unwrap_or_else(|| Err(TransportError::Network("no scripted response".into())))?;

        if *self.echo_ids.lock() {
            if let (Some(id), ResponseBody::Full(body)) = (request_id(&request.body), &mut response.body) {
                *body = body.replace("\"id\":0", &format!("\"id\":{}", id));
            }
        }
        Ok(response)
    }
}
