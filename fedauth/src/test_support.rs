use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use fedauth_clock::{TestClock, UnixTime};
use http::StatusCode;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::{
    params::decode_query_string,
    transport::{RequestBody, Transport, TransportError, TransportRequest, TransportResponse},
    Client,
};

pub const NOW: UnixTime = UnixTime(1_700_000_000_000);

#[derive(Clone, Debug)]
enum Reply {
    Json(StatusCode, Value),
    Fail(String),
}

#[derive(Debug)]
struct Route {
    url_part: String,
    replies: VecDeque<Reply>,
}

#[derive(Debug, Default)]
struct Script {
    routes: Vec<Route>,
    requests: Vec<TransportRequest>,
    held: bool,
}

/// A transport answering from a script of canned replies
///
/// Replies are matched by the longest URL fragment contained in the request
/// URL. Queued replies are consumed in order and the last one repeats.
/// While held, replies are withheld until [`MockTransport::release`].
#[derive(Clone, Debug)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
    gate: Arc<Semaphore>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            script: Arc::default(),
            gate: Arc::new(Semaphore::new(0)),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Withholds every reply until released
    pub fn hold(&self) -> &Self {
        self.script.lock().held = true;
        self
    }

    pub fn release(&self) {
        self.script.lock().held = false;
        self.gate.add_permits(1024);
    }

    fn push(&self, url_part: &str, reply: Reply) -> &Self {
        let mut script = self.script.lock();
        match script.routes.iter_mut().find(|r| r.url_part == url_part) {
            Some(route) => route.replies.push_back(reply),
            None => script.routes.push(Route {
                url_part: url_part.to_owned(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    pub fn on(&self, url_part: &str, body: Value) -> &Self {
        self.push(url_part, Reply::Json(StatusCode::OK, body))
    }

    pub fn on_status(&self, url_part: &str, status: StatusCode) -> &Self {
        self.push(url_part, Reply::Json(status, Value::Null))
    }

    pub fn fail(&self, url_part: &str, message: &str) -> &Self {
        self.push(url_part, Reply::Fail(message.to_owned()))
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.script.lock().requests.clone()
    }

    pub fn count(&self, url_part: &str) -> usize {
        self.script
            .lock()
            .requests
            .iter()
            .filter(|r| r.url.contains(url_part))
            .count()
    }

    pub fn last(&self, url_part: &str) -> Option<TransportRequest> {
        self.script
            .lock()
            .requests
            .iter()
            .rev()
            .find(|r| r.url.contains(url_part))
            .cloned()
    }

    fn reply_for(&self, request: TransportRequest) -> Option<Reply> {
        let mut script = self.script.lock();
        let url = request.url.clone();
        script.requests.push(request);
        let route = script
            .routes
            .iter_mut()
            .filter(|r| url.contains(&r.url_part))
            .max_by_key(|r| r.url_part.len())?;
        if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = request.url.clone();
        let reply = self.reply_for(request);
        tokio::task::yield_now().await;
        if self.script.lock().held {
            let _permit = self.gate.acquire().await;
        }
        match reply {
            Some(Reply::Json(status, body)) => Ok(TransportResponse::new(status, body.to_string())),
            Some(Reply::Fail(message)) => Err(message.into()),
            None => Err(format!("no scripted reply for {}", url).into()),
        }
    }
}

/// The parameters sent with a request, from its query string or form body
pub fn sent_params(request: &TransportRequest) -> BTreeMap<String, String> {
    let mut params = request
        .url
        .split_once('?')
        .map(|(_, q)| decode_query_string(q))
        .unwrap_or_default();
    if let Some(RequestBody::Form(body)) = &request.body {
        params.extend(decode_query_string(body));
    }
    params
}

pub fn client(transport: &MockTransport) -> (Client, TestClock) {
    let clock = TestClock::new(NOW);
    let client = Client::new(transport.clone()).with_clock(clock.clone());
    (client, clock)
}
