use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::sync::{Arc, Mutex};

use crate::errors::{StreamError, StreamResult};
use crate::request::StreamRequest;
use crate::transport::{StreamResponse, Transport};

/// One scripted answer to `Transport::open`
pub enum MockReply {
    /// 200 with the given body reads, then end of stream
    Body(Vec<StreamResult<Bytes>>),
    /// 200 with the given body reads, then no further data
    Stalled(Vec<StreamResult<Bytes>>),
    Status(u16),
    Fail(StreamError),
}

impl MockReply {
    /// A body with one read per event-stream line
    pub fn lines(lines: &[&str]) -> Self {
        MockReply::Body(to_reads(lines))
    }

    /// A body that delivers `lines` and then breaks with `error`
    pub fn lines_then(lines: &[&str], error: StreamError) -> Self {
        let mut reads = to_reads(lines);
        reads.push(Err(error));
        MockReply::Body(reads)
    }
}

fn to_reads(lines: &[&str]) -> Vec<StreamResult<Bytes>> {
    lines
        .iter()
        .map(|line| Ok(Bytes::from(format!("{}\n", line))))
        .collect()
}

/// A transport that plays back pre-configured replies in order
#[derive(Clone)]
pub struct MockTransport {
    replies: Arc<Mutex<Vec<MockReply>>>,
    requests: Arc<Mutex<Vec<StreamRequest>>>,
}

impl MockTransport {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn attempts(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, request: &StreamRequest) -> StreamResult<StreamResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(StreamError::InvalidRequest("no scripted reply left".into()));
            }
            replies.remove(0)
        };

        let (status, body) = match reply {
            MockReply::Body(reads) => (200, stream::iter(reads).boxed()),
            MockReply::Stalled(reads) => (200, stream::iter(reads).chain(stream::pending()).boxed()),
            MockReply::Status(status) => (status, stream::empty().boxed()),
            MockReply::Fail(error) => return Err(error),
        };

        Ok(StreamResponse {
            status,
            content_type: Some("text/event-stream".into()),
            www_authenticate: None,
            body,
        })
    }
}
