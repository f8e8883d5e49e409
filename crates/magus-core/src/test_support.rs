//! Shared fixtures for unit tests

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::api::MagusApi;
use crate::error::{Error, Result};
use crate::models::{
    BackendStatus, Decision, DecisionRequest, DecisionResponse, EmailRecord, Page, RouteStats,
    RouteStatsItem, RouteStatsQuery, SenderStats, SenderStatsItem, StatusCounts,
};

/// Minimal record with the fields every test cares about
pub(crate) fn record(id: &str, time: &str, status: &str) -> EmailRecord {
    EmailRecord {
        id: id.to_string(),
        time: time.to_string(),
        updated_at: None,
        email_id: None,
        from: format!("{}@shipper.example", id),
        to: "quotes@magus.example".to_string(),
        subject: Some(format!("Quote request {}", id)),
        body: Some("<p>Please quote 2x40HC Shanghai to Rotterdam</p>".to_string()),
        reply: None,
        trace: None,
        kind: "quote_request".to_string(),
        status: BackendStatus::from(status),
        confidence: None,
        config: None,
        origin_city: None,
        destination_city: None,
        price: None,
        currency: None,
        transport_type: None,
        has_route: None,
    }
}

/// Pair of signals that parks one listing call until released
#[derive(Clone)]
pub(crate) struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// In-memory backend
pub(crate) struct FakeApi {
    records: Vec<EmailRecord>,
    calls: Mutex<Vec<String>>,
    gates: Mutex<VecDeque<Gate>>,
    failure: Mutex<Option<u16>>,
    pub decision_ok: bool,
    pub decision_sent: bool,
}

impl FakeApi {
    pub fn new(records: Vec<EmailRecord>) -> Self {
        Self {
            records,
            calls: Mutex::new(Vec::new()),
            gates: Mutex::new(VecDeque::new()),
            failure: Mutex::new(None),
            decision_ok: true,
            decision_sent: true,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// The next ungated listing call waits on the returned gate.
    /// Gates are handed out to calls in the order they were created.
    pub fn gate_next_call(&self) -> Gate {
        let gate = Gate {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        self.gates.lock().push_back(gate.clone());
        gate
    }

    /// Every call fails with this HTTP status until cleared
    pub fn set_failure(&self, status: Option<u16>) {
        *self.failure.lock() = status;
    }

    fn log(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn check_failure(&self) -> Result<()> {
        match *self.failure.lock() {
            Some(status) => Err(Error::Api {
                status,
                body: "fake failure".to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn wait_at_gate(&self) {
        let gate = self.gates.lock().pop_front();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }

    fn page(items: &[EmailRecord], limit: u32, offset: u32) -> Page<EmailRecord> {
        let start = (offset as usize).min(items.len());
        let end = (start + limit as usize).min(items.len());
        Page {
            items: items[start..end].to_vec(),
            limit,
            offset,
            count: items.len() as u64,
        }
    }
}

#[async_trait]
impl MagusApi for FakeApi {
    async fn list_email_records(&self, limit: u32, offset: u32) -> Result<Page<EmailRecord>> {
        self.log(format!("list:{}:{}", limit, offset));
        self.wait_at_gate().await;
        self.check_failure()?;
        Ok(Self::page(&self.records, limit, offset))
    }

    async fn status_counts(&self) -> Result<StatusCounts> {
        self.log("counts".to_string());
        self.check_failure()?;
        let mut counts = StatusCounts::new();
        for r in &self.records {
            *counts.entry(r.status.to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn list_needs_human_decision(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Page<EmailRecord>> {
        self.log(format!("needs:{}:{}", limit, offset));
        self.wait_at_gate().await;
        self.check_failure()?;
        let pending: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.status == BackendStatus::NeedsHumanDecision)
            .cloned()
            .collect();
        Ok(Self::page(&pending, limit, offset))
    }

    async fn submit_decision(&self, request: &DecisionRequest) -> Result<DecisionResponse> {
        self.log(format!("decision:{}", request.id));
        self.check_failure()?;
        Ok(DecisionResponse {
            ok: self.decision_ok,
            id: request.id.clone(),
            decision: request.decision,
            sent: self.decision_sent,
            quote_text: match request.decision {
                Decision::Accept => request.refined_quote.clone(),
                Decision::Reject => None,
            },
            webhook: None,
        })
    }

    async fn sender_stats(&self) -> Result<SenderStats> {
        self.log("senders".to_string());
        self.check_failure()?;
        let items = vec![
            SenderStatsItem {
                sender: "ops@shipper.example".to_string(),
                count: 7,
            },
            SenderStatsItem {
                sender: "desk@forwarder.example".to_string(),
                count: 3,
            },
        ];
        Ok(SenderStats {
            unique_senders: items.len() as u64,
            scanned: self.records.len() as u64,
            max_rows: 20_000,
            reached_max_rows: false,
            items,
        })
    }

    async fn route_stats(&self, query: &RouteStatsQuery) -> Result<RouteStats> {
        self.log(format!("routes:{}", query.top));
        self.check_failure()?;
        Ok(RouteStats {
            items: vec![RouteStatsItem {
                route: "Shanghai → Rotterdam".to_string(),
                count: 5,
            }],
            unique_routes: 1,
            scanned: self.records.len() as u64,
            max_rows: query.max_rows as u64,
            reached_max_rows: false,
        })
    }
}

/// Serve one canned HTTP response on a random port.
///
/// Returns the API base URL and a handle resolving to the raw request.
pub(crate) async fn serve_once(
    status_line: &'static str,
    content_type: Option<&'static str>,
    body: &'static str,
) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;

        let mut response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            status_line,
            body.len()
        );
        if let Some(ct) = content_type {
            response.push_str(&format!("Content-Type: {}\r\n", ct));
        }
        response.push_str("\r\n");
        response.push_str(body);

        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });

    (format!("http://{}/api/v1", addr), handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
            let content_length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= pos + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
