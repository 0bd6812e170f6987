use crate::error::StreamError;
use crate::garage_api::backoff::{Backoff, ReconnectPolicy};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

const STREAM_BUFFER: usize = 64;

#[derive(Debug)]
pub enum StreamEvent {
    /// A (re)connection succeeded. Informational only.
    Connected,
    Message(String),
    Error(StreamError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental `text/event-stream` decoder.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    data: Vec<String>,
    event: String,
    last_event_id: Option<String>,
    retry: Option<Duration>,
}

impl SseParser {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw[..end]);
            let line = line.strip_suffix('\r').unwrap_or(line.as_ref());
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    pub fn take_retry(&mut self) -> Option<Duration> {
        self.retry.take()
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            let event = std::mem::take(&mut self.event);
            if self.data.is_empty() {
                return None;
            }
            let data = std::mem::take(&mut self.data).join("\n");
            return Some(SseEvent {
                event,
                data,
                id: self.last_event_id.clone(),
            });
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = value.to_string(),
            "id" => self.last_event_id = Some(value.to_string()),
            "retry" => match value.parse::<u64>() {
                Ok(ms) => self.retry = Some(Duration::from_millis(ms)),
                Err(_) => trace!("ignoring invalid retry value {:?}", value),
            },
            _ => trace!("ignoring unknown field {:?}", field),
        }
        None
    }
}

/// Handle to a push-channel subscription. Dropping it tears the connection
/// down; reconnecting is handled inside and cannot be driven from outside.
pub struct EventStream {
    rx: mpsc::Receiver<StreamEvent>,
    task: Option<JoinHandle<()>>,
}

impl EventStream {
    pub fn open(client: reqwest::Client, url: String, policy: ReconnectPolicy) -> Self {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let task = tokio::spawn(run_stream(client, url, policy, tx));
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Wrap an already running source of events.
    #[cfg(test)]
    pub fn from_channel(rx: mpsc::Receiver<StreamEvent>) -> Self {
        Self { rx, task: None }
    }

    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_stream(
    client: reqwest::Client,
    url: String,
    policy: ReconnectPolicy,
    tx: mpsc::Sender<StreamEvent>,
) {
    let mut backoff = Backoff::new(policy);
    let mut last_event_id: Option<String> = None;
    loop {
        match read_stream(&client, &url, &mut backoff, &mut last_event_id, &tx).await {
            Ok(()) => {
                debug!("Stream receiver dropped, stopping {}", url);
                return;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!("Stream {} failed: {}. Reconnecting in {:?}", url, e, delay);
                if tx.send(StreamEvent::Error(e)).await.is_err() {
                    return;
                }
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Reads one connection until it ends. `Ok(())` means nobody is listening
/// any more; every `Err` is a reason to reconnect.
async fn read_stream(
    client: &reqwest::Client,
    url: &str,
    backoff: &mut Backoff,
    last_event_id: &mut Option<String>,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<(), StreamError> {
    let mut request = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache");
    if let Some(id) = last_event_id.as_deref() {
        request = request.header("Last-Event-ID", id);
    }
    let response = request.send().await.map_err(StreamError::Connect)?;
    if !response.status().is_success() {
        return Err(StreamError::Status(response.status()));
    }

    info!("Connected to {}", url);
    backoff.reset();
    if tx.send(StreamEvent::Connected).await.is_err() {
        return Ok(());
    }

    let mut parser = SseParser::default();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(StreamError::Read)?;
        for event in parser.feed(&chunk) {
            if !event.event.is_empty() && event.event != "message" {
                trace!("skipping {:?} event", event.event);
                continue;
            }
            if tx.send(StreamEvent::Message(event.data)).await.is_err() {
                return Ok(());
            }
        }
        if let Some(retry) = parser.take_retry() {
            debug!("Server asked for a {:?} reconnect delay", retry);
            backoff.set_initial(retry);
        }
        if let Some(id) = parser.last_event_id() {
            *last_event_id = Some(id.to_string());
        }
    }
    Err(StreamError::Closed)
}
