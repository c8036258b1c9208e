//! Mock transport for testing
//!
//! Scriptable byte transport used by unit and integration tests to exercise
//! protocol logic without hardware. Tests hold a [`MockTransportHandle`]
//! that shares state with the transport handed to the protocol under test:
//! queue inbound bytes, inspect sent frames, or install a responder closure
//! that answers each sent frame like a node would.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use super::traits::{BusTransport, TransportError, TransportStats};

type Responder = Box<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

struct MockState {
    connected: bool,
    receive_queue: VecDeque<u8>,
    sent_frames: Vec<Vec<u8>>,
    responder: Option<Responder>,
    fail_send: bool,
    fail_connect: bool,
    stats: TransportStats,
}

/// Shared handle for scripting a [`MockBusTransport`] from a test
#[derive(Clone)]
pub struct MockTransportHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransportHandle {
    /// Queue raw bytes for the transport to receive
    pub fn push_rx(&self, data: &[u8]) {
        let mut state = self.state.lock();
        state.receive_queue.extend(data.iter().copied());
    }

    /// All frames sent through the transport so far
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent_frames.clone()
    }

    /// Clear the sent-frame history
    pub fn clear_sent(&self) {
        self.state.lock().sent_frames.clear();
    }

    /// Install a responder answering each sent frame with optional RX bytes
    pub fn set_responder(&self, responder: impl Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static) {
        self.state.lock().responder = Some(Box::new(responder));
    }

    /// Make subsequent send calls fail
    pub fn set_send_failure(&self, fail: bool) {
        self.state.lock().fail_send = fail;
    }

    /// Make subsequent connect calls fail
    pub fn set_connect_failure(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    /// Number of bytes still queued for reception
    pub fn pending_rx(&self) -> usize {
        self.state.lock().receive_queue.len()
    }
}

/// Mock transport implementation
pub struct MockBusTransport {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockBusTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBusTransport")
            .field("name", &self.name)
            .finish()
    }
}

impl MockBusTransport {
    /// Create a mock transport and its scripting handle
    pub fn new(name: &str) -> (Self, MockTransportHandle) {
        let state = Arc::new(Mutex::new(MockState {
            connected: false,
            receive_queue: VecDeque::new(),
            sent_frames: Vec::new(),
            responder: None,
            fail_send: false,
            fail_connect: false,
            stats: TransportStats::new(),
        }));
        let handle = MockTransportHandle {
            state: Arc::clone(&state),
        };
        (
            Self {
                name: name.to_string(),
                state,
            },
            handle,
        )
    }
}

#[async_trait]
impl BusTransport for MockBusTransport {
    fn transport_type(&self) -> &str {
        "mock"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.fail_connect {
            state.stats.failed_connections += 1;
            return Err(TransportError::ConnectionFailed(
                "mock connect failure".to_string(),
            ));
        }
        state.connected = true;
        state.stats.successful_connections += 1;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.connected {
            state.connected = false;
            state.stats.disconnections += 1;
        }
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.fail_send {
            return Err(TransportError::SendFailed("mock send failure".to_string()));
        }
        state.sent_frames.push(data.to_vec());
        state.stats.record_bytes_sent(data.len());
        trace!("[{}] mock TX {} bytes", self.name, data.len());

        if let Some(responder) = state.responder.take() {
            if let Some(reply) = responder(data) {
                state.receive_queue.extend(reply.iter().copied());
            }
            state.responder = Some(responder);
        }
        Ok(data.len())
    }

    async fn receive(
        &mut self,
        buffer: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        let mut n = 0;
        while n < buffer.len() {
            match state.receive_queue.pop_front() {
                Some(b) => {
                    buffer[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        if n > 0 {
            state.stats.record_bytes_received(n);
        }
        Ok(n)
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn stats(&self) -> TransportStats {
        self.state.lock().stats.clone()
    }
}
