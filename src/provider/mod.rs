//! External DSP provider
//!
//! Heavier whole-buffer transforms (loudness normalization, phase fixing,
//! clipping repair, denoise, mono bass) sit behind the [`DspProvider`] trait.
//! [`ProviderClient`] runs a provider on its own thread: each request travels
//! in an envelope with a UUID, responses are matched back by that id, and the
//! caller holds a [`PendingResult`] it can poll or wait on.
//!
//! Provider failures never touch rack or chain state.

pub mod builtin;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::engine::buffer::AudioBuffer;
use crate::error::{RackError, Result};

pub use builtin::BuiltinProvider;

/// Loudness target used when a caller does not name one
pub const DEFAULT_TARGET_LUFS: f32 = -14.0;

/// Mono-bass crossover used when a caller does not name one
pub const DEFAULT_MONO_BASS_HZ: f32 = 120.0;

/// How often a blocked [`PendingResult::wait`] rechecks the inbox
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Batch transforms over a whole buffer
///
/// Buffers move in and a new buffer comes out; an `Err` leaves the caller's
/// state as it was.
pub trait DspProvider: Send {
    fn name(&self) -> &str;

    fn normalize_loudness(&mut self, buffer: AudioBuffer, target_lufs: f32) -> Result<AudioBuffer>;

    fn fix_phase(&mut self, buffer: AudioBuffer) -> Result<AudioBuffer>;

    fn repair_clipping(&mut self, buffer: AudioBuffer) -> Result<AudioBuffer>;

    fn denoise(&mut self, buffer: AudioBuffer) -> Result<AudioBuffer>;

    fn mono_bass(&mut self, buffer: AudioBuffer, cutoff_hz: f32) -> Result<AudioBuffer>;

    /// Dispatch a typed request
    fn handle(&mut self, request: ProviderRequest, buffer: AudioBuffer) -> Result<AudioBuffer> {
        match request {
            ProviderRequest::NormalizeLoudness { target_lufs } => {
                self.normalize_loudness(buffer, target_lufs)
            }
            ProviderRequest::FixPhase => self.fix_phase(buffer),
            ProviderRequest::RepairClipping => self.repair_clipping(buffer),
            ProviderRequest::Denoise => self.denoise(buffer),
            ProviderRequest::MonoBass { cutoff_hz } => self.mono_bass(buffer, cutoff_hz),
        }
    }
}

/// One provider operation and its arguments
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderRequest {
    NormalizeLoudness { target_lufs: f32 },
    FixPhase,
    RepairClipping,
    Denoise,
    MonoBass { cutoff_hz: f32 },
}

impl ProviderRequest {
    pub fn normalize() -> Self {
        ProviderRequest::NormalizeLoudness {
            target_lufs: DEFAULT_TARGET_LUFS,
        }
    }

    pub fn mono_bass() -> Self {
        ProviderRequest::MonoBass {
            cutoff_hz: DEFAULT_MONO_BASS_HZ,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderRequest::NormalizeLoudness { .. } => "normalize-loudness",
            ProviderRequest::FixPhase => "fix-phase",
            ProviderRequest::RepairClipping => "repair-clipping",
            ProviderRequest::Denoise => "denoise",
            ProviderRequest::MonoBass { .. } => "mono-bass",
        }
    }
}

impl fmt::Display for ProviderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request on its way to the provider thread
#[derive(Debug)]
pub struct ProviderEnvelope {
    pub id: Uuid,
    pub request: ProviderRequest,
    pub buffer: AudioBuffer,
}

/// The provider's answer, correlated by `id`
#[derive(Debug)]
pub struct ProviderResponse {
    pub id: Uuid,
    pub result: Result<AudioBuffer>,
}

/// Responses that arrived but have not been claimed yet
#[derive(Debug)]
struct Inbox {
    responses: Receiver<ProviderResponse>,
    state: Mutex<InboxState>,
}

#[derive(Debug, Default)]
struct InboxState {
    arrived: HashMap<Uuid, Result<AudioBuffer>>,
    /// Requests whose handle was dropped before the response came back
    abandoned: HashSet<Uuid>,
}

impl InboxState {
    fn accept(&mut self, response: ProviderResponse) {
        if self.abandoned.remove(&response.id) {
            debug!(id = %response.id, "discarding response for dropped request");
            return;
        }
        self.arrived.insert(response.id, response.result);
    }
}

impl Inbox {
    fn lock(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take(&self, id: Uuid) -> Option<Result<AudioBuffer>> {
        let mut state = self.lock();
        for response in self.responses.try_iter() {
            state.accept(response);
        }
        state.arrived.remove(&id)
    }

    fn store(&self, response: ProviderResponse) {
        self.lock().accept(response);
    }

    /// Forget `id`: drop its result if present, otherwise discard it on arrival
    fn abandon(&self, id: Uuid) {
        let mut state = self.lock();
        for response in self.responses.try_iter() {
            state.accept(response);
        }
        if state.arrived.remove(&id).is_none() {
            state.abandoned.insert(id);
        }
    }
}

/// Handle on one in-flight provider request
///
/// Dropping the handle without claiming the result releases it from the inbox.
#[derive(Debug)]
pub struct PendingResult {
    id: Uuid,
    request: ProviderRequest,
    inbox: Arc<Inbox>,
    claimed: AtomicBool,
}

impl PendingResult {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> ProviderRequest {
        self.request
    }

    /// The result, if it has arrived; a taken result is gone from the inbox
    pub fn try_take(&self) -> Option<Result<AudioBuffer>> {
        let result = self.inbox.take(self.id);
        if result.is_some() {
            self.claimed.store(true, Ordering::Relaxed);
        }
        result
    }

    /// Block until the result arrives
    pub fn wait(self) -> Result<AudioBuffer> {
        loop {
            if let Some(result) = self.try_take() {
                return result;
            }
            match self.inbox.responses.recv_timeout(WAIT_POLL) {
                Ok(response) => self.inbox.store(response),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // nothing more can arrive for this id
                    self.claimed.store(true, Ordering::Relaxed);
                    return self.inbox.take(self.id).unwrap_or(Err(RackError::ChannelClosed {
                        what: "provider responses",
                    }));
                }
            }
        }
    }
}

impl Drop for PendingResult {
    fn drop(&mut self) {
        if !self.claimed.load(Ordering::Relaxed) {
            self.inbox.abandon(self.id);
        }
    }
}

/// Runs a [`DspProvider`] on a dedicated thread
#[derive(Debug)]
pub struct ProviderClient {
    name: String,
    requests: Option<Sender<ProviderEnvelope>>,
    inbox: Arc<Inbox>,
    thread: Option<JoinHandle<()>>,
}

impl ProviderClient {
    pub fn spawn<P: DspProvider + 'static>(mut provider: P) -> Result<Self> {
        let name = provider.name().to_string();
        let (request_tx, request_rx) = unbounded::<ProviderEnvelope>();
        let (response_tx, response_rx) = unbounded();

        let thread = std::thread::Builder::new()
            .name(format!("provider-{}", name))
            .spawn(move || {
                for envelope in request_rx {
                    let started = Instant::now();
                    let result = provider.handle(envelope.request, envelope.buffer);
                    match &result {
                        Ok(_) => debug!(
                            id = %envelope.id,
                            request = %envelope.request,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "provider request done"
                        ),
                        Err(err) => warn!(
                            id = %envelope.id,
                            request = %envelope.request,
                            error = %err,
                            "provider request failed"
                        ),
                    }
                    let response = ProviderResponse {
                        id: envelope.id,
                        result,
                    };
                    if response_tx.send(response).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            name,
            requests: Some(request_tx),
            inbox: Arc::new(Inbox {
                responses: response_rx,
                state: Mutex::new(InboxState::default()),
            }),
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a request; the buffer moves to the provider thread
    pub fn request(&self, request: ProviderRequest, buffer: AudioBuffer) -> Result<PendingResult> {
        let id = Uuid::new_v4();
        debug!(id = %id, request = %request, frames = buffer.len(), "provider request sent");
        self.requests
            .as_ref()
            .ok_or(RackError::ChannelClosed {
                what: "provider requests",
            })?
            .send(ProviderEnvelope {
                id,
                request,
                buffer,
            })
            .map_err(|_| RackError::ChannelClosed {
                what: "provider requests",
            })?;

        Ok(PendingResult {
            id,
            request,
            inbox: Arc::clone(&self.inbox),
            claimed: AtomicBool::new(false),
        })
    }

    pub fn normalize_loudness(&self, buffer: AudioBuffer, target_lufs: f32) -> Result<PendingResult> {
        self.request(ProviderRequest::NormalizeLoudness { target_lufs }, buffer)
    }

    pub fn fix_phase(&self, buffer: AudioBuffer) -> Result<PendingResult> {
        self.request(ProviderRequest::FixPhase, buffer)
    }

    pub fn repair_clipping(&self, buffer: AudioBuffer) -> Result<PendingResult> {
        self.request(ProviderRequest::RepairClipping, buffer)
    }

    pub fn denoise(&self, buffer: AudioBuffer) -> Result<PendingResult> {
        self.request(ProviderRequest::Denoise, buffer)
    }

    pub fn mono_bass(&self, buffer: AudioBuffer, cutoff_hz: f32) -> Result<PendingResult> {
        self.request(ProviderRequest::MonoBass { cutoff_hz }, buffer)
    }
}

impl Drop for ProviderClient {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(provider = %self.name, "provider thread panicked");
            }
        }
    }
}
