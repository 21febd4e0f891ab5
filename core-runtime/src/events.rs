//! # Event Bus
//!
//! Typed notifications from the handler core over a `broadcast` channel.
//!
//! Presentation layers subscribe instead of binding to mutable handler
//! fields: identity changes, sign-in progress and transfer progress all
//! arrive here.
//!
//! ```text
//! ┌──────────────┐   emit   ┌──────────┐  subscribe  ┌────────────┐
//! │ auth / guard ├─────────>│          ├────────────>│ UI adapter │
//! └──────────────┘          │ EventBus │             └────────────┘
//! ┌──────────────┐   emit   │          │  subscribe  ┌────────────┐
//! │ sync handler ├─────────>│          ├────────────>│ log sink   │
//! └──────────────┘          └──────────┘             └────────────┘
//! ```
//!
//! Emission is fire-and-forget. `emit` fails only when nobody is subscribed,
//! and emitters ignore that with `let _ = bus.emit(..)`.
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! let _ = bus.emit(CoreEvent::Auth(AuthEvent::SigningIn {
//!     handler_id: "h-1".to_string(),
//! }));
//!
//! assert!(matches!(rx.recv().await, Ok(CoreEvent::Auth(_))));
//! # }
//! ```
//!
//! Slow subscribers get `RecvError::Lagged(n)` and keep receiving;
//! `RecvError::Closed` means every bus handle was dropped.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Auth(AuthEvent),
    Transfer(TransferEvent),
    Handler(HandlerEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Transfer(e) => e.description(),
            CoreEvent::Handler(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Transfer(TransferEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Transfer(TransferEvent::RetryScheduled { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignedIn { .. })
            | CoreEvent::Auth(AuthEvent::LoginAborted { .. })
            | CoreEvent::Transfer(TransferEvent::Completed { .. })
            | CoreEvent::Handler(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// The consent page is about to be shown.
    SigningIn { handler_id: String },
    /// A credential was obtained and stored.
    SignedIn {
        handler_id: String,
        /// Unix epoch seconds.
        expires_at: i64,
    },
    /// The user closed the consent page without granting access.
    LoginAborted { handler_id: String },
    TokenRefreshing { handler_id: String },
    TokenRefreshed {
        handler_id: String,
        /// Unix epoch seconds.
        expires_at: i64,
    },
    AuthError {
        handler_id: Option<String>,
        message: String,
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SigningIn { .. } => "Sign-in in progress",
            AuthEvent::SignedIn { .. } => "Signed in successfully",
            AuthEvent::LoginAborted { .. } => "Sign-in aborted by user",
            AuthEvent::TokenRefreshing { .. } => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

// ============================================================================
// Transfer Events
// ============================================================================

/// Upload path chosen for a file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferStrategy {
    /// One request carrying the whole body.
    Small,
    /// Resumable session with fixed-size chunks.
    Large,
}

impl fmt::Display for TransferStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStrategy::Small => write!(f, "small"),
            TransferStrategy::Large => write!(f, "large"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Upload,
    Download,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum TransferEvent {
    Started {
        remote_name: String,
        direction: TransferDirection,
        size: u64,
        strategy: Option<TransferStrategy>,
    },
    ChunkCompleted {
        remote_name: String,
        chunk_index: u64,
        bytes_transferred: u64,
        total_bytes: u64,
    },
    Completed {
        remote_name: String,
        bytes_transferred: u64,
    },
    /// A remote call failed transiently and will be retried after `delay_ms`.
    RetryScheduled {
        operation: String,
        attempt: u32,
        delay_ms: u64,
    },
    Failed {
        remote_name: String,
        message: String,
    },
    Cancelled {
        remote_name: String,
    },
}

impl TransferEvent {
    fn description(&self) -> &str {
        match self {
            TransferEvent::Started { .. } => "Transfer started",
            TransferEvent::ChunkCompleted { .. } => "Transfer chunk completed",
            TransferEvent::Completed { .. } => "Transfer completed",
            TransferEvent::RetryScheduled { .. } => "Remote call retry scheduled",
            TransferEvent::Failed { .. } => "Transfer failed",
            TransferEvent::Cancelled { .. } => "Transfer cancelled",
        }
    }
}

// ============================================================================
// Handler Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum HandlerEvent {
    /// Account label or capacity changed.
    IdentityUpdated {
        handler_id: String,
        label: String,
        total_capacity: u64,
        free_capacity: u64,
    },
}

impl HandlerEvent {
    fn description(&self) -> &str {
        match self {
            HandlerEvent::IdentityUpdated { .. } => "Handler identity updated",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast hub. Cloning yields another handle to the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// `capacity` events are buffered per subscriber before it lags.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns the number of subscribers reached, or an error when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A receiver with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let transfers = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Transfer(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Next event passing the filter; non-matching events are skipped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns `None` when no matching event is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        use broadcast::error::TryRecvError;

        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(n)) => return Some(Err(RecvError::Lagged(n))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
