//! Per-request state machine
//!
//! ```text
//! Pending ──► Acked
//!    │
//!    ├──► Failed
//!    ▼
//! TimedOut ──► Retried ──► Acked
//!    │            │
//!    ▼            ▼
//!  Failed      TimedOut ...
//! ```

use crate::error::SyncError;
use offchain_core::CommandId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestState {
    Pending,
    Acked,
    TimedOut,
    Retried,
    Failed,
}

impl RequestState {
    fn can_move_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Pending, Acked)
                | (Pending, TimedOut)
                | (Pending, Failed)
                | (TimedOut, Retried)
                | (TimedOut, Failed)
                | (Retried, Acked)
                | (Retried, TimedOut)
                | (Retried, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Acked | RequestState::Failed)
    }
}

/// One outbound batch awaiting its response
#[derive(Debug, Clone)]
pub struct InFlightRequest {
    request_id: Uuid,
    command_ids: Vec<CommandId>,
    first_offset: u64,
    state: RequestState,
    attempts: u32,
    last_error: Option<String>,
}

impl InFlightRequest {
    pub fn new(request_id: Uuid, command_ids: Vec<CommandId>, first_offset: u64) -> Self {
        Self {
            request_id,
            command_ids,
            first_offset,
            state: RequestState::Pending,
            attempts: 1,
            last_error: None,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn command_ids(&self) -> &[CommandId] {
        &self.command_ids
    }

    pub fn first_offset(&self) -> u64 {
        self.first_offset
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Sends so far, including the first
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn advance(&mut self, next: RequestState) -> Result<(), SyncError> {
        if !self.state.can_move_to(next) {
            return Err(SyncError::IllegalTransition {
                request_id: self.request_id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn acked(&mut self) -> Result<(), SyncError> {
        self.advance(RequestState::Acked)
    }

    pub fn timed_out(&mut self, reason: impl Into<String>) -> Result<(), SyncError> {
        self.advance(RequestState::TimedOut)?;
        self.last_error = Some(reason.into());
        Ok(())
    }

    pub fn retried(&mut self) -> Result<(), SyncError> {
        self.advance(RequestState::Retried)?;
        self.attempts += 1;
        Ok(())
    }

    pub fn failed(&mut self, reason: impl Into<String>) -> Result<(), SyncError> {
        self.advance(RequestState::Failed)?;
        self.last_error = Some(reason.into());
        Ok(())
    }
}

/// In-flight requests of one channel
#[derive(Debug, Default)]
pub struct RequestTracker {
    requests: HashMap<Uuid, InFlightRequest>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, request: InFlightRequest) {
        self.requests.insert(request.request_id, request);
    }

    pub fn get(&self, request_id: &Uuid) -> Option<&InFlightRequest> {
        self.requests.get(request_id)
    }

    /// Apply `step` to a tracked request
    pub fn update<F>(&mut self, request_id: &Uuid, step: F) -> Result<&InFlightRequest, SyncError>
    where
        F: FnOnce(&mut InFlightRequest) -> Result<(), SyncError>,
    {
        let request = self
            .requests
            .get_mut(request_id)
            .ok_or(SyncError::UnknownRequest(*request_id))?;
        step(request)?;
        Ok(request)
    }

    /// Stop tracking a request in a terminal state
    pub fn finish(&mut self, request_id: &Uuid) -> Option<InFlightRequest> {
        match self.requests.get(request_id) {
            Some(request) if request.state.is_terminal() => self.requests.remove(request_id),
            _ => None,
        }
    }

    /// Requests not yet acked or failed
    pub fn in_flight(&self) -> usize {
        self.requests
            .values()
            .filter(|r| !r.state.is_terminal())
            .count()
    }

    /// Drop a request regardless of its state, used when its driver was cancelled
    pub fn abandon(&mut self, request_id: &Uuid) -> Option<InFlightRequest> {
        self.requests.remove(request_id)
    }
}
