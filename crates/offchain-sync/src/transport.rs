//! Transport interface

use crate::error::TransportError;
use crate::messages::{CommandRequest, CommandResponse};
use async_trait::async_trait;

/// Delivers requests to the counterparty named in `request.receiver` and
/// returns its response. Does not interpret command content.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(&self, request: CommandRequest) -> Result<CommandResponse, TransportError>;

    /// Transport type identifier for logs
    fn transport_type(&self) -> &'static str;
}
