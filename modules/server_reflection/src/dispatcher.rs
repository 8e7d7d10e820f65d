//! Sequential request dispatch for a single reflection stream.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Status};
use tracing::{debug, instrument};

use crate::closure::closure;
use crate::index::DescriptorIndex;
use crate::response::{
    error_response, file_descriptor_response, list_services_response, Reply, FILE_NOT_FOUND,
    SYMBOL_NOT_FOUND,
};

/// A classified inbound query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    FileByFilename(String),
    FileContainingSymbol(String),
    ListServices,
    /// Any request kind this endpoint does not answer, named for the error message.
    Unsupported(&'static str),
}

/// Bridges a protocol-specific request message to the dispatcher.
///
/// Implemented for the request types of every served protocol version, so one loop
/// handles all of them.
pub trait ReflectionExchange: Send + 'static {
    type Response: Send + 'static;

    fn query(&self) -> Query;

    /// Wrap a reply into the response message for this request.
    fn respond(self, reply: Reply) -> Self::Response;
}

impl ReflectionExchange for Query {
    type Response = Reply;

    fn query(&self) -> Query {
        self.clone()
    }

    fn respond(self, reply: Reply) -> Reply {
        reply
    }
}

/// Answers queries against a shared, read-only [`DescriptorIndex`].
#[derive(Clone)]
pub struct Dispatcher {
    index: Arc<DescriptorIndex>,
}

impl Dispatcher {
    pub fn new(index: Arc<DescriptorIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &DescriptorIndex {
        &self.index
    }

    /// Resolve one query. Never fails: lookup misses become error replies.
    #[instrument(name = "server_reflection.dispatch", skip(self), level = "debug")]
    pub fn resolve(&self, query: &Query) -> Reply {
        match query {
            Query::FileByFilename(name) => match self.index.file_by_name(name) {
                Some(file) => file_descriptor_response(&closure(&self.index, file)),
                None => error_response(Code::NotFound, FILE_NOT_FOUND),
            },
            Query::FileContainingSymbol(symbol) => {
                match self.index.file_containing_symbol(symbol) {
                    Some(file) => file_descriptor_response(&closure(&self.index, file)),
                    None => error_response(Code::NotFound, SYMBOL_NOT_FOUND),
                }
            }
            Query::ListServices => list_services_response(self.index.services()),
            Query::Unsupported(kind) => error_response(
                Code::Unimplemented,
                format!("{kind} requests are not supported by this server"),
            ),
        }
    }

    /// Serve one stream: read a request, answer it, then read the next.
    ///
    /// Ends when the inbound stream finishes or fails, when the receiver of `outbound`
    /// is dropped, or when `cancel` fires.
    pub async fn run<S, R>(
        &self,
        mut inbound: S,
        outbound: mpsc::Sender<Result<R::Response, Status>>,
        cancel: CancellationToken,
    ) where
        S: Stream<Item = Result<R, Status>> + Unpin,
        R: ReflectionExchange,
    {
        let mut served = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(served, "reflection stream cancelled");
                    return;
                }
                next = inbound.next() => next,
            };

            let request = match next {
                Some(Ok(request)) => request,
                Some(Err(status)) => {
                    debug!(served, %status, "reflection stream failed");
                    return;
                }
                None => {
                    debug!(served, "reflection stream closed by client");
                    return;
                }
            };

            let reply = self.resolve(&request.query());
            let response = request.respond(reply);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(served, "reflection stream cancelled");
                    return;
                }
                sent = outbound.send(Ok(response)) => {
                    if sent.is_err() {
                        debug!(served, "reflection client stopped reading");
                        return;
                    }
                }
            }

            served += 1;
        }
    }
}
