//! tonic services for `grpc.reflection.v1` and `grpc.reflection.v1alpha`.
//!
//! Both protocol versions carry identical messages, so a single macro wires each
//! generated request/response type to the shared [`Dispatcher`](crate::Dispatcher).

use std::sync::Arc;

use reflection_grpc_stubs::{v1, v1alpha};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::debug;

use crate::builder::ReflectionState;
use crate::dispatcher::{Query, ReflectionExchange};
use crate::response::Reply;

macro_rules! reflection_service {
    ($pb:ident, $service:ident) => {
        impl ReflectionExchange for $pb::ServerReflectionRequest {
            type Response = $pb::ServerReflectionResponse;

            fn query(&self) -> Query {
                use $pb::server_reflection_request::MessageRequest;

                match &self.message_request {
                    Some(MessageRequest::FileByFilename(name)) => {
                        Query::FileByFilename(name.clone())
                    }
                    Some(MessageRequest::FileContainingSymbol(symbol)) => {
                        Query::FileContainingSymbol(symbol.clone())
                    }
                    Some(MessageRequest::ListServices(_)) => Query::ListServices,
                    Some(MessageRequest::FileContainingExtension(_)) => {
                        Query::Unsupported("file_containing_extension")
                    }
                    Some(MessageRequest::AllExtensionNumbersOfType(_)) => {
                        Query::Unsupported("all_extension_numbers_of_type")
                    }
                    None => Query::Unsupported("empty"),
                }
            }

            fn respond(self, reply: Reply) -> $pb::ServerReflectionResponse {
                use $pb::server_reflection_response::MessageResponse;

                let message_response = match reply {
                    Reply::FileDescriptors(file_descriptor_proto) => {
                        MessageResponse::FileDescriptorResponse($pb::FileDescriptorResponse {
                            file_descriptor_proto,
                        })
                    }
                    Reply::Services(names) => {
                        MessageResponse::ListServicesResponse($pb::ListServiceResponse {
                            service: names
                                .into_iter()
                                .map(|name| $pb::ServiceResponse { name })
                                .collect(),
                        })
                    }
                    Reply::Error { code, message } => {
                        MessageResponse::ErrorResponse($pb::ErrorResponse {
                            error_code: i32::from(code),
                            error_message: message,
                        })
                    }
                };

                $pb::ServerReflectionResponse {
                    valid_host: self.host.clone(),
                    original_request: Some(self),
                    message_response: Some(message_response),
                }
            }
        }

        /// Reflection service bound to one protocol version.
        #[derive(Clone)]
        pub struct $service {
            state: Arc<ReflectionState>,
        }

        impl $service {
            pub fn new(state: Arc<ReflectionState>) -> Self {
                Self { state }
            }

            pub fn into_server(self) -> $pb::server_reflection_server::ServerReflectionServer<Self> {
                $pb::server_reflection_server::ServerReflectionServer::new(self)
            }
        }

        #[tonic::async_trait]
        impl $pb::server_reflection_server::ServerReflection for $service {
            type ServerReflectionInfoStream =
                ReceiverStream<Result<$pb::ServerReflectionResponse, Status>>;

            async fn server_reflection_info(
                &self,
                request: Request<Streaming<$pb::ServerReflectionRequest>>,
            ) -> Result<Response<Self::ServerReflectionInfoStream>, Status> {
                let remote = request.remote_addr();
                let inbound = request.into_inner();
                let (tx, rx) = mpsc::channel(1);

                let dispatcher = self.state.dispatcher().clone();
                let cancel = self.state.shutdown_token().child_token();

                debug!(?remote, service = stringify!($pb), "reflection stream opened");
                tokio::spawn(async move {
                    dispatcher.run(inbound, tx, cancel).await;
                });

                Ok(Response::new(ReceiverStream::new(rx)))
            }
        }
    };
}

reflection_service!(v1, ServerReflectionV1);
reflection_service!(v1alpha, ServerReflectionV1Alpha);
