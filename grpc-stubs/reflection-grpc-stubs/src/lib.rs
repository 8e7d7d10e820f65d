//! Generated gRPC stubs for the ServerReflection protocol
//!
//! This crate contains only the generated protobuf types and gRPC client/server stubs
//! for `grpc.reflection.v1` and `grpc.reflection.v1alpha`. It does not contain any
//! business logic.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

/// Generated protobuf types for `grpc.reflection.v1`
pub mod v1 {
    tonic::include_proto!("grpc.reflection.v1");

    /// Encoded `FileDescriptorSet` describing `grpc/reflection/v1/reflection.proto`.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("reflection_v1_descriptor");
}

/// Generated protobuf types for `grpc.reflection.v1alpha`
pub mod v1alpha {
    tonic::include_proto!("grpc.reflection.v1alpha");

    /// Encoded `FileDescriptorSet` describing `grpc/reflection/v1alpha/reflection.proto`.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("reflection_v1alpha_descriptor");
}

pub const SERVICE_NAME_V1: &str = v1::server_reflection_server::SERVICE_NAME;
pub const SERVICE_NAME_V1ALPHA: &str = v1alpha::server_reflection_server::SERVICE_NAME;
