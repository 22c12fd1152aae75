//! Protobuf types and gRPC service definitions for the kvbench control plane.
//!
//! The controller and the runner share one bidirectional streaming RPC,
//! `benchmarkpb.BenchmarkService/CTRLStream`, whose frames are a one-of over
//! the five control payload kinds. This crate only carries the wire types;
//! all behavior lives in the binaries.

#![deny(unsafe_code)]
// gRPC services return tonic::Status - standard practice for gRPC error handling
#![allow(clippy::result_large_err)]

/// Generated protobuf types and service traits.
pub mod proto {
    #![allow(clippy::all)]
    #![allow(missing_docs)]

    // Use pre-generated code when proto files aren't available
    #[cfg(use_pregenerated_proto)]
    include!("generated/benchmarkpb.rs");

    // Use build-time generated code in development
    #[cfg(not(use_pregenerated_proto))]
    tonic::include_proto!("benchmarkpb");
}
