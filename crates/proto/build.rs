//! Build script for kvbench-proto.
//!
//! Compiles the control-plane protobuf definition with tonic-build when the
//! proto tree is present. Distributions without the proto files (and without
//! protoc) fall back to the pre-generated code in src/generated/.

use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo::rustc-check-cfg=cfg(use_pregenerated_proto)");

    let proto_path = Path::new("../../proto/benchmarkpb/benchmark.proto");

    if proto_path.exists() {
        println!("cargo::rerun-if-changed=../../proto/benchmarkpb/benchmark.proto");

        tonic_build::configure()
            .build_server(true)
            .build_client(true)
            .compile_protos(&["../../proto/benchmarkpb/benchmark.proto"], &["../../proto"])?;
    } else {
        println!("cargo::rustc-cfg=use_pregenerated_proto");
    }

    Ok(())
}
