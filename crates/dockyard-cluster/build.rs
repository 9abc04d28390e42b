//! Generates the `dockyard.Dockyard` gRPC service stubs.
//!
//! Messages are hand-written `prost::Message` types in `src/lib.rs`, so the
//! service is described with tonic-build's manual builder and no `protoc`
//! is needed at build time.

use tonic_build::manual::{Builder, Method, Service};

fn main() {
    let service = Service::builder()
        .name("Dockyard")
        .package("dockyard")
        .method(
            Method::builder()
                .name("check_worker")
                .route_name("CheckWorker")
                .input_type("crate::proto::CheckRequest")
                .output_type("crate::proto::CheckResponse")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .method(
            Method::builder()
                .name("check_for_task")
                .route_name("CheckForTask")
                .input_type("crate::proto::TaskRequest")
                .output_type("crate::proto::TaskResponse")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .build();

    Builder::new().compile(&[service]);
    println!("cargo:rerun-if-changed=build.rs");
}
