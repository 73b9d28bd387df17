use std::path::PathBuf;

const PROTO_DIR: &str = "proto";
const HEALTH_PROTO: &str = "proto/grpc/health/v1/health.proto";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed={PROTO_DIR}");

    let protoc = protoc_bin_vendored::protoc_bin_path()?;
    // SAFETY: build scripts run single-threaded before compilation.
    // No other threads exist that could be reading environment variables concurrently.
    unsafe {
        std::env::set_var("PROTOC", protoc);
    }

    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);
    let descriptor_path = out_dir.join("health_descriptor.bin");

    // -------- Pass 1: prost messages + tonic server and client stubs --------
    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(&descriptor_path)
        .compile_protos(&[HEALTH_PROTO], &[PROTO_DIR])?;

    // -------- Pass 2: pbjson serde implementations --------
    // emit_fields keeps default-valued fields (e.g. status UNKNOWN) in the JSON output.
    let descriptor_bytes = std::fs::read(&descriptor_path)?;
    pbjson_build::Builder::new()
        .register_descriptors(&descriptor_bytes)?
        .emit_fields()
        .build(&[".grpc.health.v1"])?;

    Ok(())
}
