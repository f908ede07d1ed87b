//! Build script for generating the simulation gateway client
//!
//! Code generation only runs with the `proto-gen` feature. If protoc is not
//! available, generation is skipped and the bundled types are used.

use std::path::PathBuf;
use std::process::Command;

const PROTO_FILE: &str = "../../proto/simulation/v1/simulation.proto";
const PROTO_ROOT: &str = "../../proto";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed={}", PROTO_FILE);

    if std::env::var_os("CARGO_FEATURE_PROTO_GEN").is_none() {
        return Ok(());
    }

    let protoc_available =
        std::env::var("PROTOC").is_ok() || Command::new("protoc").arg("--version").output().is_ok();

    if !protoc_available {
        println!("cargo:warning=protoc not found, skipping proto generation");
        println!("cargo:warning=Install protoc or set PROTOC env var to generate proto code");
        return Ok(());
    }

    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    tonic_build::configure()
        .build_server(false) // The simulator hosts the server side
        .build_client(true)
        .out_dir(&out_dir)
        .compile(&[PROTO_FILE], &[PROTO_ROOT])?;

    Ok(())
}
