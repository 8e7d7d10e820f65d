use std::{env, path::PathBuf};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=../../proto/grpc/reflection");
    println!("cargo:rerun-if-changed=../../proto");

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);

    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .file_descriptor_set_path(out_dir.join("reflection_v1_descriptor.bin"))
        .compile_protos(&["../../proto/grpc/reflection/v1/reflection.proto"], &["../../proto"])?;

    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .file_descriptor_set_path(out_dir.join("reflection_v1alpha_descriptor.bin"))
        .compile_protos(
            &["../../proto/grpc/reflection/v1alpha/reflection.proto"],
            &["../../proto"],
        )?;

    Ok(())
}
