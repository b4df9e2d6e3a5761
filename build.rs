use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/livekit_bridge.proto");
    println!("cargo:rerun-if-changed=proto/health.proto");

    // Use the vendored protoc unless the environment already provides one.
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(out_dir.join("livekit_bridge_descriptor.bin"))
        .compile_protos(
            &["proto/livekit_bridge.proto", "proto/health.proto"],
            &["proto"],
        )?;

    Ok(())
}
