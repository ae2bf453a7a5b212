fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use the vendored protoc binary so no system install is needed
    let protoc_path = protoc_bin_vendored::protoc_bin_path()
        .expect("protoc-bin-vendored: no binary for this platform");
    std::env::set_var("PROTOC", protoc_path);

    // google/protobuf/struct.proto ships with the vendored includes
    let wkt_include = protoc_bin_vendored::include_path()
        .expect("protoc-bin-vendored: no include directory for this platform");

    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(
            &[std::path::Path::new("src/proto/lockbox.proto")],
            &[std::path::Path::new("src/proto"), wkt_include.as_path()],
        )?;

    println!("cargo:rerun-if-changed=src/proto/lockbox.proto");
    Ok(())
}
