//! Build script for generating Rust code from Protocol Buffers

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only the client side is needed; the stats server lives elsewhere
    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        // The `Connect` RPC collides with the generated `connect` constructor;
        // clients are built from an explicit Channel instead.
        .build_transport(false)
        .compile(&["proto/eth2stats.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/eth2stats.proto");
    Ok(())
}
