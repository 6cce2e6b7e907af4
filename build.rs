fn main() {
    // KMS v1beta1 service stubs. Messages are prost derives in src/proto,
    // so the service is described here instead of compiled from a .proto.
    let method = |name: &str, route: &str, input: &str, output: &str| {
        tonic_build::manual::Method::builder()
            .name(name)
            .route_name(route)
            .input_type(format!("crate::proto::{input}"))
            .output_type(format!("crate::proto::{output}"))
            .codec_path("tonic::codec::ProstCodec")
            .build()
    };

    let service = tonic_build::manual::Service::builder()
        .name("KeyManagementService")
        .package("v1beta1")
        .method(method("version", "Version", "VersionRequest", "VersionResponse"))
        .method(method("decrypt", "Decrypt", "DecryptRequest", "DecryptResponse"))
        .method(method("encrypt", "Encrypt", "EncryptRequest", "EncryptResponse"))
        .build();

    tonic_build::manual::Builder::new()
        .build_server(true)
        .build_client(true)
        .compile(&[service]);
}
