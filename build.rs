fn main() {
    let submit = tonic_build::manual::Method::builder()
        .name("submit")
        .route_name("Submit")
        .input_type("crate::grpc::models::SubmitRequest")
        .output_type("crate::grpc::models::SubmitEvent")
        .codec_path("tonic::codec::ProstCodec")
        .server_streaming()
        .build();

    let runner = tonic_build::manual::Service::builder()
        .name("Runner")
        .package("boxrunner")
        .method(submit)
        .build();

    tonic_build::manual::Builder::new().compile(&[runner]);
}
