// Generates Rust types + gRPC service stubs from the OTLP proto sources.
//
// Every generated message gets serde derives so the codec crate can encode
// and decode OTLP-canonical JSON (snake_case field names, defaults included)
// without hand-written mapping code.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .type_attribute(".", "#[derive(serde::Serialize, serde::Deserialize)]")
        // Every field gets `#[serde(default)]` so a decoder can accept OTLP
        // JSON that omits fields it doesn't care about. This is applied at
        // the field level (not the oneof enum type), so it only ever needs
        // `Option::default()` / `Vec::default()`, never `Default` on the
        // oneof enum itself.
        .field_attribute(".", "#[serde(default)]")
        .compile_protos(
            &[
                "proto/opentelemetry/proto/collector/trace/v1/trace_service.proto",
                "proto/opentelemetry/proto/collector/metrics/v1/metrics_service.proto",
                "proto/opentelemetry/proto/collector/logs/v1/logs_service.proto",
            ],
            &["proto/"],
        )?;

    println!("cargo:rerun-if-changed=proto/");
    Ok(())
}
