//! Writes the OpenAPI specification to `openapi.json` in the workspace root.
//!
//! Run with: cargo run --bin gen-openapi -p ttlock-server

use std::fs;
use std::path::PathBuf;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    let json = ttlock_server::api::get_openapi_json().context("serializing OpenAPI spec")?;

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let workspace_root = manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .context("could not find workspace root")?;
    let output_path = workspace_root.join("openapi.json");

    fs::write(&output_path, &json)
        .with_context(|| format!("writing {}", output_path.display()))?;

    let spec: serde_json::Value = serde_json::from_str(&json)?;
    let count = |pointer: &str| {
        spec.pointer(pointer)
            .and_then(serde_json::Value::as_object)
            .map_or(0, serde_json::Map::len)
    };

    println!("Written to: {}", output_path.display());
    println!("Paths: {}", count("/paths"));
    println!("Schemas: {}", count("/components/schemas"));
    Ok(())
}
