//! `hv version`

use anyhow::Result;
use serde::Serialize;

use harvest_storage::sqlite::schema::CURRENT_SCHEMA_VERSION;

use crate::context::RuntimeContext;
use crate::output::output_json;

/// Set `HV_BUILD` at compile time to stamp release builds.
const BUILD: &str = match option_env!("HV_BUILD") {
    Some(b) => b,
    None => "dev",
};

#[derive(Serialize)]
struct VersionInfo {
    version: &'static str,
    build: &'static str,
    schema: i32,
    target: String,
}

fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION"),
        build: BUILD,
        schema: CURRENT_SCHEMA_VERSION,
        target: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
    }
}

pub fn run(ctx: &RuntimeContext) -> Result<()> {
    let info = version_info();
    if ctx.json {
        output_json(&info);
    } else {
        println!(
            "hv version {} ({}, schema v{}) {}",
            info.version, info.build, info.schema, info.target
        );
    }
    Ok(())
}
