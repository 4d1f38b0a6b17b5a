use chrono::Utc;
use verdant_core::dispatch_json;

use super::{open_engine, print_json, CliResult};

/// Failures are reported in the response body, not the exit code.
pub async fn run(request: &str) -> CliResult {
    let engine = open_engine()?;
    let response = dispatch_json(&engine, request, Utc::now()).await;
    print_json(&response)
}
