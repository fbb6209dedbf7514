//! Embedded prompts
//!
//! Compiled into the binary from the .pmt files under `prompts/`.

use tracing::debug;

pub const SYSTEM: &str = include_str!("../../prompts/system.pmt");
pub const TEST_GENERATION: &str = include_str!("../../prompts/test-generation.pmt");
pub const PARSE_FAILURE: &str = include_str!("../../prompts/parse-failure.pmt");
pub const SYNTAX_ERROR: &str = include_str!("../../prompts/syntax-error.pmt");
pub const COMPILE_ERROR: &str = include_str!("../../prompts/compile-error.pmt");
pub const COMPILE_ERROR_GENERIC: &str = include_str!("../../prompts/compile-error-generic.pmt");
pub const WEAK_ASSERTION: &str = include_str!("../../prompts/weak-assertion.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    let found = match name {
        "system" => Some(SYSTEM),
        "test-generation" => Some(TEST_GENERATION),
        "parse-failure" => Some(PARSE_FAILURE),
        "syntax-error" => Some(SYNTAX_ERROR),
        "compile-error" => Some(COMPILE_ERROR),
        "compile-error-generic" => Some(COMPILE_ERROR_GENERIC),
        "weak-assertion" => Some(WEAK_ASSERTION),
        _ => None,
    };
    if found.is_none() {
        debug!(%name, "get_embedded: no match found");
    }
    found
}
