//! Build script for fabricfs.
//!
//! Emits a reminder when a release binary is built without a real GPU
//! backend, since the mock driver serves handles no other process can
//! import.

use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_CUDA");

    let cuda_enabled = env::var("CARGO_FEATURE_CUDA").is_ok();
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    if profile == "release" && !cuda_enabled {
        println!(
            "cargo:warning=fabricfs: release build without the `cuda` feature; \
             only the mock driver is available"
        );
    }
}
