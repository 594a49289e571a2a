//! PrintView WebAssembly Bindings
//!
//! The viewer's web worker calls into these to decode model files, build
//! their LOD ladders and simplify meshes without blocking the render thread.

use wasm_bindgen::prelude::*;

#[cfg(feature = "console_error_panic_hook")]
pub use console_error_panic_hook::set_once as set_panic_hook;

mod api;
mod mesh;
mod utils;

pub use api::{build_lods, decode_preview, detect_format, load_model, simplify_geometry};
pub use mesh::{LodSetJs, MeshJs};
pub use utils::set_panic_hook as init_panic_hook;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Get the version of PrintView
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
