//! WASM bindings for the GSSK simulation kernel.
//!
//! `WasmKernel` owns one loaded model and its simulation. Errors cross the
//! boundary as plain strings; structured results are converted with
//! `serde-wasm-bindgen`.

mod forecast;
mod kernel;

pub use kernel::WasmKernel;
