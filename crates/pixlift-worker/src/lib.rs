//! Web worker entry point for pixlift upscaling.
//!
//! This crate compiles to a standalone WASM module that runs inside a
//! `Worker`. It receives raw RGBA pixels and a `PipelineConfig` via
//! `postMessage`, runs the upscaler, and posts progress and the result
//! back.
//!
//! Pixels travel as raw `Uint8Array` buffers in both directions to
//! avoid JSON-encoding megabytes of sample data as number arrays. The
//! config, diagnostics and errors are small JSON strings.
//!
//! Running the pipeline in a worker keeps the browser's main thread
//! free for UI updates. The host cancels an in-flight run by
//! terminating the worker; the `generation` counter lets it discard
//! replies from a superseded request.

use pixlift_pipeline::{
    CancelToken, PipelineConfig, PipelineDiagnostics, PipelineError, Progress, RasterBuffer,
    Upscaled, Upscaler,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// One upscaler per worker, so overlapping requests are rejected with
/// `Busy` rather than interleaved.
static UPSCALER: Upscaler = Upscaler::new();

/// Message protocol: the main thread sends a JS object with:
/// - `width`, `height`: `f64` source dimensions in pixels
/// - `pixels`: `Uint8Array` of `width * height * 4` RGBA samples
/// - `configJson`: `String` containing JSON-serialized `PipelineConfig`
/// - `generation`: `f64` generation counter (passed through to every reply)
///
/// While running the worker posts progress objects:
/// - `generation`, `type: "progress"`, `stage`, `percent`, `message`
///
/// On success the worker responds with:
/// - `generation`, `type: "complete"`, `ok: true`
/// - `width`, `height`: `f64` output dimensions
/// - `pixels`: `Uint8Array` of output RGBA samples
/// - `diagnosticsJson`: `String` holding JSON-serialized `PipelineDiagnostics`
///
/// On error (including cancellation) the worker responds with:
/// - `generation`, `type: "complete"`, `ok: false`
/// - `errorJson`: `String` holding JSON-serialized `PipelineError`
///
/// # Worker entry point
///
/// Called automatically when the WASM module is instantiated in the
/// worker context.
#[wasm_bindgen(start)]
pub fn worker_main() {
    console_error_panic_hook::set_once();

    let global: web_sys::DedicatedWorkerGlobalScope = js_sys::global()
        .dyn_into()
        .expect_throw("not running in a DedicatedWorkerGlobalScope");

    let onmessage =
        Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |event: web_sys::MessageEvent| {
            handle_message(event);
        });
    global.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget(); // kept alive for the worker's lifetime
}

/// Handle an incoming message from the main thread.
#[allow(clippy::needless_pass_by_value)]
fn handle_message(event: web_sys::MessageEvent) {
    let data = event.data();

    let generation = get_field(&data, "generation")
        .as_f64()
        .expect_throw("generation is not a number");

    let src = match read_source(&data) {
        Ok(src) => src,
        Err(e) => {
            post_error(generation, &e);
            return;
        }
    };

    let config_json = get_field(&data, "configJson")
        .as_string()
        .expect_throw("configJson is not a string");
    let config: PipelineConfig = match serde_json::from_str(&config_json) {
        Ok(c) => c,
        Err(e) => {
            post_error(
                generation,
                &PipelineError::UnsupportedConfig(format!("failed to parse config: {e}")),
            );
            return;
        }
    };

    // Synchronous: blocks this worker thread only.
    let outcome = UPSCALER.run(&src, &config, &CancelToken::new(), |progress| {
        post_progress(generation, progress);
    });

    match outcome {
        Ok(upscaled) => post_success(generation, &upscaled),
        Err(e) => post_error(generation, &e),
    }
}

fn get_field(data: &JsValue, key: &str) -> JsValue {
    js_sys::Reflect::get(data, &JsValue::from_str(key))
        .unwrap_or_else(|_| wasm_bindgen::throw_str(&format!("missing {key} field")))
}

/// Build the source buffer from `width`, `height` and `pixels`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn read_source(data: &JsValue) -> Result<RasterBuffer, PipelineError> {
    let width = get_field(data, "width")
        .as_f64()
        .expect_throw("width is not a number");
    let height = get_field(data, "height")
        .as_f64()
        .expect_throw("height is not a number");
    let pixels: js_sys::Uint8Array = get_field(data, "pixels")
        .dyn_into()
        .expect_throw("pixels is not a Uint8Array");

    if !(0.0..=f64::from(u32::MAX)).contains(&width)
        || !(0.0..=f64::from(u32::MAX)).contains(&height)
    {
        return Err(PipelineError::UnsupportedConfig(format!(
            "invalid source dimensions {width}x{height}"
        )));
    }
    RasterBuffer::from_raw(width as u32, height as u32, pixels.to_vec())
}

fn new_reply(generation: f64, kind: &str) -> (js_sys::Object, impl Fn(&str, &JsValue)) {
    let response = js_sys::Object::new();
    let target = response.clone();
    let set = move |key: &str, val: &JsValue| {
        let _ = js_sys::Reflect::set(&target, &JsValue::from_str(key), val);
    };
    set("generation", &JsValue::from_f64(generation));
    set("type", &JsValue::from_str(kind));
    (response, set)
}

fn post(response: &js_sys::Object) {
    if let Ok(global) = js_sys::global().dyn_into::<web_sys::DedicatedWorkerGlobalScope>() {
        let _ = global.post_message(response);
    }
}

/// Post a stage-boundary progress report.
fn post_progress(generation: f64, progress: &Progress) {
    let (response, set) = new_reply(generation, "progress");
    set("stage", &JsValue::from_str(progress.stage));
    set("percent", &JsValue::from_f64(f64::from(progress.percent)));
    set("message", &JsValue::from_str(progress.message));
    post(&response);
}

/// Serialize run diagnostics for the `diagnosticsJson` reply field.
fn diagnostics_json(diagnostics: &PipelineDiagnostics) -> Result<String, PipelineError> {
    serde_json::to_string(diagnostics).map_err(|e| {
        PipelineError::UnsupportedConfig(format!(
            "upscaled, but the diagnostics could not be serialized: {e}"
        ))
    })
}

/// Post the upscaled pixels and diagnostics.
fn post_success(generation: f64, upscaled: &Upscaled) {
    let diagnostics_json = match diagnostics_json(&upscaled.diagnostics) {
        Ok(json) => json,
        Err(e) => {
            post_error(generation, &e);
            return;
        }
    };

    let (response, set) = new_reply(generation, "complete");
    set("ok", &JsValue::from_bool(true));
    set(
        "width",
        &JsValue::from_f64(f64::from(upscaled.image.width())),
    );
    set(
        "height",
        &JsValue::from_f64(f64::from(upscaled.image.height())),
    );
    set(
        "pixels",
        &js_sys::Uint8Array::from(upscaled.image.samples()),
    );
    set("diagnosticsJson", &JsValue::from_str(&diagnostics_json));
    post(&response);
}

/// Post a failure (or cancellation) reply.
fn post_error(generation: f64, error: &PipelineError) {
    let error_json = serde_json::to_string(error)
        .unwrap_or_else(|ser_err| format!("\"serialization error: {ser_err}\""));
    let (response, set) = new_reply(generation, "complete");
    set("ok", &JsValue::from_bool(false));
    set("errorJson", &JsValue::from_str(&error_json));
    post(&response);
}
