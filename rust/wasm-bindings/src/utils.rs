use std::fmt::Display;
use wasm_bindgen::JsValue;

/// Set panic hook for better error messages in the browser
pub fn set_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Log `error` to the console and turn it into a JS exception value
pub(crate) fn js_error(context: &str, error: impl Display) -> JsValue {
    let message = format!("{}: {}", context, error);
    web_sys::console::error_1(&JsValue::from_str(&message));
    JsValue::from_str(&message)
}
