use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub fn repack(json: &str) -> Result<Vec<u8>, JsValue> {
    crate::repack_json(json).map_err(|e| JsValue::from_str(&e.to_string()))
}
