//! Puente WASM <-> JavaScript neutral respecto al framework.

use chrono::{TimeZone, Utc};
use serde_json::Value;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

/// Construye la agenda a partir de las tres colecciones crudas tal como
/// las entregan los endpoints, más la marca de tiempo (ms de época) que
/// ancla el corte entre próximas y pasadas.
#[wasm_bindgen]
pub fn construir_agenda(
    citas: JsValue,
    hechas: JsValue,
    canceladas: JsValue,
    anchor_ms: f64,
) -> Result<JsValue, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let citas = collection(citas, "citas")?;
    let hechas = collection(hechas, "hechas")?;
    let canceladas = collection(canceladas, "canceladas")?;

    let anchor = Utc
        .timestamp_millis_opt(anchor_ms as i64)
        .single()
        .ok_or_else(|| JsValue::from_str("Marca de tiempo fuera de rango"))?;

    let snapshot = citas_normalize::build_agenda(&citas, &hechas, &canceladas, anchor);

    to_value(&snapshot)
        .map_err(|err| JsValue::from_str(&format!("No se pudo serializar la agenda: {err}")))
}

fn collection(input: JsValue, name: &str) -> Result<Vec<Value>, JsValue> {
    if input.is_null() || input.is_undefined() {
        return Ok(Vec::new());
    }

    from_value::<Vec<Value>>(input)
        .map_err(|err| JsValue::from_str(&format!("No se pudo leer la colección {name}: {err}")))
}
