//! Deep-merge of JSON config layers.

use serde_json::{Map, Value};

/// Overlay `upper` onto `base`. Objects merge key by key; any other value
/// replaces what was there.
pub(super) fn overlay(base: &mut Value, upper: &Value) {
    if let (Value::Object(base_map), Value::Object(upper_map)) = (&mut *base, upper) {
        for (key, value) in upper_map {
            match base_map.get_mut(key) {
                Some(slot) => overlay(slot, value),
                None => {
                    base_map.insert(key.clone(), value.clone());
                }
            }
        }
        return;
    }
    *base = upper.clone();
}

/// Overlay `upper` onto `base`, leaving every leaf named in `locked` untouched.
///
/// `locked` mirrors the requirements layer: an object there descends into the
/// matching section, any other value pins that key.
pub(super) fn overlay_locked(base: &mut Value, upper: &Value, locked: Option<&Value>) {
    let locked_map = match locked {
        None => return overlay(base, upper),
        Some(Value::Object(map)) => map,
        Some(_) => return,
    };
    let (Value::Object(base_map), Value::Object(upper_map)) = (&mut *base, upper) else {
        return;
    };
    for (key, value) in upper_map {
        match locked_map.get(key) {
            None => overlay_entry(base_map, key, value),
            Some(nested @ Value::Object(_)) => {
                let slot = base_map
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                overlay_locked(slot, value, Some(nested));
            }
            Some(_) => {}
        }
    }
}

fn overlay_entry(base_map: &mut Map<String, Value>, key: &str, value: &Value) {
    match base_map.get_mut(key) {
        Some(slot) => overlay(slot, value),
        None => {
            base_map.insert(key.to_string(), value.clone());
        }
    }
}
