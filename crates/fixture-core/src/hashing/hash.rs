//! Hash helpers – abstracción para poder cambiar de algoritmo sin tocar el
//! resto del motor.

use blake3::Hasher;
use serde_json::Value;

use super::canonical_json::to_canonical_json;

/// Hashea un string y devuelve hex (64 caracteres).
pub fn hash_str(input: &str) -> String {
    let mut h = Hasher::new();
    h.update(input.as_bytes());
    h.finalize().to_hex().to_string()
}

/// Hashea un valor JSON por su forma canónica. Dos valores estructuralmente
/// iguales producen el mismo hash sin importar el orden de claves.
pub fn hash_value(value: &Value) -> String {
    hash_str(&to_canonical_json(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_value_is_stable_under_key_reordering() {
        let a = json!({"x": [1, 2], "y": "z"});
        let b = json!({"y": "z", "x": [1, 2]});
        assert_eq!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn hash_str_is_64_hex_chars() {
        let h = hash_str("fixture");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
