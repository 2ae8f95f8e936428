//! Derivación de sub-semillas a partir de la semilla maestra de la corrida.
//!
//! El motor no usa RNG: todo desempate "aleatorio" se deriva hasheando la
//! semilla maestra con una etiqueta de propósito y un identificador. Misma
//! semilla + misma etiqueta + mismo id => mismo valor, en cualquier proceso.

use blake3::Hasher;

/// Deriva un `u64` estable de `(semilla, etiqueta, id)`.
///
/// Los primeros 8 bytes del hash, big-endian. Las etiquetas separan usos
/// ("p2-tie", "p3-rotation") para que un mismo id no produzca el mismo
/// valor en contextos distintos.
pub fn sub_seed(master: &str, label: &str, id: i64) -> u64 {
    let mut h = Hasher::new();
    h.update(master.as_bytes());
    h.update(b":");
    h.update(label.as_bytes());
    h.update(b":");
    h.update(&id.to_be_bytes());
    let digest = h.finalize();
    let bytes = digest.as_bytes();
    u64::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]])
}
