//! Librería raíz de fixtureflow.
//!
//! Este crate arma las piezas para uso directo:
//! - Expone `seed` con la jornada de demostración que consumen el binario
//!   `main-core` y las pruebas de integración de la raíz.
//! - El motor vive en los crates del workspace (`fixture-domain`,
//!   `fixture-core`, `fixture-persistence`).

pub mod seed;
