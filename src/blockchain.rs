// Thin re-export module: the chain responsibilities are split into
// submodules — chain (tip tracking, submission, reorgs, assembly), state
// (UTXO/STXO index) and validation (transaction verdicts).

pub mod chain;
pub mod state;
pub mod validation;

pub use chain::*;
pub use state::*;
pub use validation::*;
