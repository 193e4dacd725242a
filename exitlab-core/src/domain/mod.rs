//! Domain types shared by the exit rules, the orchestrator and the ledger.

pub mod bar;
pub mod ids;
pub mod side;

pub use bar::Bar;
pub use ids::ConfigHash;
pub use side::{ParseError, PositionSide, TradeSignal};
