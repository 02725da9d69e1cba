pub mod aggregation;
pub mod calculator;
pub mod composer;
pub mod importer;
pub mod ledger_view;

pub use composer::{ComposerSession, SessionSetup};
pub use importer::{ImportOutcome, ImportState};
pub use ledger_view::{ChargeLedgerView, LedgerGeneration};
