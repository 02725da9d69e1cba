pub mod charge;
pub mod document;
pub mod line_item;
pub mod reconciliation;

pub use charge::{ApprovalStatus, ChargeRecord, Direction, InvoiceStatus};
pub use document::{DocumentTotals, InvoiceDocument};
pub use line_item::{InvoiceLineItem, LineItemEdit, UnitPrice};
pub use reconciliation::{ExternalReconciliationRecord, ParsedStatement};
