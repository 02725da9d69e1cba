pub mod invoicing;
pub mod ledger;
pub mod parser;

pub use invoicing::{HttpInvoicingClient, InvoicePayload, InvoicingService};
pub use ledger::{HttpLedgerClient, LedgerService};
pub use parser::{DocumentParser, HttpParserClient};
