mod descriptor;
mod key;
mod pending;

pub use descriptor::{AUTHORIZATION, RequestDescriptor, RequestOptions};
pub use key::{RequestKey, canonical_json};
pub use pending::{CancelSignal, PendingRegistry, PendingTicket};
pub(crate) use pending::PendingGuard;
