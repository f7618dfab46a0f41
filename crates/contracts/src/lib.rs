//! # Contracts
//!
//! Frozen interface contracts shared by every streamgate crate: the streamed
//! data model, the error taxonomy, the configuration tree and the traits the
//! services use to reach their external collaborators (store, bus, archive).
//! All business crates depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - All timestamps are wall-clock `DateTime<Utc>`
//! - Record timestamps come from the producer; server-generated messages
//!   (system/heartbeat, derived events) are stamped with `Utc::now()`

mod archive;
mod bus;
mod close;
mod collab;
mod config;
mod error;
mod event;
mod record;
mod snapshot;
mod store;

pub use archive::*;
pub use bus::*;
pub use close::CloseReason;
pub use collab::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use record::*;
pub use snapshot::*;
pub use store::*;
