//! WearLink Pairing
//!
//! Negotiates a single confirmed partner per player slot.
//!
//! ## Pairing Protocol
//!
//! 1. **Request**: Host publishes `PAIR_REQUEST` as shared state, since it
//!    does not know the destination yet
//! 2. **Response**: A controller that saw the request sends `PAIR_RESPONSE`
//!    directly to the host
//! 3. **Acceptance**: Host confirms the first responder with `PAIR_ACCEPTED`;
//!    later responders are rejected on arrival
//! 4. **Paired**: Both sides now use direct messages for that slot
//!
//! Either side ends a pairing with `DISCONNECT`. Rejections are always
//! delivered to listeners, even from peers that were never paired.

pub mod handler;
pub mod state;

pub use handler::{PairingAction, PairingHandler};
pub use state::{SlotRecord, SlotState};
