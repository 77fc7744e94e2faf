//! `dg-upstream` — everything that touches the upstream completion API's
//! wire format.
//!
//! - [`Forwarder`] sends a request body (as exact bytes) to the upstream and
//!   returns status, relayable headers, the logical message and the raw bytes.
//! - [`reconstruct`] folds a server-sent event stream back into the message
//!   the non-streamed endpoint would have returned.
//! - [`AgentAdapter`] + [`extract_turn`] map a completed assistant message to
//!   typed [`AgentAction`](dg_domain::action::AgentAction)s and token usage.

pub mod actions;
pub mod adapter;
pub mod forwarder;
pub mod reconstruct;
pub(crate) mod sse;
pub(crate) mod util;

pub use actions::{extract_turn, parse_usage, ExtractedTurn};
pub use adapter::AgentAdapter;
pub use forwarder::{interpret, Forwarder, RawResponse, UpstreamResponse};
pub use reconstruct::reconstruct_message;
pub use util::from_reqwest;
