//! Parley Agents - the two negotiation policies
//!
//! A negotiation runs between a [`BuyerPolicy`] and a [`SellerPolicy`], each
//! bound to its side's context and backed by a completion provider. The
//! policies own their conversation histories; the run loop only moves final
//! turn texts between them.
//!
//! The buyer terminates the negotiation by emitting a decision sentinel
//! (`DECISION: ACCEPT $... - ...` or `DECISION: REJECT - ...`), parsed in
//! [`decision`]. An accepted price above the buyer's hard budget is never
//! honored: the outcome is forced to a rejection at parse time.

pub mod buyer;
pub mod decision;
pub mod policy;
pub mod prompts;
pub mod seller;

pub use buyer::{BuyerPolicy, BuyerReply};
pub use decision::parse_decision;
pub use policy::{AgentError, FragmentHook, Result};
pub use seller::SellerPolicy;
