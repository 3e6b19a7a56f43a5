pub mod caller;

pub use caller::{require_authentication_header, Caller, OwnerClaimCaller};
