use crate::store::{ResourceType, ScopeKind, UserKind};

/// The engine's view of an inbound call. Built by the enforcement
/// middleware from the wire request, or assembled directly by the
/// authorization service for business-layer re-checks (e.g.
/// `self_roles`, widget viewer-on-delete).
#[derive(Debug, Clone, Default)]
pub struct OperationRequest {
    pub entity: Option<String>,
    pub operation: String,
    pub scope: Option<ScopeKind>,
    pub caller_id: String,
    pub caller_user_type: UserKind,
    pub namespace: Option<String>,
    pub resource_id: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub parent_resource_id: Option<String>,
    /// The role being granted or revoked, when known — drives the
    /// widget viewer-redirection rule in `NormalizeRequest`.
    pub role: Option<String>,
}

/// Outcome of resolving a policy. Unknown (entity, operation) pairs
/// are denied rather than erroring.
pub enum ResolvedPolicy<'a> {
    Known(&'a crate::catalog::OperationPolicy),
    Unknown,
}
