//! Ownership resolution of resources and the incidents opened against them.
//!
//! Ownership is resolved from the resource on every call and is never cached,
//! so a transfer of the resource takes effect immediately. Resources which
//! aren't owned by the caller are reported as not found, so that callers
//! can't probe for the existence of other accounts' resources.
use crate::{Caller, Error, Result, Store};
use models::{AccountId, Id, Incident, Resource, ResourceKind};

/// Returns the owner of the resource, or NotFound if it doesn't exist.
pub async fn resolve_owner(
    store: &dyn Store,
    kind: ResourceKind,
    resource_id: Id,
) -> Result<AccountId> {
    match store.fetch_resource(kind, resource_id).await? {
        Some(resource) => Ok(resource.owner_id),
        None => Err(Error::NotFound("resource")),
    }
}

/// Verifies the caller may act on the resource.
///
/// Users must own it. The system is trusted and may act on resources which
/// no longer exist, in which case None is returned.
pub async fn authorize_resource(
    store: &dyn Store,
    caller: Caller,
    kind: ResourceKind,
    resource_id: Id,
) -> Result<Option<Resource>> {
    let resource = store.fetch_resource(kind, resource_id).await?;

    match (caller, resource) {
        (Caller::System, resource) => Ok(resource),
        (Caller::User(account), Some(resource)) if resource.owner_id == account => {
            Ok(Some(resource))
        }
        (Caller::User(_), _) => Err(Error::NotFound("resource")),
    }
}

/// Loads the incident and verifies the caller may act on it.
pub async fn authorize_incident(
    store: &dyn Store,
    caller: Caller,
    incident_id: Id,
) -> Result<(Incident, Option<Resource>)> {
    let Some(incident) = store.fetch_incident(incident_id).await? else {
        return Err(Error::NotFound("incident"));
    };

    match authorize_resource(store, caller, incident.kind, incident.resource_id).await {
        Ok(resource) => Ok((incident, resource)),
        Err(Error::NotFound(_)) => Err(Error::NotFound("incident")),
        Err(err) => Err(err),
    }
}
