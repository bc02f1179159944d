//! Idempotent create-or-reuse-or-update against the entity store
//!
//! The store has no native upsert, so every entity goes through the same
//! protocol:
//!
//! 1. Query the kind's collection with a natural-key `$filter`
//! 2. No match: `POST` the entity (**created**)
//! 3. A match whose canonical attributes equal the local ones: reuse its id
//!    without any mutating request (**reused**)
//! 4. A match that differs: `PATCH` it (**updated**), except for kinds whose
//!    descriptor forbids in-place updates, which get a fresh record instead
//!
//! Kinds differ only in their [`KindDescriptor`]. Nested kinds are queried
//! and created below their parent's link, which the caller supplies.

pub mod filter;
pub mod kind;

#[cfg(test)]
pub mod tests;

use crate::app::adapters::http::{HttpRequest, HttpResponse, HttpTransport, Method};
use crate::app::models::RemoteRef;
use crate::constants::{IOT_ID, IOT_SELF_LINK};
use crate::{Error, Result};
use filter::{
    canonical_matches, canonical_subset, collection_url, entity_url, id_from_link,
    natural_key_filter, nested_collection_url,
};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, debug, info};

pub use kind::{EntityKind, KindDescriptor, KeyField, LiteralType, ParentScope};

const STATUS_OK: u16 = 200;
const STATUS_CREATED: u16 = 201;
const STATUS_NO_CONTENT: u16 = 204;

/// A local entity to make durable remotely
#[derive(Debug, Clone, PartialEq)]
pub struct LocalEntity {
    pub kind: EntityKind,

    /// Attributes in the store's field vocabulary, including any links to
    /// related entities required on creation
    pub attributes: Map<String, Value>,

    /// Parent entity for nested kinds
    pub parent: Option<RemoteRef>,
}

impl LocalEntity {
    pub fn new(kind: EntityKind, attributes: Map<String, Value>) -> Self {
        Self {
            kind,
            attributes,
            parent: None,
        }
    }

    /// Scope this entity below `parent`
    pub fn under(mut self, parent: RemoteRef) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.attributes.get("name").and_then(Value::as_str)
    }
}

/// How an entity was made durable
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// No match existed; a record was created
    Created(RemoteRef),
    /// An identical record existed; nothing was written
    Reused(RemoteRef),
    /// A differing record existed and was patched
    Updated(RemoteRef),
}

impl ReconcileOutcome {
    pub fn remote(&self) -> &RemoteRef {
        match self {
            ReconcileOutcome::Created(r)
            | ReconcileOutcome::Reused(r)
            | ReconcileOutcome::Updated(r) => r,
        }
    }

    pub fn into_remote(self) -> RemoteRef {
        match self {
            ReconcileOutcome::Created(r)
            | ReconcileOutcome::Reused(r)
            | ReconcileOutcome::Updated(r) => r,
        }
    }

    /// Whether a mutating request was issued
    pub fn wrote(&self) -> bool {
        !matches!(self, ReconcileOutcome::Reused(_))
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (action, remote) = match self {
            ReconcileOutcome::Created(r) => ("created", r),
            ReconcileOutcome::Reused(r) => ("reused", r),
            ReconcileOutcome::Updated(r) => ("updated", r),
        };
        write!(f, "{} {}", action, remote.self_link)
    }
}

/// Reconciles local entities with one entity store
#[derive(Clone)]
pub struct EntityReconciler {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    span: tracing::Span,
}

impl EntityReconciler {
    /// Create a reconciler for the store rooted at `base_url`
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            span: tracing::Span::current(),
        }
    }

    /// Replace the logging span events are emitted in
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make `entity` durable remotely exactly once
    ///
    /// Unexpected statuses from the store are fatal for this entity and
    /// returned with the offending response attached.
    pub async fn reconcile(&self, entity: &LocalEntity) -> Result<ReconcileOutcome> {
        self.reconcile_inner(entity)
            .instrument(self.span.clone())
            .await
    }

    async fn reconcile_inner(&self, entity: &LocalEntity) -> Result<ReconcileOutcome> {
        let descriptor = entity.kind.descriptor();
        let collection = self.collection_for(entity)?;
        let filter = natural_key_filter(&descriptor, &entity.attributes)?;

        let matches = self.query(&collection, &filter).await?;
        debug!(
            "{} filter [{}] matched {} record(s)",
            entity.kind,
            filter,
            matches.len()
        );

        let Some(existing) = matches.first() else {
            let remote = self.create(&collection, entity).await?;
            info!("{} created at {}", entity.kind, remote.self_link);
            return Ok(ReconcileOutcome::Created(remote));
        };

        // Kinds that never patch accumulate records, so any of them may match
        if !descriptor.update_allowed {
            if let Some(same) = matches
                .iter()
                .find(|record| canonical_matches(&descriptor, &entity.attributes, record))
            {
                let same_ref = remote_ref_of(same, &collection)?;
                debug!("{} reused at {}", entity.kind, same_ref.self_link);
                return Ok(ReconcileOutcome::Reused(same_ref));
            }

            let remote = self.create(&collection, entity).await?;
            info!(
                "{} matches none of {} record(s) and cannot be patched; created {}",
                entity.kind,
                matches.len(),
                remote.self_link
            );
            return Ok(ReconcileOutcome::Created(remote));
        }

        let existing_ref = remote_ref_of(existing, &collection)?;

        if canonical_matches(&descriptor, &entity.attributes, existing) {
            debug!("{} reused at {}", entity.kind, existing_ref.self_link);
            return Ok(ReconcileOutcome::Reused(existing_ref));
        }

        self.update(&existing_ref, entity).await?;
        info!("{} updated at {}", entity.kind, existing_ref.self_link);
        Ok(ReconcileOutcome::Updated(existing_ref))
    }

    /// Collection URL an entity is queried and created in
    pub fn collection_for(&self, entity: &LocalEntity) -> Result<String> {
        let descriptor = entity.kind.descriptor();
        match descriptor.parent {
            ParentScope::TopLevel => Ok(collection_url(&self.base_url, descriptor.collection)),
            ParentScope::Nested(parent_kind) => {
                let parent = entity.parent.as_ref().ok_or_else(|| {
                    Error::missing_remote_link(format!(
                        "{} parent of {} '{}'",
                        parent_kind,
                        entity.kind,
                        entity.name().unwrap_or("unnamed")
                    ))
                })?;
                Ok(nested_collection_url(
                    &parent.self_link,
                    &parent.id,
                    descriptor.collection,
                ))
            }
        }
    }

    async fn query(&self, collection: &str, filter: &str) -> Result<Vec<Map<String, Value>>> {
        let request = HttpRequest::get(collection).with_query("$filter", filter);
        let response = self.transport.send(request).await?;
        if response.status != STATUS_OK {
            return Err(protocol_error(Method::Get, collection, &response));
        }

        let body = response.json()?.unwrap_or(Value::Null);
        let values = body
            .get("value")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::remote_protocol(
                    Method::Get.to_string(),
                    collection,
                    response.status,
                    "response has no 'value' array",
                )
            })?;

        Ok(values
            .iter()
            .filter_map(|v| v.as_object().cloned())
            .collect())
    }

    async fn create(&self, collection: &str, entity: &LocalEntity) -> Result<RemoteRef> {
        let body = Value::Object(entity.attributes.clone());
        let response = self
            .transport
            .send(HttpRequest::post(collection, body))
            .await?;

        if response.status != STATUS_CREATED && response.status != STATUS_OK {
            return Err(protocol_error(Method::Post, collection, &response));
        }

        if let Some(Value::Object(created)) = response.json()? {
            if created.contains_key(IOT_ID) {
                return remote_ref_of(&created, collection);
            }
        }

        let Some(location) = response.header("location").map(str::to_string) else {
            return Err(Error::remote_protocol(
                Method::Post.to_string(),
                collection,
                response.status,
                "created entity returned neither an identifier nor a Location header",
            ));
        };

        self.read_created(&location).await
    }

    /// Recover identifiers of a record created with an empty response body
    async fn read_created(&self, location: &str) -> Result<RemoteRef> {
        let response = self.transport.send(HttpRequest::get(location)).await?;
        if response.status != STATUS_OK {
            return Err(protocol_error(Method::Get, location, &response));
        }

        let id = response
            .json()?
            .and_then(|body| body.get(IOT_ID).cloned())
            .or_else(|| id_from_link(location))
            .ok_or_else(|| {
                Error::remote_protocol(
                    Method::Get.to_string(),
                    location,
                    response.status,
                    "created entity has no identifier",
                )
            })?;

        Ok(RemoteRef {
            id,
            self_link: location.to_string(),
        })
    }

    async fn update(&self, existing: &RemoteRef, entity: &LocalEntity) -> Result<()> {
        let body = Value::Object(canonical_subset(
            &entity.kind.descriptor(),
            &entity.attributes,
        ));
        let response = self
            .transport
            .send(HttpRequest::patch(&existing.self_link, body))
            .await?;

        match response.status {
            STATUS_OK | STATUS_NO_CONTENT => Ok(()),
            _ => Err(protocol_error(Method::Patch, &existing.self_link, &response)),
        }
    }
}

/// Identifier and link of a remote record, deriving the link if absent
fn remote_ref_of(record: &Map<String, Value>, collection: &str) -> Result<RemoteRef> {
    let id = record.get(IOT_ID).cloned().ok_or_else(|| {
        Error::remote_protocol(
            Method::Get.to_string(),
            collection,
            STATUS_OK,
            "record has no identifier",
        )
    })?;
    let self_link = record
        .get(IOT_SELF_LINK)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| entity_url(collection, &id));

    Ok(RemoteRef { id, self_link })
}

fn protocol_error(method: Method, url: &str, response: &HttpResponse) -> Error {
    Error::remote_protocol(
        method.to_string(),
        url,
        response.status,
        response.body_excerpt(),
    )
}
