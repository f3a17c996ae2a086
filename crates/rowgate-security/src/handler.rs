//! Authorization handler capability

use futures::stream::{self, BoxStream, StreamExt};
use rowgate_common::{Result, Row, Session};
use rowgate_query::{Condition, ReferencedEntity, Restriction};

/// Lazily produced restrictions
///
/// Consumers may stop pulling early, so handlers should do per-entity work
/// inside the stream rather than up front.
pub type FilterStream<'a> = BoxStream<'a, Result<Restriction>>;

/// Decides which rows a session may touch
///
/// Each method yields zero or more restrictions. A restriction whose
/// predicate is the constant TRUE grants unrestricted access to its entity.
pub trait AuthorizationHandler: Send + Sync {
    fn before_select<'a>(
        &'a self,
        session: &'a Session,
        entities: &'a [ReferencedEntity],
        condition: Option<&'a Condition>,
    ) -> FilterStream<'a>;

    fn before_insert<'a>(
        &'a self,
        session: &'a Session,
        entity: &'a ReferencedEntity,
        values: &'a [Row],
    ) -> FilterStream<'a>;

    fn before_update<'a>(
        &'a self,
        session: &'a Session,
        entities: &'a [ReferencedEntity],
        condition: Option<&'a Condition>,
        changes: &'a Row,
    ) -> FilterStream<'a>;

    fn before_delete<'a>(
        &'a self,
        session: &'a Session,
        entities: &'a [ReferencedEntity],
        condition: Option<&'a Condition>,
    ) -> FilterStream<'a>;
}

/// Grants unrestricted access to every referenced entity
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AllowAll {
    fn allow_each(entities: &[ReferencedEntity]) -> FilterStream<'_> {
        stream::iter(entities)
            .map(|e| Ok(Restriction::allow(e.entity.clone())))
            .boxed()
    }
}

impl AuthorizationHandler for AllowAll {
    fn before_select<'a>(
        &'a self,
        _session: &'a Session,
        entities: &'a [ReferencedEntity],
        _condition: Option<&'a Condition>,
    ) -> FilterStream<'a> {
        Self::allow_each(entities)
    }

    fn before_insert<'a>(
        &'a self,
        _session: &'a Session,
        entity: &'a ReferencedEntity,
        _values: &'a [Row],
    ) -> FilterStream<'a> {
        Self::allow_each(std::slice::from_ref(entity))
    }

    fn before_update<'a>(
        &'a self,
        _session: &'a Session,
        entities: &'a [ReferencedEntity],
        _condition: Option<&'a Condition>,
        _changes: &'a Row,
    ) -> FilterStream<'a> {
        Self::allow_each(entities)
    }

    fn before_delete<'a>(
        &'a self,
        _session: &'a Session,
        entities: &'a [ReferencedEntity],
        _condition: Option<&'a Condition>,
    ) -> FilterStream<'a> {
        Self::allow_each(entities)
    }
}
