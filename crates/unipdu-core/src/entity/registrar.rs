// ── Entity registrar ──
//
// Creates one `SwitchEntity` per (descriptor, object) pair: once for
// everything already in the store, then again whenever an object is
// added or the options change.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::select_all;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use super::switch::{SwitchDescriptor, SwitchEntity};
use crate::dispatch::Signal;
use crate::session::Session;
use crate::store::{ItemAction, ItemEvent, ObjectKind};

/// Host callback that receives freshly created entities.
pub type AddEntities = Arc<dyn Fn(Vec<SwitchEntity>) + Send + Sync>;

/// Register every descriptor against the session's store.
///
/// Entities are created for existing objects right away. A background
/// task keeps watching for added objects and `OptionsUpdated` signals for
/// as long as the session runs. No object ever gets two entities for the
/// same descriptor kind.
pub fn register_platform_add_entities(
    session: &Session,
    descriptors: &[Arc<SwitchDescriptor>],
    add_entities: AddEntities,
) {
    let descriptors: Vec<Arc<SwitchDescriptor>> = descriptors.to_vec();

    // Subscribe before the initial scan so nothing added in between is lost.
    let mut item_rxs: Vec<_> = descriptors
        .iter()
        .map(|d| (Arc::clone(d), session.store().subscribe(d.kind)))
        .collect();
    let mut signals = session.dispatcher().subscribe();

    let mut registered = Registered::default();
    let created = scan(session, &descriptors);
    if !created.is_empty() {
        info!(count = created.len(), "registered switch entities");
        registered.track(&created);
        add_entities(created);
    }

    let session_task = session.clone();
    let cancel = session.cancellation().clone();
    session.track(tokio::spawn(async move {
        let session = session_task;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                signal = signals.recv() => match signal {
                    Ok(Signal::OptionsUpdated) => {
                        debug!("options updated, rescanning");
                        rescan(&session, &descriptors, &add_entities, &mut registered);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "registrar signal receiver lagged, rescanning");
                        rescan(&session, &descriptors, &add_entities, &mut registered);
                    }
                    Err(RecvError::Closed) => break,
                },
                item = next_item(&mut item_rxs) => match item {
                    Some(Ok((descriptor, item))) => match item.action {
                        ItemAction::Added => {
                            let created = create(&session, &descriptor, [item.key]);
                            registered.track(&created);
                            emit(&add_entities, created);
                        }
                        ItemAction::Removed => registered.remove(&session, descriptor.kind, &item.key),
                        ItemAction::Changed => {}
                    },
                    Some(Err(n)) => {
                        warn!(skipped = n, "registrar item receiver lagged, rescanning");
                        rescan(&session, &descriptors, &add_entities, &mut registered);
                    }
                    None => break,
                },
            }
        }
        debug!("registrar stopped");
    }));
}

/// Entities this registrar created, by `(kind, object id)`.
///
/// Removal goes through here so the known entry is released in item-event
/// order: a remove followed by a re-add always yields a fresh entity.
#[derive(Default)]
struct Registered {
    entities: HashMap<(ObjectKind, String), SwitchEntity>,
}

impl Registered {
    fn track(&mut self, created: &[SwitchEntity]) {
        for entity in created {
            self.entities.insert(
                (entity.kind(), entity.object_id().to_owned()),
                entity.clone(),
            );
        }
    }

    fn remove(&mut self, session: &Session, kind: ObjectKind, id: &str) {
        if let Some(entity) = self.entities.remove(&(kind, id.to_owned())) {
            debug!(unique_id = entity.unique_id(), "object removed");
            entity.mark_removed();
        }
        session.release(kind, id);
    }

    /// Drop entities whose object vanished while an item receiver lagged.
    fn prune(&mut self, session: &Session) {
        let gone: Vec<(ObjectKind, String)> = self
            .entities
            .keys()
            .filter(|(kind, id)| !session.store().ids(*kind).contains(id))
            .cloned()
            .collect();
        for (kind, id) in gone {
            self.remove(session, kind, &id);
        }
    }
}

/// Next `Added` or `Removed` item across all descriptor subscriptions.
///
/// `Some(Err(n))` reports a lag of `n` items; `None` means every
/// subscription closed.
async fn next_item(
    rxs: &mut [(Arc<SwitchDescriptor>, broadcast::Receiver<ItemEvent>)],
) -> Option<Result<(Arc<SwitchDescriptor>, ItemEvent), u64>> {
    if rxs.is_empty() {
        return std::future::pending().await;
    }

    loop {
        let futures = rxs
            .iter_mut()
            .map(|(descriptor, rx)| {
                let descriptor = Arc::clone(descriptor);
                Box::pin(async move { (descriptor, rx.recv().await) })
            })
            .collect::<Vec<_>>();
        let ((descriptor, result), _, _) = select_all(futures).await;

        match result {
            Ok(item) if item.action == ItemAction::Changed => {}
            Ok(item) => return Some(Ok((descriptor, item))),
            Err(RecvError::Lagged(n)) => return Some(Err(n)),
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Full re-scan: forget vanished objects, then add everything eligible.
fn rescan(
    session: &Session,
    descriptors: &[Arc<SwitchDescriptor>],
    add_entities: &AddEntities,
    registered: &mut Registered,
) {
    registered.prune(session);
    let created = scan(session, descriptors);
    registered.track(&created);
    emit(add_entities, created);
}

fn emit(add_entities: &AddEntities, entities: Vec<SwitchEntity>) {
    if !entities.is_empty() {
        add_entities(entities);
    }
}

/// Entities for every eligible object currently in the store.
fn scan(session: &Session, descriptors: &[Arc<SwitchDescriptor>]) -> Vec<SwitchEntity> {
    descriptors
        .iter()
        .flat_map(|descriptor| create(session, descriptor, session.store().ids(descriptor.kind)))
        .collect()
}

/// Entities for the given ids that are not yet known, allowed and
/// supported. Each id is claimed before its entity is built.
fn create(
    session: &Session,
    descriptor: &Arc<SwitchDescriptor>,
    ids: impl IntoIterator<Item = String>,
) -> Vec<SwitchEntity> {
    let mut entities = Vec::new();
    for id in ids {
        if session.is_known(descriptor.kind, &id)
            || !(descriptor.allowed_fn)(session, &id)
            || !(descriptor.supported_fn)(session, &id)
        {
            continue;
        }
        if !session.claim(descriptor.kind, &id) {
            continue;
        }

        let entity = SwitchEntity::new(session.clone(), Arc::clone(descriptor), id);
        entity.initiate_state();
        entity.spawn_listeners();
        debug!(unique_id = entity.unique_id(), key = descriptor.key, "created entity");
        entities.push(entity);
    }
    entities
}
