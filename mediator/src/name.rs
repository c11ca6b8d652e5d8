use crate::{Error, Message};
use log::debug;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Suffix appended to a request's event name to form its response event name.
pub const RESPONSE_SUFFIX: &str = "_response";

/// Wire names of a message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNames {
    /// The event name the message travels on.
    pub event: Arc<str>,
    /// The paired response event name, only used when the message is a request.
    pub response: Arc<str>,
}

impl EventNames {
    fn new(event: &str) -> Self {
        EventNames {
            event: Arc::from(event),
            response: Arc::from(format!("{}{}", event, RESPONSE_SUFFIX)),
        }
    }
}

#[derive(Default)]
struct Names {
    by_type: HashMap<TypeId, EventNames>,
    by_name: HashMap<Arc<str>, &'static str>,
}

/// Maps message types to their wire event names.
///
/// Each type is resolved once and cached. A name claimed by two different
/// types is rejected instead of silently sharing registrations.
#[derive(Default)]
pub struct NameResolver {
    names: Mutex<Names>,
}

impl NameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the event names of `M`.
    pub fn resolve<M: Message>(&self) -> crate::Result<EventNames> {
        let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(resolved) = names.by_type.get(&TypeId::of::<M>()) {
            return Ok(resolved.clone());
        }

        let type_name = std::any::type_name::<M>();
        let event = M::event_name();

        if event.is_empty() {
            return Err(Error::registration(format!(
                "`{}` resolves to an empty event name",
                type_name
            )));
        }

        if event.ends_with(RESPONSE_SUFFIX) {
            return Err(Error::registration(format!(
                "event name `{}` of `{}` ends with the reserved suffix `{}`",
                event, type_name, RESPONSE_SUFFIX
            )));
        }

        if let Some(owner) = names.by_name.get(event.as_ref()) {
            return Err(Error::registration(format!(
                "event name `{}` is claimed by both `{}` and `{}`",
                event, owner, type_name
            )));
        }

        let resolved = EventNames::new(&event);
        names.by_name.insert(resolved.event.clone(), type_name);
        names.by_type.insert(TypeId::of::<M>(), resolved.clone());

        debug!("resolved `{}` to event `{}`", type_name, resolved.event);
        Ok(resolved)
    }
}
