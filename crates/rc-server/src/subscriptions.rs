//! Subscription manager.
//!
//! Sessions subscribe to property targets (resolved once, at subscribe time)
//! or to named events. One engine change hook is registered per
//! `(object, property)` no matter how many subscriptions share it; the hook is
//! registered with the first subscription and released with the last.
//! Hooks are only ever registered and unregistered on the engine thread.
//!
//! Change hooks run on the engine thread inside the job that caused the
//! change. Immediate subscriptions are encoded and queued right there, so a
//! command's own side-effect notifications are queued before its response.
//! Throttled subscriptions keep only the latest value and are drained by
//! [`SubscriptionManager::flush_throttled`].

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};
use rc_core::{ObjectRef, RcError, Result, SessionId, SubscriptionId, Value, ValueEncoder};
use rc_engine::{EngineContext, HookId, PropertyHandle, Reflection};
use tracing::{debug, warn};

use crate::metrics::{RC_NOTIFICATIONS_TOTAL, RC_SUBSCRIPTIONS_ACTIVE};
use crate::rpc::types::{Notification, RpcEvent};
use crate::websocket::connection::ClientSession;

/// How changes reach the subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Push every observed change.
    Immediate,
    /// Push at most once per interval, carrying the latest value.
    Throttled(Duration),
}

impl DeliveryMode {
    /// Parse the `mode` / `intervalMs` request parameters.
    pub fn parse(mode: Option<&str>, interval_ms: Option<u64>) -> Result<Self> {
        match (mode.unwrap_or("immediate"), interval_ms) {
            ("immediate", _) => Ok(Self::Immediate),
            ("throttled", Some(ms)) if ms > 0 => Ok(Self::Throttled(Duration::from_millis(ms))),
            ("throttled", _) => Err(RcError::invalid_request("throttled mode needs a positive 'intervalMs'")),
            (other, _) => Err(RcError::invalid_request(format!("unknown delivery mode '{other}'"))),
        }
    }

    fn to_value(self) -> Value {
        match self {
            Self::Immediate => Value::map([("mode", Value::from("immediate"))]),
            Self::Throttled(interval) => Value::map([
                ("mode", Value::from("throttled")),
                (
                    "intervalMs",
                    Value::Int(i64::try_from(interval.as_millis()).unwrap_or(i64::MAX)),
                ),
            ]),
        }
    }
}

/// What a subscription observes.
#[derive(Clone, Debug, PartialEq)]
pub enum SubscriptionTarget {
    /// A property slot, fixed to the object it resolved to.
    Property {
        /// Resolved handle.
        handle: PropertyHandle,
        /// Address the client used; echoed in notifications.
        label: String,
    },
    /// A named event (`object.destroyed`, `preset.modified`).
    Event {
        /// Event kind.
        kind: String,
    },
}

impl SubscriptionTarget {
    fn label(&self) -> &str {
        match self {
            Self::Property { label, .. } => label,
            Self::Event { kind } => kind,
        }
    }
}

type PropertyKey = (ObjectRef, String);

struct Subscription {
    session: SessionId,
    target: SubscriptionTarget,
    mode: DeliveryMode,
}

#[derive(Default)]
struct Throttle {
    last_sent: Option<Instant>,
    pending: Option<Value>,
}

#[derive(Default)]
struct State {
    subscriptions: IndexMap<SubscriptionId, Subscription>,
    by_property: HashMap<PropertyKey, Vec<SubscriptionId>>,
    hooks: HashMap<PropertyKey, HookId>,
    by_event: HashMap<String, Vec<SubscriptionId>>,
    throttles: HashMap<SubscriptionId, Throttle>,
}

impl State {
    /// Drop a subscription from every index. Returns the hook to release
    /// when it was the last one on its property.
    fn remove(&mut self, id: &SubscriptionId) -> Option<HookId> {
        let sub = self.subscriptions.shift_remove(id)?;
        let _ = self.throttles.remove(id);
        match sub.target {
            SubscriptionTarget::Property { handle, .. } => {
                let key = (handle.object, handle.property);
                let now_empty = self.by_property.get_mut(&key).is_some_and(|ids| {
                    ids.retain(|s| s != id);
                    ids.is_empty()
                });
                if now_empty {
                    let _ = self.by_property.remove(&key);
                    return self.hooks.remove(&key);
                }
            }
            SubscriptionTarget::Event { kind } => {
                if let Some(ids) = self.by_event.get_mut(&kind) {
                    ids.retain(|s| s != id);
                    if ids.is_empty() {
                        let _ = self.by_event.remove(&kind);
                    }
                }
            }
        }
        None
    }
}

struct Delivery {
    session: SessionId,
    subscription: SubscriptionId,
    envelope: Value,
}

/// Tracks subscriptions and delivers notifications to session outboxes.
pub struct SubscriptionManager {
    state: Mutex<State>,
    sessions: RwLock<HashMap<SessionId, Arc<ClientSession>>>,
    encoder: Arc<dyn ValueEncoder>,
    this: Weak<Self>,
}

impl SubscriptionManager {
    /// Create a manager encoding pushes with `encoder`.
    pub fn new(encoder: Arc<dyn ValueEncoder>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            state: Mutex::new(State::default()),
            sessions: RwLock::new(HashMap::new()),
            encoder,
            this: this.clone(),
        })
    }

    /// Make a session eligible for subscriptions.
    pub fn register_session(&self, session: Arc<ClientSession>) {
        let _ = self.sessions.write().insert(session.id.clone(), session);
    }

    /// Open sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Look up an open session.
    pub fn session(&self, id: &SessionId) -> Option<Arc<ClientSession>> {
        self.sessions.read().get(id).cloned()
    }

    /// Active subscriptions across all sessions.
    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Number of `(object, property)` pairs with a live hook.
    pub fn hooked_properties(&self) -> usize {
        self.state.lock().hooks.len()
    }

    /// Add a subscription. Runs on the engine thread.
    pub fn subscribe(
        &self,
        engine: &mut dyn Reflection,
        session: &SessionId,
        target: SubscriptionTarget,
        mode: DeliveryMode,
    ) -> Result<SubscriptionId> {
        // close_session drops the session before taking `state`, so checking
        // under the lock cannot miss a teardown
        let mut state = self.state.lock();
        if !self.sessions.read().contains_key(session) {
            return Err(RcError::SessionClosed);
        }
        let id = SubscriptionId::new();

        match &target {
            SubscriptionTarget::Property { handle, .. } => {
                if !engine.is_alive(&handle.object) {
                    return Err(RcError::StaleReference {
                        object: handle.object.token(),
                    });
                }
                let key = (handle.object.clone(), handle.property.clone());
                if !state.hooks.contains_key(&key) {
                    let hook = engine.register_change_hook(&handle.object, &handle.property, self.change_hook());
                    debug!(object = %handle.object, property = %handle.property, %hook, "change hook registered");
                    let _ = state.hooks.insert(key.clone(), hook);
                }
                state.by_property.entry(key).or_default().push(id.clone());
            }
            SubscriptionTarget::Event { kind } => {
                state.by_event.entry(kind.clone()).or_default().push(id.clone());
            }
        }
        if matches!(mode, DeliveryMode::Throttled(_)) {
            let _ = state.throttles.insert(id.clone(), Throttle::default());
        }
        debug!(subscription_id = %id, session_id = %session, target = target.label(), "subscribed");
        let _ = state.subscriptions.insert(
            id.clone(),
            Subscription {
                session: session.clone(),
                target,
                mode,
            },
        );
        gauge!(RC_SUBSCRIPTIONS_ACTIVE).set(count_f64(state.subscriptions.len()));
        Ok(id)
    }

    /// Remove one of `session`'s subscriptions. Runs on the engine thread.
    pub fn unsubscribe(&self, engine: &mut dyn Reflection, session: &SessionId, id: &SubscriptionId) -> Result<()> {
        let hook = {
            let mut state = self.state.lock();
            match state.subscriptions.get(id) {
                Some(sub) if &sub.session == session => {}
                _ => {
                    return Err(RcError::not_found(format!("subscription '{id}' not found")));
                }
            }
            let hook = state.remove(id);
            gauge!(RC_SUBSCRIPTIONS_ACTIVE).set(count_f64(state.subscriptions.len()));
            hook
        };
        if let Some(hook) = hook {
            engine.unregister_change_hook(hook);
            debug!(%hook, "change hook released");
        }
        debug!(subscription_id = %id, "unsubscribed");
        Ok(())
    }

    /// Describe `session`'s subscriptions.
    pub fn list(&self, session: &SessionId) -> Vec<Value> {
        self.state
            .lock()
            .subscriptions
            .iter()
            .filter(|(_, sub)| &sub.session == session)
            .map(|(id, sub)| {
                let mut entries = vec![
                    ("id", Value::from(id.as_str())),
                    ("target", Value::from(sub.target.label())),
                ];
                if let SubscriptionTarget::Property { handle, .. } = &sub.target {
                    entries.push(("object", Value::Object(handle.object.clone())));
                }
                let mut out = Value::map(entries);
                if let (Value::Map(out), Value::Map(mode)) = (&mut out, sub.mode.to_value()) {
                    out.extend(mode);
                }
                out
            })
            .collect()
    }

    /// Forget a session and every subscription it holds, in one step.
    ///
    /// Returns the hooks no longer needed; release them on the engine thread
    /// (see [`release_hooks`](Self::release_hooks)).
    pub fn close_session(&self, session: &SessionId) -> Vec<HookId> {
        let removed = self.sessions.write().remove(session);
        let mut state = self.state.lock();
        let ids: Vec<SubscriptionId> = state
            .subscriptions
            .iter()
            .filter(|(_, sub)| &sub.session == session)
            .map(|(id, _)| id.clone())
            .collect();
        let hooks: Vec<HookId> = ids.iter().filter_map(|id| state.remove(id)).collect();
        gauge!(RC_SUBSCRIPTIONS_ACTIVE).set(count_f64(state.subscriptions.len()));
        drop(state);

        if let Some(session) = removed {
            session.close();
        }
        debug!(session_id = %session, subscriptions = ids.len(), hooks = hooks.len(), "session subscriptions removed");
        hooks
    }

    /// Close `session` and release its hooks on the engine thread without
    /// waiting for the release to finish.
    pub fn teardown_session(&self, engine: &EngineContext, session: &SessionId) {
        let hooks = self.close_session(session);
        if hooks.is_empty() {
            return;
        }
        // fire and forget; the receiver is dropped
        let _ = engine.submit(move |engine| {
            for hook in hooks {
                engine.unregister_change_hook(hook);
            }
            Ok(())
        });
    }

    /// Release hooks returned by [`close_session`](Self::close_session).
    pub fn release_hooks(engine: &mut dyn Reflection, hooks: Vec<HookId>) {
        for hook in hooks {
            engine.unregister_change_hook(hook);
        }
    }

    /// Handle a property change. Called by engine change hooks.
    pub fn notify(&self, object: &ObjectRef, property: &str, value: &Value) {
        let key = (object.clone(), property.to_owned());
        let deliveries = {
            let mut state = self.state.lock();
            let State {
                subscriptions,
                by_property,
                throttles,
                ..
            } = &mut *state;
            let Some(ids) = by_property.get(&key) else {
                return;
            };
            let mut deliveries = Vec::new();
            for id in ids {
                let Some(sub) = subscriptions.get(id) else {
                    continue;
                };
                let SubscriptionTarget::Property { handle, label } = &sub.target else {
                    continue;
                };
                let Some(slot) = value.at(&handle.segments) else {
                    continue;
                };
                match sub.mode {
                    DeliveryMode::Immediate => deliveries.push(Delivery {
                        session: sub.session.clone(),
                        subscription: id.clone(),
                        envelope: Notification {
                            subscription: id.clone(),
                            target: label.clone(),
                            value: slot.clone(),
                        }
                        .to_value(),
                    }),
                    DeliveryMode::Throttled(_) => {
                        throttles.entry(id.clone()).or_default().pending = Some(slot.clone());
                    }
                }
            }
            deliveries
        };
        self.deliver(deliveries);
    }

    /// Push an event to every subscriber of `kind`.
    pub fn publish_event(&self, kind: &str, payload: &Value) {
        let deliveries: Vec<Delivery> = {
            let state = self.state.lock();
            let Some(ids) = state.by_event.get(kind) else {
                return;
            };
            ids.iter()
                .filter_map(|id| state.subscriptions.get(id).map(|sub| (id, sub)))
                .map(|(id, sub)| Delivery {
                    session: sub.session.clone(),
                    subscription: id.clone(),
                    envelope: RpcEvent {
                        subscription: Some(id.clone()),
                        event: kind.to_owned(),
                        payload: payload.clone(),
                    }
                    .to_value(),
                })
                .collect()
        };
        self.deliver(deliveries);
    }

    /// Deliver throttled values whose interval has elapsed at `now`.
    ///
    /// Returns how many notifications were queued.
    pub fn flush_throttled(&self, now: Instant) -> usize {
        let deliveries: Vec<Delivery> = {
            let mut state = self.state.lock();
            let State {
                subscriptions,
                throttles,
                ..
            } = &mut *state;
            let mut out = Vec::new();
            for (id, throttle) in throttles.iter_mut() {
                let Some(sub) = subscriptions.get(id) else {
                    continue;
                };
                let DeliveryMode::Throttled(interval) = sub.mode else {
                    continue;
                };
                let due = throttle
                    .last_sent
                    .is_none_or(|last| now.saturating_duration_since(last) >= interval);
                if !due {
                    continue;
                }
                let Some(value) = throttle.pending.take() else {
                    continue;
                };
                throttle.last_sent = Some(now);
                out.push(Delivery {
                    session: sub.session.clone(),
                    subscription: id.clone(),
                    envelope: Notification {
                        subscription: id.clone(),
                        target: sub.target.label().to_owned(),
                        value,
                    }
                    .to_value(),
                });
            }
            out
        };
        let count = deliveries.len();
        self.deliver(deliveries);
        count
    }

    fn deliver(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            let Some(session) = self.session(&delivery.session) else {
                continue;
            };
            if session.is_closed() {
                continue;
            }
            let format = session.format();
            let bytes = match self.encoder.encode(&delivery.envelope, format) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(
                        subscription_id = %delivery.subscription,
                        %format,
                        error = %e,
                        "notification could not be encoded, skipped"
                    );
                    continue;
                }
            };
            if session.push_notification(delivery.subscription.as_str(), bytes, format) {
                counter!(RC_NOTIFICATIONS_TOTAL).increment(1);
            }
        }
    }

    fn change_hook(&self) -> rc_engine::ChangeHook {
        let this = self.this.clone();
        Arc::new(move |object: &ObjectRef, property: &str, value: &Value| {
            if let Some(manager) = this.upgrade() {
                manager.notify(object, property, value);
            }
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn count_f64(n: usize) -> f64 {
    n as f64
}
