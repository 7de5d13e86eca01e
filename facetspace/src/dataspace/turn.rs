//! The context handed to every script.
//!
//! A [`Turn`] names the running actor and facet and whether the facet is
//! still being set up. Setup mode is for declaring endpoints, fields and
//! stop scripts; script mode (start scripts, event callbacks) is for sending
//! messages and spawning. Using a primitive in the wrong mode is an
//! [`ActorError`] at the call site.

use super::external::{BackgroundTask, ExternalHandle, ExternalSlot};
use super::{Dataspace, Field};
use crate::actor::{Action, Endpoint, Interest, Observer, Priority, Script, UpdateFn};
use crate::dataflow::ObservableProperty;
use crate::pattern::Pattern;
use crate::runtime::{ActorError, ActorResult};
use crate::term::{Assertion, Term};
use crate::types::{ActorId, EndpointId, EndpointRef, FacetId, FieldId};
use std::any::TypeId;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::trace;

/// A service actor started at most once per dataspace.
///
/// The type itself is the identity: activating the same type twice spawns
/// one actor.
pub trait Activatable: 'static {
    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }

    fn boot(turn: &mut Turn<'_>) -> ActorResult;
}

/// Execution context of one script in one facet.
pub struct Turn<'a> {
    pub(super) ds: &'a mut Dataspace,
    actor: ActorId,
    facet: FacetId,
    in_script: bool,
}

impl<'a> Turn<'a> {
    pub(crate) fn new(ds: &'a mut Dataspace, actor: ActorId, facet: FacetId, in_script: bool) -> Self {
        Self {
            ds,
            actor,
            facet,
            in_script,
        }
    }

    pub fn facet(&self) -> FacetId {
        self.facet
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// Whether the current facet has not begun terminating.
    pub fn is_live(&self) -> bool {
        self.ds.facet_is_live(self.facet)
    }

    /// `false` while the facet is being set up.
    pub fn in_script(&self) -> bool {
        self.in_script
    }

    fn ensure_setup(&self, what: &'static str) -> ActorResult {
        if self.in_script {
            return Err(ActorError::NotInSetup { what });
        }
        Ok(())
    }

    fn ensure_script(&self, what: &'static str) -> ActorResult {
        if !self.in_script {
            return Err(ActorError::NotInScript {
                what,
                keyword: "add_start_script",
            });
        }
        Ok(())
    }

    // -- actions ----------------------------------------------------------

    /// Assert on behalf of the actor rather than an endpoint.
    ///
    /// Ad-hoc assertions are reference counted per actor and retracted
    /// when the actor terminates.
    pub fn assert(&mut self, assertion: impl Into<Assertion>) {
        let assertion = assertion.into();
        self.ds
            .with_actor(self.actor, |state| state.adhoc_assert(assertion));
    }

    pub fn retract(&mut self, assertion: impl Into<Assertion>) {
        let assertion = assertion.into();
        self.ds
            .with_actor(self.actor, |state| state.adhoc_retract(assertion));
    }

    pub fn send(&mut self, message: impl Into<Term>) -> ActorResult {
        self.ensure_script("send")?;
        self.ds
            .enqueue_action(self.actor, Action::Message(message.into()));
        Ok(())
    }

    /// Spawn a child actor once this turn commits.
    ///
    /// `initial` assertions are published with the spawn and held until the
    /// new actor's boot turn commits.
    pub fn spawn(
        &mut self,
        name: impl Into<String>,
        boot: impl FnOnce(&mut Turn<'_>) -> ActorResult + 'static,
        initial: Vec<Assertion>,
    ) -> ActorResult {
        self.ensure_script("spawn")?;
        self.ds.enqueue_action(
            self.actor,
            Action::Spawn {
                name: name.into(),
                boot: Box::new(boot),
                initial,
            },
        );
        Ok(())
    }

    /// Spawn `M` unless it has already been activated in this dataspace.
    pub fn activate<M: Activatable>(&mut self) {
        self.ds.enqueue_action(
            self.actor,
            Action::Activation {
                key: TypeId::of::<M>(),
                name: M::name().to_string(),
                boot: Box::new(|turn: &mut Turn<'_>| M::boot(turn)),
            },
        );
    }

    /// Run `body` in this facet after the current turn has been performed.
    pub fn defer_turn(&mut self, body: impl FnOnce(&mut Turn<'_>) -> ActorResult + 'static) {
        self.ds.enqueue_action(
            self.actor,
            Action::DeferredTurn {
                facet: self.facet,
                body: Box::new(body),
            },
        );
    }

    // -- endpoints --------------------------------------------------------

    /// Install an endpoint whose interest is computed by `update`.
    ///
    /// Dynamic endpoints record the fields `update` reads and are recomputed
    /// whenever one of them changes.
    pub fn add_endpoint(
        &mut self,
        update: impl FnMut(&mut Turn<'_>) -> ActorResult<Interest> + 'static,
        dynamic: bool,
    ) -> ActorResult<EndpointId> {
        self.ensure_setup("add_endpoint")?;
        if !self.ds.facets.contains_key(&self.facet) {
            return Err(ActorError::FacetNotFound(self.facet));
        }
        let id = EndpointId(self.ds.ids.next());
        let endpoint = EndpointRef::new(self.facet, id);
        let mut update: UpdateFn = Box::new(update);

        let interest = self.with_subject(dynamic.then_some(endpoint), |turn| update(turn));
        let interest = match interest {
            Ok(interest) => interest,
            Err(err) => {
                self.ds.dataflow.forget_subject(&endpoint);
                return Err(err);
            }
        };

        let Some(facet) = self.ds.facets.get_mut(&self.facet) else {
            return Err(ActorError::FacetNotFound(self.facet));
        };
        facet.endpoints.insert(
            id,
            Endpoint {
                id,
                interest,
                update: Some(update),
                dynamic,
            },
        );
        trace!(%endpoint, dynamic, "endpoint added");
        self.ds.install_endpoint(endpoint);
        Ok(id)
    }

    /// Register `observer` and publish its interest.
    pub fn add_observer(&mut self, observer: Observer) -> ActorResult<EndpointId> {
        self.add_endpoint(move |_| Ok(Interest::observe(observer.clone())), false)
    }

    /// Publish the assertion computed by `f`, recomputed when the fields
    /// it reads change. `None` publishes nothing.
    pub fn add_assertion(
        &mut self,
        mut f: impl FnMut(&mut Turn<'_>) -> ActorResult<Option<Assertion>> + 'static,
    ) -> ActorResult<EndpointId> {
        self.add_endpoint(
            move |turn| {
                Ok(Interest {
                    assertion: f(turn)?,
                    observer: None,
                })
            },
            true,
        )
    }

    /// Run `f` as a script now and again whenever a field it read changes.
    pub fn add_dataflow(
        &mut self,
        f: impl FnMut(&mut Turn<'_>) -> ActorResult + 'static,
        priority: Priority,
    ) -> ActorResult<EndpointId> {
        let body = Rc::new(RefCell::new(f));
        self.add_endpoint(
            move |turn| {
                let subject = turn.ds.dataflow.current_subject().copied();
                let body = Rc::clone(&body);
                turn.schedule_script(priority, move |turn| {
                    if !turn.is_live() {
                        return Ok(());
                    }
                    turn.with_subject(subject, |turn| (&mut *body.borrow_mut())(turn))
                });
                Ok(Interest::none())
            },
            true,
        )
    }

    /// Queue `script` to run once setup has finished.
    pub fn add_start_script(
        &mut self,
        script: impl FnOnce(&mut Turn<'_>) -> ActorResult + 'static,
    ) -> ActorResult {
        self.ensure_setup("add_start_script")?;
        self.schedule_script(Priority::Normal, script);
        Ok(())
    }

    /// Run `script` when the facet stops, after its children's stop scripts.
    pub fn add_stop_script(
        &mut self,
        script: impl FnOnce(&mut Turn<'_>) -> ActorResult + 'static,
    ) -> ActorResult {
        self.ensure_setup("add_stop_script")?;
        let facet = self
            .ds
            .facets
            .get_mut(&self.facet)
            .ok_or(ActorError::FacetNotFound(self.facet))?;
        facet.stop_scripts.push(Box::new(script));
        Ok(())
    }

    pub(crate) fn run_stop_scripts(&mut self) -> ActorResult {
        let scripts = self
            .ds
            .facets
            .get_mut(&self.facet)
            .map(|facet| std::mem::take(&mut facet.stop_scripts))
            .unwrap_or_default();
        for script in scripts {
            script(self)?;
        }
        Ok(())
    }

    // -- facets -----------------------------------------------------------

    /// Create a child of the current facet, set up by `boot`.
    pub fn add_child_facet(
        &mut self,
        boot: impl FnOnce(&mut Turn<'_>) -> ActorResult,
    ) -> ActorResult<FacetId> {
        self.ensure_script("add_child_facet")?;
        self.ds.add_facet(self.actor, Some(self.facet), boot)
    }

    /// Stop the current facet.
    pub fn stop(&mut self) {
        let facet = self.facet;
        self.ds.push_script(
            self.actor,
            Priority::Normal,
            Script::system(move |ds, _| {
                ds.terminate_facet(facet);
                Ok(())
            }),
        );
    }

    /// Stop the current facet, then run `continuation` in its parent.
    pub fn stop_then(&mut self, continuation: impl FnOnce(&mut Turn<'_>) -> ActorResult + 'static) {
        let facet = self.facet;
        let parent = self.ds.facets.get(&facet).and_then(|f| f.parent);
        self.ds.push_script(
            self.actor,
            Priority::Normal,
            Script::system(move |ds, actor| {
                ds.terminate_facet(facet);
                match parent {
                    Some(parent) if ds.facet_is_live(parent) => {
                        ds.push_script(actor, Priority::Normal, Script::facet(parent, continuation));
                    }
                    _ => trace!(%facet, "dropping stop continuation; parent is gone"),
                }
                Ok(())
            }),
        );
    }

    /// Stop another facet of this actor. Facets already collected are
    /// ignored.
    pub fn stop_facet(&mut self, facet: FacetId) -> ActorResult {
        let Some(record) = self.ds.facets.get(&facet) else {
            return Ok(());
        };
        if record.actor != self.actor {
            return Err(ActorError::FacetNotFound(facet));
        }
        self.ds.push_script(
            self.actor,
            Priority::Normal,
            Script::system(move |ds, _| {
                ds.terminate_facet(facet);
                Ok(())
            }),
        );
        Ok(())
    }

    /// React to each distinct match of `pattern` with a child facet, stopped
    /// again when that match is retracted.
    pub fn during(
        &mut self,
        pattern: &Pattern,
        body: impl Fn(&mut Turn<'_>, &[Term]) -> ActorResult + 'static,
    ) -> ActorResult<EndpointId> {
        let children: Rc<RefCell<BTreeMap<Vec<Term>, FacetId>>> = Rc::default();
        let body = Rc::new(body);
        let added = Rc::clone(&children);
        let observer = Observer::new(pattern)
            .on_added(move |turn, captures| {
                let body = Rc::clone(&body);
                let bound = captures.to_vec();
                let child = turn.add_child_facet(move |turn| body(turn, &bound))?;
                added.borrow_mut().insert(captures.to_vec(), child);
                Ok(())
            })
            .on_removed(move |turn, captures| {
                let child = children.borrow_mut().remove(captures);
                match child {
                    Some(child) => turn.stop_facet(child),
                    None => Ok(()),
                }
            });
        self.add_observer(observer)
    }

    // -- fields -----------------------------------------------------------

    /// Declare `name` in the current facet.
    ///
    /// If `name` is already visible from here, that field is assigned
    /// instead of being shadowed.
    pub fn declare_field(&mut self, name: &str, initial: impl Into<Term>) -> ActorResult<FieldId> {
        if let Some(field) = self.ds.lookup_field(self.facet, name) {
            self.set(field, initial)?;
            return Ok(field);
        }
        if !self.ds.facets.contains_key(&self.facet) {
            return Err(ActorError::FacetNotFound(self.facet));
        }
        let id = FieldId(self.ds.ids.next());
        let property = ObservableProperty::with_equality(&mut self.ds.dataflow, id, initial.into());
        self.ds.fields.insert(
            id,
            Field {
                facet: self.facet,
                property,
            },
        );
        if let Some(facet) = self.ds.facets.get_mut(&self.facet) {
            facet.scope.declare(name, id);
        }
        trace!(field = %id, facet = %self.facet, name, "field declared");
        Ok(id)
    }

    /// Resolve a field visible from the current facet.
    pub fn field(&self, name: &str) -> ActorResult<FieldId> {
        self.ds
            .lookup_field(self.facet, name)
            .ok_or_else(|| ActorError::FieldNotFound {
                facet: self.facet,
                name: name.to_string(),
            })
    }

    /// Read a field, recording the read against the current dataflow
    /// subject.
    pub fn get(&mut self, field: FieldId) -> ActorResult<Term> {
        let Dataspace {
            fields, dataflow, ..
        } = &mut *self.ds;
        let slot = fields.get(&field).ok_or(ActorError::StaleField(field))?;
        Ok(slot.property.get(dataflow).clone())
    }

    /// Write a field; readers are refreshed unless the value is unchanged.
    pub fn set(&mut self, field: FieldId, value: impl Into<Term>) -> ActorResult {
        let Dataspace {
            fields, dataflow, ..
        } = &mut *self.ds;
        let slot = fields
            .get_mut(&field)
            .ok_or(ActorError::StaleField(field))?;
        if slot.property.set(dataflow, value.into()) {
            trace!(%field, facet = %slot.facet, "field damaged");
        }
        Ok(())
    }

    // -- scheduling -------------------------------------------------------

    /// Queue `script` for this facet at `priority` within the current actor.
    pub fn schedule_script(
        &mut self,
        priority: Priority,
        script: impl FnOnce(&mut Turn<'_>) -> ActorResult + 'static,
    ) {
        self.ds
            .push_script(self.actor, priority, Script::facet(self.facet, script));
    }

    /// Run `f` with `subject` as the current dataflow subject.
    pub fn with_subject<R>(&mut self, subject: Option<EndpointRef>, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.ds.dataflow.swap_subject(subject);
        let result = f(self);
        self.ds.dataflow.swap_subject(previous);
        result
    }

    // -- external ---------------------------------------------------------

    /// A `Send` handle that runs `callback` in a fresh script of this facet
    /// for every payload, as long as the facet is live.
    pub fn wrap_external(
        &mut self,
        callback: impl Fn(&mut Turn<'_>, Term) -> ActorResult + 'static,
    ) -> ExternalHandle {
        let id = self.ds.ids.next();
        let tx = self.ds.external.sender();
        self.ds.externals.insert(
            id,
            ExternalSlot {
                actor: self.actor,
                facet: self.facet,
                callback: Rc::new(callback),
            },
        );
        if let Some(facet) = self.ds.facets.get_mut(&self.facet) {
            facet.externals.insert(id);
        }
        ExternalHandle::new(id, tx)
    }

    /// Keep the driver waiting for external events while the returned
    /// guard is alive.
    pub fn background_task(&mut self) -> BackgroundTask {
        BackgroundTask::new(self.ds.external.sender())
    }
}
