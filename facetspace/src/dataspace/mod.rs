//! The dataspace: actors, facets and endpoints over one skeleton index.
//!
//! All state lives in arenas keyed by ids: actors, facets, fields and
//! external callbacks. The index and the dataflow graph refer to endpoints
//! by [`EndpointRef`], so tearing something down is a matter of removing
//! entries.
//!
//! Execution is single threaded and turn based. [`Dataspace::run_scripts`]
//! runs every runnable actor's queued scripts and commits each actor's
//! buffered actions as one turn, then performs all committed turns in FIFO
//! order. Between scripts, and after every performed action, a dataflow
//! repair pass refreshes endpoints whose inputs changed.

mod external;
mod turn;

pub use external::{BackgroundTask, ExternalHandle};
pub use turn::{Activatable, Turn};

use crate::actor::{Action, Actor, Boot, Facet, FacetState, Priority, Script};
use crate::bag::Bag;
use crate::dataflow::{Graph, ObservableProperty, RepairRound};
use crate::runtime::{ActorError, ActorResult};
use crate::skeleton::{EventKind, Index};
use crate::term::{Assertion, Term};
use crate::types::{ActorId, EndpointRef, FacetId, FieldId, IdAllocator, TurnId};
use external::{ExternalChannel, ExternalEvent, ExternalSlot};
use serde::Serialize;
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, error, trace};

/// A committed batch of actions from one actor.
struct PendingTurn {
    /// `None` for turns injected from outside any actor.
    actor: Option<ActorId>,
    actions: Vec<Action>,
}

/// An index event waiting to be turned into a script.
struct Delivery {
    endpoint: EndpointRef,
    kind: EventKind,
    captures: Vec<Term>,
}

/// An observable field slot.
struct Field {
    facet: FacetId,
    property: ObservableProperty<FieldId, Term>,
}

/// Counters describing a dataspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataspaceStats {
    pub actor_count: usize,
    pub facet_count: usize,
    pub assertion_count: usize,
    pub handler_count: usize,
    pub turns_committed: u64,
    pub dataflow_cycles: u64,
    pub actor_failures: u64,
}

/// Single-process dataspace engine.
pub struct Dataspace {
    index: Index<EndpointRef>,
    dataflow: Graph<EndpointRef, FieldId>,
    actors: BTreeMap<ActorId, Actor>,
    facets: HashMap<FacetId, Facet>,
    fields: HashMap<FieldId, Field>,
    runnable: VecDeque<ActorId>,
    pending_turns: VecDeque<PendingTurn>,
    activated: HashSet<TypeId>,
    ids: IdAllocator,
    external: ExternalChannel,
    externals: HashMap<u64, ExternalSlot>,
    turn_id: TurnId,
    turns_committed: u64,
    dataflow_cycles: u64,
    actor_failures: u64,
    log_turns: bool,
}

impl Dataspace {
    /// A dataspace whose first turn spawns an actor running `boot`.
    pub fn new(boot: impl FnOnce(&mut Turn<'_>) -> ActorResult + 'static) -> Self {
        let mut ds = Self {
            index: Index::new(),
            dataflow: Graph::new(),
            actors: BTreeMap::new(),
            facets: HashMap::new(),
            fields: HashMap::new(),
            runnable: VecDeque::new(),
            pending_turns: VecDeque::new(),
            activated: HashSet::new(),
            ids: IdAllocator::default(),
            external: ExternalChannel::new(),
            externals: HashMap::new(),
            turn_id: TurnId::genesis(),
            turns_committed: 0,
            dataflow_cycles: 0,
            actor_failures: 0,
            log_turns: false,
        };
        ds.spawn("main", boot, Vec::new());
        ds
    }

    /// Queue a turn, from outside any actor, spawning a new top-level actor.
    pub fn spawn(
        &mut self,
        name: impl Into<String>,
        boot: impl FnOnce(&mut Turn<'_>) -> ActorResult + 'static,
        initial: Vec<Assertion>,
    ) {
        self.pending_turns.push_back(PendingTurn {
            actor: None,
            actions: vec![Action::Spawn {
                name: name.into(),
                boot: Box::new(boot),
                initial,
            }],
        });
    }

    pub fn set_log_turns(&mut self, enabled: bool) {
        self.log_turns = enabled;
    }

    /// Run pending scripts, then perform pending actions.
    ///
    /// Returns whether more work is queued.
    pub fn run_scripts(&mut self) -> bool {
        self.run_pending_scripts();
        self.perform_pending_actions();
        self.has_pending_work()
    }

    pub fn has_pending_work(&self) -> bool {
        !self.runnable.is_empty() || !self.pending_turns.is_empty()
    }

    /// Whether `assertion` is currently present in the index.
    pub fn contains_assertion(&self, assertion: &Assertion) -> bool {
        self.index.contains_assertion(assertion)
    }

    /// The most recently committed turn.
    pub fn current_turn(&self) -> TurnId {
        self.turn_id
    }

    pub fn stats(&self) -> DataspaceStats {
        DataspaceStats {
            actor_count: self.actors.len(),
            facet_count: self.facets.len(),
            assertion_count: self.index.assertion_count(),
            handler_count: self.index.handler_count(),
            turns_committed: self.turns_committed,
            dataflow_cycles: self.dataflow_cycles,
            actor_failures: self.actor_failures,
        }
    }

    // -- scheduling -------------------------------------------------------

    fn run_pending_scripts(&mut self) {
        let runnable = std::mem::take(&mut self.runnable);
        for actor in runnable {
            self.run_actor(actor);
        }
    }

    /// Drain one actor's queues, then commit its buffered actions.
    fn run_actor(&mut self, actor: ActorId) {
        while let Some(script) = self
            .actors
            .get_mut(&actor)
            .and_then(|a| a.pop_next_script())
        {
            if let Err(err) = self.run_script(actor, script) {
                self.abort_actor(actor, err);
            }
            self.refresh_assertions();
        }
        let Some(state) = self.actors.get_mut(&actor) else {
            return;
        };
        state.runnable = false;
        let actions = std::mem::take(&mut state.pending_actions);
        if !actions.is_empty() {
            self.pending_turns.push_back(PendingTurn {
                actor: Some(actor),
                actions,
            });
        }
    }

    fn run_script(&mut self, actor: ActorId, script: Script) -> ActorResult {
        match script {
            Script::Facet { facet, body } => {
                if !self.facets.contains_key(&facet) {
                    trace!(%facet, "skipping script for collected facet");
                    return Ok(());
                }
                self.run_in_facet(actor, facet, true, body)
            }
            Script::System(body) => body(self, actor),
        }
    }

    fn run_in_facet<R>(
        &mut self,
        actor: ActorId,
        facet: FacetId,
        in_script: bool,
        body: impl FnOnce(&mut Turn<'_>) -> ActorResult<R>,
    ) -> ActorResult<R> {
        let mut turn = Turn::new(self, actor, facet, in_script);
        body(&mut turn)
    }

    fn perform_pending_actions(&mut self) {
        let turns = std::mem::take(&mut self.pending_turns);
        for PendingTurn { actor, actions } in turns {
            self.turn_id = self.turn_id.next();
            self.turns_committed += 1;
            if self.log_turns {
                debug!(turn = %self.turn_id, actor = ?actor, actions = actions.len(), "committing turn");
            }
            for action in actions {
                self.perform(actor, action);
                self.refresh_assertions();
                self.run_pending_scripts();
            }
        }
    }

    fn perform(&mut self, actor: Option<ActorId>, action: Action) {
        trace!(actor = ?actor, action = action.kind(), "performing action");
        match action {
            Action::Patch(patch) => self.apply_patch(actor, patch),
            Action::Message(message) => self.deliver_message(&message),
            Action::Spawn {
                name,
                boot,
                initial,
            } => self.add_actor(name, boot, initial, actor),
            Action::Activation { key, name, boot } => {
                if self.activated.insert(key) {
                    self.add_actor(name, boot, Vec::new(), actor);
                }
            }
            Action::DeferredTurn { facet, body } => {
                if let Some(actor) = actor {
                    self.push_script(actor, Priority::Normal, Script::Facet { facet, body });
                }
            }
            Action::Quit => {
                if let Some(actor) = actor {
                    self.quit_actor(actor);
                }
            }
        }
    }

    pub(crate) fn push_script(&mut self, actor: ActorId, priority: Priority, script: Script) {
        let Some(state) = self.actors.get_mut(&actor) else {
            trace!(%actor, "dropping script for removed actor");
            return;
        };
        state.push_script(priority, script);
        self.mark_runnable(actor);
    }

    pub(crate) fn enqueue_action(&mut self, actor: ActorId, action: Action) {
        let Some(state) = self.actors.get_mut(&actor) else {
            return;
        };
        state.pending_actions.push(action);
        self.mark_runnable(actor);
    }

    /// Run `f` on an actor's state; buffered changes get committed with its
    /// next turn.
    fn with_actor(&mut self, actor: ActorId, f: impl FnOnce(&mut Actor)) {
        if let Some(state) = self.actors.get_mut(&actor) {
            f(state);
            self.mark_runnable(actor);
        }
    }

    fn mark_runnable(&mut self, actor: ActorId) {
        if let Some(state) = self.actors.get_mut(&actor) {
            if !state.runnable {
                state.runnable = true;
                self.runnable.push_back(actor);
            }
        }
    }

    // -- index ------------------------------------------------------------

    /// Apply additions before removals, so an assertion moving between
    /// sources within one patch never flickers.
    fn apply_patch(&mut self, actor: Option<ActorId>, patch: Bag<Assertion>) {
        let mut removals = Vec::new();
        for (assertion, count) in patch {
            if let Some(state) = actor.and_then(|id| self.actors.get_mut(&id)) {
                state.cleanup_changes.change(assertion.clone(), -count);
            }
            if count > 0 {
                self.adjust_index(&assertion, count);
            } else {
                removals.push((assertion, count));
            }
        }
        for (assertion, count) in removals {
            self.adjust_index(&assertion, count);
        }
    }

    fn adjust_index(&mut self, assertion: &Assertion, delta: i64) {
        let mut deliveries = Vec::new();
        self.index
            .adjust_assertion(assertion, delta, |endpoint, kind, captures| {
                deliveries.push(Delivery {
                    endpoint: *endpoint,
                    kind,
                    captures: captures.to_vec(),
                })
            });
        self.dispatch(deliveries);
    }

    fn deliver_message(&mut self, message: &Term) {
        let mut deliveries = Vec::new();
        self.index.send_message(message, |endpoint, kind, captures| {
            deliveries.push(Delivery {
                endpoint: *endpoint,
                kind,
                captures: captures.to_vec(),
            })
        });
        self.dispatch(deliveries);
    }

    /// Queue each event as a script on the observing facet's actor.
    fn dispatch(&mut self, deliveries: Vec<Delivery>) {
        for Delivery {
            endpoint,
            kind,
            captures,
        } in deliveries
        {
            let Some(facet) = self.facets.get(&endpoint.facet) else {
                continue;
            };
            let Some(observer) = facet
                .endpoints
                .get(&endpoint.endpoint)
                .and_then(|ep| ep.interest.observer.as_ref())
            else {
                continue;
            };
            let Some(callback) = observer.callback_for(kind) else {
                continue;
            };
            let actor = facet.actor;
            let priority = observer.priority();
            self.push_script(
                actor,
                priority,
                Script::facet(endpoint.facet, move |turn| {
                    if turn.is_live() {
                        callback(turn, &captures)
                    } else {
                        Ok(())
                    }
                }),
            );
        }
    }

    // -- actors -----------------------------------------------------------

    fn add_actor(
        &mut self,
        name: String,
        boot: Boot,
        initial: Vec<Assertion>,
        parent: Option<ActorId>,
    ) {
        let id = ActorId(self.ids.next());
        let adhoc: Bag<Assertion> = initial.iter().cloned().collect();
        debug!(actor = %id, %name, parent = ?parent, "spawning actor");
        self.actors
            .insert(id, Actor::new(id, name, parent, adhoc.clone()));
        // Initial assertions are held until the boot turn commits, so the
        // actor's own endpoints can take them over without a gap.
        self.apply_patch(Some(id), adhoc);

        let result = self.add_facet(id, None, move |turn| {
            let system = turn.facet();
            let actor = turn.actor();
            turn.ds.add_facet(actor, Some(system), boot)?;
            for assertion in initial {
                turn.retract(assertion);
            }
            Ok(())
        });
        if let Err(err) = result {
            self.abort_actor(id, err);
        }
    }

    /// Normal termination once the root facet is gone: drop ad-hoc
    /// assertions, then quit.
    fn terminate_actor(&mut self, actor: ActorId) {
        debug!(%actor, "terminating actor");
        self.push_script(
            actor,
            Priority::Normal,
            Script::system(|ds, actor| {
                if let Some(state) = ds.actors.get_mut(&actor) {
                    let held: Vec<Assertion> = state.adhoc_assertions.drain().map(|(a, _)| a).collect();
                    for assertion in held {
                        state.retract(assertion);
                    }
                }
                Ok(())
            }),
        );
        self.push_quit(actor);
    }

    /// Abrupt termination after a failure.
    ///
    /// Queued work is discarded and every facet of the actor is collapsed
    /// without running stop scripts. Whatever the actor had committed is
    /// retracted by its cleanup patch when it quits.
    pub(crate) fn abort_actor(&mut self, actor: ActorId, err: ActorError) {
        let Some(state) = self.actors.get_mut(&actor) else {
            return;
        };
        error!(%actor, name = %state.name, error = %err, "actor exited with error");
        self.actor_failures += 1;
        state.abandon_queued_work();
        state.root_facet = None;

        let mut owned: Vec<FacetId> = self
            .facets
            .values()
            .filter(|facet| facet.actor == actor)
            .map(|facet| facet.id)
            .collect();
        owned.sort();
        for facet in owned {
            if let Some(record) = self.facets.get_mut(&facet) {
                record.state = FacetState::Terminated;
            }
            self.push_script(
                actor,
                Priority::Normal,
                Script::system(move |ds, _| {
                    ds.destroy_endpoints(facet, false);
                    ds.forget_facet(facet);
                    Ok(())
                }),
            );
        }
        self.push_quit(actor);
    }

    fn push_quit(&mut self, actor: ActorId) {
        self.push_script(
            actor,
            Priority::Normal,
            Script::system(|ds, actor| {
                ds.enqueue_action(actor, Action::Quit);
                Ok(())
            }),
        );
    }

    fn quit_actor(&mut self, actor: ActorId) {
        let Some(mut state) = self.actors.remove(&actor) else {
            return;
        };
        let cleanup = std::mem::take(&mut state.cleanup_changes);
        self.apply_patch(None, cleanup);
        debug!(actor = %state.id, name = %state.name, parent = ?state.parent, "actor quit");
    }

    // -- facets -----------------------------------------------------------

    /// Create a facet and run `boot` in setup mode.
    ///
    /// An inertness check is queued afterwards: a facet that set nothing up
    /// stops straight away.
    fn add_facet(
        &mut self,
        actor: ActorId,
        parent: Option<FacetId>,
        boot: impl FnOnce(&mut Turn<'_>) -> ActorResult,
    ) -> ActorResult<FacetId> {
        match parent {
            Some(parent) => {
                if !self.facets.contains_key(&parent) {
                    return Err(ActorError::FacetNotFound(parent));
                }
            }
            None => {
                let state = self
                    .actors
                    .get(&actor)
                    .ok_or_else(|| ActorError::failed(format!("{} is not running", actor)))?;
                if state.root_facet.is_some() {
                    return Err(ActorError::DuplicateRootFacet);
                }
            }
        }

        let id = FacetId(self.ids.next());
        self.facets.insert(id, Facet::new(id, actor, parent));
        match parent {
            Some(parent) => {
                if let Some(parent) = self.facets.get_mut(&parent) {
                    parent.children.insert(id);
                }
            }
            None => {
                if let Some(state) = self.actors.get_mut(&actor) {
                    state.root_facet = Some(id);
                }
            }
        }
        trace!(facet = %id, %actor, parent = ?parent, "facet created");

        let result = self.run_in_facet(actor, id, false, boot);
        self.push_script(
            actor,
            Priority::Normal,
            Script::system(move |ds, _| {
                // A stop script may add children to a parent that is already
                // terminating; those never get a teardown of their own.
                let orphaned = parent.is_some_and(|parent| !ds.facet_is_live(parent));
                if ds.facet_is_live(id) && (orphaned || ds.facet_is_inert(id)) {
                    ds.terminate_facet(id);
                }
                Ok(())
            }),
        );
        result.map(|_| id)
    }

    pub(crate) fn facet_is_live(&self, facet: FacetId) -> bool {
        self.facets.get(&facet).is_some_and(Facet::is_live)
    }

    fn facet_is_inert(&self, facet: FacetId) -> bool {
        self.facets.get(&facet).is_some_and(Facet::is_inert)
    }

    /// Begin orderly termination of a live facet.
    ///
    /// Children terminate first, so their stop scripts are queued ahead of
    /// this facet's. Endpoint retraction follows the stop scripts, and a GC
    /// priority check afterwards stops an inert parent or, for a root facet,
    /// the whole actor.
    pub(crate) fn terminate_facet(&mut self, facet: FacetId) {
        let Some(record) = self.facets.get_mut(&facet) else {
            return;
        };
        if record.state != FacetState::Live {
            return;
        }
        record.state = FacetState::Terminating;
        let actor = record.actor;
        let parent = record.parent;
        let children: Vec<FacetId> = record.children.iter().copied().collect();

        match parent {
            Some(parent) => {
                if let Some(parent) = self.facets.get_mut(&parent) {
                    parent.children.remove(&facet);
                }
            }
            None => {
                if let Some(state) = self.actors.get_mut(&actor) {
                    if state.root_facet == Some(facet) {
                        state.root_facet = None;
                    }
                }
            }
        }
        debug!(%facet, %actor, "terminating facet");

        for child in children {
            self.terminate_facet(child);
        }

        self.push_script(
            actor,
            Priority::Normal,
            Script::facet(facet, |turn| turn.run_stop_scripts()),
        );
        self.push_script(
            actor,
            Priority::Normal,
            Script::system(move |ds, _| {
                ds.destroy_endpoints(facet, true);
                Ok(())
            }),
        );
        self.push_script(
            actor,
            Priority::Gc,
            Script::system(move |ds, actor| {
                match parent {
                    Some(parent) => {
                        if ds.facet_is_inert(parent) {
                            ds.terminate_facet(parent);
                        }
                    }
                    None => ds.terminate_actor(actor),
                }
                ds.forget_facet(facet);
                Ok(())
            }),
        );
    }

    fn destroy_endpoints(&mut self, facet: FacetId, emit_patches: bool) {
        let Some(record) = self.facets.get(&facet) else {
            return;
        };
        let endpoints: Vec<_> = record.endpoints.keys().copied().collect();
        for endpoint in endpoints {
            self.destroy_endpoint(EndpointRef::new(facet, endpoint), emit_patches);
        }
        if let Some(record) = self.facets.get_mut(&facet) {
            record.state = FacetState::Terminated;
        }
    }

    /// Remove a facet record along with its fields and external callbacks.
    fn forget_facet(&mut self, facet: FacetId) {
        let Some(record) = self.facets.remove(&facet) else {
            return;
        };
        for field in record.scope.fields() {
            self.fields.remove(&field);
        }
        for handle in &record.externals {
            self.externals.remove(handle);
        }
        trace!(%facet, "facet collected");
    }

    /// Resolve `name` in `facet`'s scope chain.
    fn lookup_field(&self, facet: FacetId, name: &str) -> Option<FieldId> {
        let mut current = Some(facet);
        while let Some(id) = current {
            let record = self.facets.get(&id)?;
            if let Some(field) = record.scope.lookup_local(name) {
                return Some(field);
            }
            current = record.scope.parent();
        }
        None
    }

    // -- endpoints --------------------------------------------------------

    /// Rerun every endpoint whose inputs were damaged, until nothing is.
    fn refresh_assertions(&mut self) {
        let mut round = RepairRound::new();
        while let Some(batch) = round.next_batch(&mut self.dataflow) {
            for endpoint in batch {
                let previous = self.dataflow.swap_subject(Some(endpoint));
                let result = self.refresh_endpoint(endpoint);
                self.dataflow.swap_subject(previous);
                if let Err(err) = result {
                    if let Some(actor) = self.facets.get(&endpoint.facet).map(|f| f.actor) {
                        self.abort_actor(actor, err);
                    }
                }
            }
        }
        let report = round.finish();
        self.dataflow_cycles += report.cycles.len() as u64;
    }

    /// Recompute an endpoint's interest, reinstalling it only if the
    /// published assertion or the observed pattern changed.
    fn refresh_endpoint(&mut self, endpoint: EndpointRef) -> ActorResult {
        let Some(facet) = self.facets.get_mut(&endpoint.facet) else {
            return Ok(());
        };
        if !facet.is_live() {
            return Ok(());
        }
        let actor = facet.actor;
        let Some(mut update) = facet
            .endpoints
            .get_mut(&endpoint.endpoint)
            .and_then(|ep| ep.update.take())
        else {
            return Ok(());
        };

        // Refreshes run as scripts: setup-only primitives fail here.
        let result = self.run_in_facet(actor, endpoint.facet, true, |turn| update(turn));

        let Some(record) = self
            .facets
            .get_mut(&endpoint.facet)
            .and_then(|f| f.endpoints.get_mut(&endpoint.endpoint))
        else {
            return result.map(|_| ());
        };
        record.update = Some(update);
        let interest = result?;
        if record.interest.publishes_same(&interest) {
            return Ok(());
        }

        self.uninstall_endpoint(endpoint, true);
        if let Some(record) = self
            .facets
            .get_mut(&endpoint.facet)
            .and_then(|f| f.endpoints.get_mut(&endpoint.endpoint))
        {
            record.interest = interest;
        }
        self.install_endpoint(endpoint);
        Ok(())
    }

    /// Publish the endpoint's stored interest: assert through the owning
    /// actor and register the observer, replaying matches already present.
    fn install_endpoint(&mut self, endpoint: EndpointRef) {
        let Some(facet) = self.facets.get(&endpoint.facet) else {
            return;
        };
        let actor = facet.actor;
        let Some(record) = facet.endpoints.get(&endpoint.endpoint) else {
            return;
        };
        let assertion = record.interest.assertion.clone();
        let analysis = record
            .interest
            .observer
            .as_ref()
            .map(|observer| observer.analysis().clone());

        if let Some(assertion) = assertion {
            self.with_actor(actor, |state| state.assert(assertion));
        }
        if let Some(analysis) = analysis {
            let mut deliveries = Vec::new();
            self.index.add_handler(&analysis, endpoint, |endpoint, kind, captures| {
                deliveries.push(Delivery {
                    endpoint: *endpoint,
                    kind,
                    captures: captures.to_vec(),
                })
            });
            self.dispatch(deliveries);
        }
    }

    fn uninstall_endpoint(&mut self, endpoint: EndpointRef, emit_patches: bool) {
        let Some(facet) = self.facets.get(&endpoint.facet) else {
            return;
        };
        let actor = facet.actor;
        let Some(record) = facet.endpoints.get(&endpoint.endpoint) else {
            return;
        };
        let assertion = record.interest.assertion.clone();
        let analysis = record
            .interest
            .observer
            .as_ref()
            .map(|observer| observer.analysis().clone());

        if emit_patches {
            if let Some(assertion) = assertion {
                self.with_actor(actor, |state| state.retract(assertion));
            }
        }
        if let Some(analysis) = analysis {
            self.index.remove_handler(&analysis, &endpoint);
        }
    }

    fn destroy_endpoint(&mut self, endpoint: EndpointRef, emit_patches: bool) {
        self.dataflow.forget_subject(&endpoint);
        self.uninstall_endpoint(endpoint, emit_patches);
        if let Some(facet) = self.facets.get_mut(&endpoint.facet) {
            facet.endpoints.remove(&endpoint.endpoint);
        }
    }

    // -- external ---------------------------------------------------------

    /// Turn every queued external event into a script for its facet.
    ///
    /// Events for facets that have stopped are dropped. Returns how many
    /// events were taken off the channel.
    pub fn drain_external(&mut self) -> usize {
        let events = self.external.try_drain();
        let count = events.len();
        for event in events {
            self.accept_external(event);
        }
        count
    }

    /// Wait for one external event and schedule it.
    ///
    /// Returns false once every handle and background task is gone.
    pub(crate) async fn wait_external(&mut self) -> bool {
        match self.external.recv().await {
            Some(event) => {
                self.accept_external(event);
                true
            }
            None => false,
        }
    }

    fn accept_external(&mut self, event: ExternalEvent) {
        let Some(slot) = self.externals.get(&event.handle) else {
            debug!(handle = event.handle, "dropping event for released external handle");
            return;
        };
        if !self.facet_is_live(slot.facet) {
            debug!(facet = %slot.facet, "dropping external event for stopped facet");
            return;
        }
        let actor = slot.actor;
        let facet = slot.facet;
        let callback = slot.callback.clone();
        let payload = event.payload;
        self.push_script(
            actor,
            Priority::Normal,
            Script::facet(facet, move |turn| {
                if turn.is_live() {
                    callback(turn, payload)
                } else {
                    Ok(())
                }
            }),
        );
    }
}
