//! End-to-end behaviour of actors, facets and the index.

use facetspace::{
    Activatable, ActorError, ActorResult, Assertion, EngineConfig, ExternalHandle, Ground,
    Interest, Observer, PatternBuilder as P, Priority, Term, Turn,
};
use std::cell::RefCell;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

type Log = Rc<RefCell<Vec<String>>>;
type Handles = Rc<RefCell<Vec<ExternalHandle>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ground(boot: impl FnOnce(&mut Turn<'_>) -> ActorResult + 'static) -> Ground {
    init_tracing();
    Ground::new(EngineConfig::default(), boot).expect("default config is valid")
}

fn record(label: &str, value: impl Into<Term>) -> Term {
    Term::record(label, vec![value.into()])
}

fn assertion(label: &str, value: impl Into<Term>) -> Assertion {
    Assertion::new(record(label, value))
}

/// Observer logging `+x` / `-x` for every capture of `label($)`.
fn logging_observer(label: &str, log: &Log) -> Observer {
    let added = Rc::clone(log);
    let removed = Rc::clone(log);
    Observer::new(&P::record(label, vec![P::capture()]))
        .on_added(move |_, captures| {
            added.borrow_mut().push(format!("+{}", captures[0]));
            Ok(())
        })
        .on_removed(move |_, captures| {
            removed.borrow_mut().push(format!("-{}", captures[0]));
            Ok(())
        })
}

/// Boot for an actor asserting `term` until its handle is invoked.
fn holder(term: Term, handles: &Handles) -> impl FnOnce(&mut Turn<'_>) -> ActorResult + 'static {
    let handles = Rc::clone(handles);
    move |turn: &mut Turn<'_>| {
        turn.add_endpoint(move |_| Ok(Interest::assert(term.clone())), false)?;
        let handle = turn.wrap_external(|turn, _| {
            turn.stop();
            Ok(())
        });
        handles.borrow_mut().push(handle);
        Ok(())
    }
}

fn keep_alive(turn: &mut Turn<'_>) -> ActorResult {
    turn.add_endpoint(|_| Ok(Interest::assert(Term::symbol("alive"))), false)?;
    Ok(())
}

#[test]
fn test_duplicate_assertions_from_two_actors_appear_once() {
    let log: Log = Rc::default();
    let handles: Handles = Rc::default();
    let observer = logging_observer("present", &log);
    let mut ground = ground(move |turn| {
        turn.add_observer(observer)?;
        Ok(())
    });
    let x = record("present", "x");
    ground
        .dataspace_mut()
        .spawn("a", holder(x.clone(), &handles), Vec::new());
    ground
        .dataspace_mut()
        .spawn("b", holder(x.clone(), &handles), Vec::new());
    ground.run_until_quiescent();
    assert_eq!(*log.borrow(), vec!["+\"x\"".to_string()]);
    assert_eq!(ground.stats().actor_count, 3);

    assert!(handles.borrow()[0].invoke(true));
    ground.run_until_quiescent();
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(ground.stats().actor_count, 2);
    assert!(ground.dataspace().contains_assertion(&Assertion::new(x.clone())));

    assert!(handles.borrow()[1].invoke(true));
    ground.run_until_quiescent();
    assert_eq!(*log.borrow(), vec!["+\"x\"".to_string(), "-\"x\"".to_string()]);
    assert!(!ground.dataspace().contains_assertion(&Assertion::new(x)));
    assert_eq!(ground.stats().actor_count, 1);
}

#[test]
fn test_changes_cancelled_within_a_turn_are_invisible() {
    let log: Log = Rc::default();
    let observer = logging_observer("signal", &log);
    let mut ground = ground(move |turn| {
        turn.add_observer(observer)?;
        Ok(())
    });
    ground.dataspace_mut().spawn(
        "flicker",
        |turn| {
            keep_alive(turn)?;
            turn.add_start_script(|turn| {
                turn.assert(record("signal", 1));
                turn.retract(record("signal", 1));
                turn.assert(record("signal", 2));
                Ok(())
            })
        },
        Vec::new(),
    );
    ground.run_until_quiescent();
    assert_eq!(*log.borrow(), vec!["+2".to_string()]);
    assert!(ground.dataspace().contains_assertion(&assertion("signal", 2)));
}

#[test]
fn test_messages_reach_observers_without_being_stored() {
    let log: Log = Rc::default();
    let heard = Rc::clone(&log);
    let mut ground = ground(move |turn| {
        turn.add_observer(
            Observer::new(&P::record("ping", vec![P::capture()])).on_message(move |_, captures| {
                heard.borrow_mut().push(captures[0].to_string());
                Ok(())
            }),
        )?;
        Ok(())
    });
    ground.dataspace_mut().spawn(
        "pinger",
        |turn| {
            keep_alive(turn)?;
            turn.add_start_script(|turn| turn.send(record("ping", 7)))
        },
        Vec::new(),
    );
    ground.run_until_quiescent();
    assert_eq!(*log.borrow(), vec!["7".to_string()]);
    assert!(!ground.dataspace().contains_assertion(&assertion("ping", 7)));
}

#[test]
fn test_stopping_a_facet_tears_down_descendants_first() {
    let log: Log = Rc::default();
    let handles: Handles = Rc::default();
    let (stops, slot) = (Rc::clone(&log), Rc::clone(&handles));

    let mut ground = ground(move |turn| {
        turn.add_endpoint(|_| Ok(Interest::assert(record("level", 0))), false)?;
        let outer = Rc::clone(&stops);
        turn.add_stop_script(move |_| {
            outer.borrow_mut().push("stop 0".into());
            Ok(())
        })?;
        slot.borrow_mut().push(turn.wrap_external(|turn, _| {
            turn.stop();
            Ok(())
        }));
        turn.add_start_script(move |turn| {
            turn.add_child_facet(move |turn| {
                turn.add_endpoint(|_| Ok(Interest::assert(record("level", 1))), false)?;
                let middle = Rc::clone(&stops);
                turn.add_stop_script(move |_| {
                    middle.borrow_mut().push("stop 1".into());
                    Ok(())
                })?;
                turn.add_start_script(move |turn| {
                    turn.add_child_facet(move |turn| {
                        turn.add_endpoint(|_| Ok(Interest::assert(record("level", 2))), false)?;
                        turn.add_stop_script(move |_| {
                            stops.borrow_mut().push("stop 2".into());
                            Ok(())
                        })
                    })?;
                    Ok(())
                })
            })?;
            Ok(())
        })
    });
    ground.run_until_quiescent();
    for level in 0..3 {
        assert!(ground.dataspace().contains_assertion(&assertion("level", level)));
    }
    assert_eq!(ground.stats().facet_count, 4);
    assert!(log.borrow().is_empty());

    handles.borrow()[0].invoke(true);
    ground.run_until_quiescent();
    assert_eq!(*log.borrow(), vec!["stop 2", "stop 1", "stop 0"]);
    for level in 0..3 {
        assert!(!ground.dataspace().contains_assertion(&assertion("level", level)));
    }
    let stats = ground.stats();
    assert_eq!(stats.actor_count, 0);
    assert_eq!(stats.facet_count, 0);
    assert_eq!(stats.assertion_count, 0);
}

#[test]
fn test_failing_actor_is_isolated() {
    let log: Log = Rc::default();
    let handles: Handles = Rc::default();
    let observer = logging_observer("bad", &log);
    let mut ground = ground(move |turn| {
        turn.add_observer(observer)?;
        Ok(())
    });

    let (stopped, slot) = (Rc::clone(&log), Rc::clone(&handles));
    ground.dataspace_mut().spawn(
        "bad",
        move |turn| {
            turn.add_endpoint(|_| Ok(Interest::assert(record("bad", 1))), false)?;
            turn.add_stop_script(move |_| {
                stopped.borrow_mut().push("bad stopped".into());
                Ok(())
            })?;
            slot.borrow_mut()
                .push(turn.wrap_external(|_, _| Err(ActorError::failed("boom"))));
            Ok(())
        },
        Vec::new(),
    );
    ground.dataspace_mut().spawn(
        "good",
        |turn| {
            turn.add_endpoint(|_| Ok(Interest::assert(record("good", 1))), false)?;
            Ok(())
        },
        Vec::new(),
    );
    ground.run_until_quiescent();
    assert_eq!(*log.borrow(), vec!["+1"]);

    handles.borrow()[0].invoke(Term::symbol("go"));
    ground.run_until_quiescent();
    assert_eq!(*log.borrow(), vec!["+1", "-1"]);
    assert!(!ground.dataspace().contains_assertion(&assertion("bad", 1)));
    assert!(ground.dataspace().contains_assertion(&assertion("good", 1)));
    let stats = ground.stats();
    assert_eq!(stats.actor_failures, 1);
    assert_eq!(stats.actor_count, 2);
}

#[test]
fn test_during_runs_a_facet_per_match() {
    let log: Log = Rc::default();
    let handles: Handles = Rc::default();
    let farewells = Rc::clone(&log);
    let mut ground = ground(move |turn| {
        turn.during(&P::record("present", vec![P::capture()]), move |turn, captures| {
            let who = captures[0].clone();
            let greeting = record("greet", who.clone());
            turn.add_assertion(move |_| Ok(Some(Assertion::new(greeting.clone()))))?;
            let farewells = Rc::clone(&farewells);
            turn.add_stop_script(move |_| {
                farewells.borrow_mut().push(format!("bye {}", who));
                Ok(())
            })
        })?;
        Ok(())
    });
    ground
        .dataspace_mut()
        .spawn("alice", holder(record("present", "alice"), &handles), Vec::new());
    ground
        .dataspace_mut()
        .spawn("bob", holder(record("present", "bob"), &handles), Vec::new());
    ground.run_until_quiescent();
    assert!(ground.dataspace().contains_assertion(&assertion("greet", "alice")));
    assert!(ground.dataspace().contains_assertion(&assertion("greet", "bob")));

    handles.borrow()[0].invoke(true);
    ground.run_until_quiescent();
    assert!(!ground.dataspace().contains_assertion(&assertion("greet", "alice")));
    assert!(ground.dataspace().contains_assertion(&assertion("greet", "bob")));
    assert_eq!(*log.borrow(), vec!["bye \"alice\""]);
}

#[test]
fn test_field_writes_refresh_dependent_endpoints() {
    let log: Log = Rc::default();
    let handles: Handles = Rc::default();
    let (seen, slot) = (Rc::clone(&log), Rc::clone(&handles));
    let mut ground = ground(move |turn| {
        let count = turn.declare_field("count", 0)?;
        turn.add_assertion(move |turn| Ok(Some(Assertion::new(record("count", turn.get(count)?)))))?;
        turn.add_dataflow(
            move |turn| {
                let value = turn.get(count)?;
                seen.borrow_mut().push(value.to_string());
                Ok(())
            },
            Priority::Normal,
        )?;
        slot.borrow_mut().push(turn.wrap_external(move |turn, payload| {
            let delta = payload.as_integer().unwrap_or(0);
            let current = turn.get(count)?.as_integer().unwrap_or(0);
            turn.set(count, current + delta)
        }));
        Ok(())
    });
    ground.run_until_quiescent();
    assert!(ground.dataspace().contains_assertion(&assertion("count", 0)));
    assert_eq!(*log.borrow(), vec!["0"]);

    handles.borrow()[0].invoke(1);
    ground.run_until_quiescent();
    assert!(ground.dataspace().contains_assertion(&assertion("count", 1)));
    assert!(!ground.dataspace().contains_assertion(&assertion("count", 0)));
    assert_eq!(*log.borrow(), vec!["0", "1"]);

    // Writing the same value again changes nothing downstream.
    handles.borrow()[0].invoke(0);
    ground.run_until_quiescent();
    assert_eq!(*log.borrow(), vec!["0", "1"]);
}

#[test]
fn test_self_feeding_dataflow_is_reported_and_settles() {
    let mut ground = ground(|turn| {
        let counter = turn.declare_field("counter", 0)?;
        turn.add_assertion(move |turn| {
            let current = turn.get(counter)?.as_integer().unwrap_or(0);
            turn.set(counter, current + 1)?;
            Ok(None)
        })?;
        Ok(())
    });
    ground.run_until_quiescent();
    assert!(ground.stats().dataflow_cycles >= 1);
}

#[test]
fn test_external_events_after_stop_are_dropped() {
    let log: Log = Rc::default();
    let handles: Handles = Rc::default();
    let (seen, slot) = (Rc::clone(&log), Rc::clone(&handles));
    let mut ground = ground(move |turn| {
        keep_alive(turn)?;
        slot.borrow_mut().push(turn.wrap_external(move |_, payload| {
            seen.borrow_mut().push(payload.to_string());
            Ok(())
        }));
        slot.borrow_mut().push(turn.wrap_external(|turn, _| {
            turn.stop();
            Ok(())
        }));
        Ok(())
    });
    ground.run_until_quiescent();

    handles.borrow()[0].invoke(1);
    ground.run_until_quiescent();
    handles.borrow()[1].invoke(true);
    ground.run_until_quiescent();
    assert_eq!(ground.stats().actor_count, 0);

    assert!(handles.borrow()[0].invoke(2));
    ground.run_until_quiescent();
    assert_eq!(*log.borrow(), vec!["1"]);
}

struct Registry;

impl Activatable for Registry {
    fn name() -> &'static str {
        "registry"
    }

    fn boot(turn: &mut Turn<'_>) -> ActorResult {
        turn.add_endpoint(|_| Ok(Interest::assert(Term::symbol("registry"))), false)?;
        Ok(())
    }
}

#[test]
fn test_activation_spawns_once() {
    let mut ground = ground(|turn| {
        keep_alive(turn)?;
        turn.add_start_script(|turn| {
            turn.activate::<Registry>();
            turn.activate::<Registry>();
            Ok(())
        })
    });
    ground.dataspace_mut().spawn(
        "client",
        |turn| {
            turn.activate::<Registry>();
            Ok(())
        },
        Vec::new(),
    );
    ground.run_until_quiescent();
    let stats = ground.stats();
    // main plus the registry; the client had nothing to keep it alive
    assert_eq!(stats.actor_count, 2);
    assert!(ground
        .dataspace()
        .contains_assertion(&Assertion::new(Term::symbol("registry"))));
}

#[test]
fn test_initial_assertions_bridge_into_the_new_actor() {
    let log: Log = Rc::default();
    let observer = logging_observer("token", &log);
    let mut ground = ground(move |turn| {
        turn.add_observer(observer)?;
        Ok(())
    });
    ground.dataspace_mut().spawn(
        "owner",
        |turn| {
            turn.add_endpoint(|_| Ok(Interest::assert(record("token", 1))), false)?;
            Ok(())
        },
        vec![assertion("token", 1)],
    );
    ground.run_until_quiescent();
    assert_eq!(*log.borrow(), vec!["+1"]);
    assert!(ground.dataspace().contains_assertion(&assertion("token", 1)));
}

#[tokio::test]
async fn test_ground_runs_until_external_sources_are_gone() {
    type Slot<T> = Rc<RefCell<Option<T>>>;
    let handle: Slot<ExternalHandle> = Rc::default();
    let guard: Slot<facetspace::BackgroundTask> = Rc::default();
    let (handle_slot, guard_slot) = (Rc::clone(&handle), Rc::clone(&guard));

    let mut ground = ground(move |turn| {
        keep_alive(turn)?;
        *handle_slot.borrow_mut() = Some(turn.wrap_external(|turn, payload| {
            turn.assert(record("pinged", payload));
            Ok(())
        }));
        *guard_slot.borrow_mut() = Some(turn.background_task());
        Ok(())
    });
    ground.run_until_quiescent();

    let handle = handle.borrow_mut().take().expect("handle created during boot");
    let guard = guard.borrow_mut().take().expect("guard created during boot");
    let sender = tokio::spawn(async move {
        tokio::task::yield_now().await;
        handle.invoke(42);
        drop(guard);
    });

    ground.run().await;
    sender.await.expect("sender task");
    assert!(ground.dataspace().contains_assertion(&assertion("pinged", 42)));
}

#[test]
fn test_children_started_by_stop_scripts_are_collected() {
    let handles: Handles = Rc::default();
    let slot = Rc::clone(&handles);
    let mut ground = ground(move |turn| {
        keep_alive(turn)?;
        turn.add_stop_script(|turn| {
            turn.add_child_facet(|turn| {
                turn.add_observer(Observer::new(&P::record("late", vec![P::capture()])))?;
                Ok(())
            })?;
            Ok(())
        })?;
        slot.borrow_mut().push(turn.wrap_external(|turn, _| {
            turn.stop();
            Ok(())
        }));
        Ok(())
    });
    ground.run_until_quiescent();
    assert_eq!(ground.stats().handler_count, 0);

    assert!(handles.borrow()[0].invoke(true));
    ground.run_until_quiescent();
    let stats = ground.stats();
    assert_eq!(stats.actor_count, 0);
    assert_eq!(stats.facet_count, 0);
    assert_eq!(stats.handler_count, 0);
    assert_eq!(stats.assertion_count, 0);
}

#[test]
fn test_endpoint_refresh_cannot_add_endpoints() {
    let handles: Handles = Rc::default();
    let slot = Rc::clone(&handles);
    let mut ground = ground(move |turn| {
        let level = turn.declare_field("level", 0)?;
        turn.add_endpoint(
            move |turn| {
                let value = turn.get(level)?;
                let extra = record("extra", value.clone());
                turn.add_endpoint(move |_| Ok(Interest::assert(extra.clone())), false)?;
                Ok(Interest::assert(record("level", value)))
            },
            true,
        )?;
        slot.borrow_mut()
            .push(turn.wrap_external(move |turn, payload| turn.set(level, payload)));
        Ok(())
    });
    ground.run_until_quiescent();
    assert!(ground.dataspace().contains_assertion(&assertion("extra", 0)));
    assert!(ground.dataspace().contains_assertion(&assertion("level", 0)));

    assert!(handles.borrow()[0].invoke(1));
    ground.run_until_quiescent();
    let stats = ground.stats();
    assert_eq!(stats.actor_failures, 1);
    assert_eq!(stats.actor_count, 0);
    assert!(!ground.dataspace().contains_assertion(&assertion("extra", 1)));
    assert!(!ground.dataspace().contains_assertion(&assertion("extra", 0)));
    assert!(!ground.dataspace().contains_assertion(&assertion("level", 1)));
}

#[test]
fn test_dynamic_observer_follows_its_pattern() {
    let log: Log = Rc::default();
    let handles: Handles = Rc::default();
    let (seen, slot) = (Rc::clone(&log), Rc::clone(&handles));
    let mut ground = ground(move |turn| {
        let topic = turn.declare_field("topic", "left")?;
        turn.add_endpoint(
            move |turn| {
                let label = turn.get(topic)?.as_str().unwrap_or_default().to_string();
                Ok(Interest {
                    assertion: None,
                    observer: Some(logging_observer(&label, &seen)),
                })
            },
            true,
        )?;
        slot.borrow_mut()
            .push(turn.wrap_external(move |turn, payload| turn.set(topic, payload)));
        Ok(())
    });
    ground.dataspace_mut().spawn(
        "facts",
        |turn| {
            turn.add_endpoint(|_| Ok(Interest::assert(record("left", 1))), false)?;
            turn.add_endpoint(|_| Ok(Interest::assert(record("right", 2))), false)?;
            Ok(())
        },
        Vec::new(),
    );
    ground.run_until_quiescent();
    assert_eq!(*log.borrow(), vec!["+1"]);
    assert_eq!(ground.stats().handler_count, 1);

    assert!(handles.borrow()[0].invoke("right"));
    ground.run_until_quiescent();
    assert_eq!(*log.borrow(), vec!["+1", "+2"]);
    assert_eq!(ground.stats().handler_count, 1);
}
