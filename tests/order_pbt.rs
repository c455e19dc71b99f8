mod common;

use common::{call_log, RecordingFacet};
use evoworld_core::{AttachError, Context, World};
use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use proptest::prelude::*;
use std::collections::HashMap;

const POOL: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

#[derive(Debug, Clone)]
struct Plan {
    id: usize,
    before: Option<usize>,
    after: Option<usize>,
}

prop_compose! {
    fn arb_plan()(
        id in 0..POOL.len(),
        before in proptest::option::of(0..POOL.len()),
        after in proptest::option::of(0..POOL.len())
    ) -> Plan {
        Plan { id, before, after }
    }
}

/// Edges `x -> y` meaning "x runs before y", limited to attached facets.
fn constraint_graph<'a>(
    attached: &HashMap<&'a str, (Option<&'a str>, Option<&'a str>)>,
) -> DiGraphMap<&'a str, ()> {
    let mut graph = DiGraphMap::new();
    for id in attached.keys() {
        graph.add_node(*id);
    }
    for (id, (before, after)) in attached {
        if let Some(b) = before.filter(|b| attached.contains_key(b) && b != id) {
            graph.add_edge(*id, b, ());
        }
        if let Some(a) = after.filter(|a| attached.contains_key(a) && a != id) {
            graph.add_edge(a, *id, ());
        }
    }
    graph
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn test_solved_order_is_a_linear_extension(plans in prop::collection::vec(arb_plan(), 1..16)) {
        let log = call_log();
        let mut world = World::new();
        let mut attached: HashMap<&str, (Option<&str>, Option<&str>)> = HashMap::new();

        for plan in &plans {
            let id = POOL[plan.id];
            let before = plan.before.map(|i| POOL[i]);
            let after = plan.after.map(|i| POOL[i]);
            let mut facet = RecordingFacet::new(id, &log);
            if let Some(b) = before {
                facet = facet.before(b);
            }
            if let Some(a) = after {
                facet = facet.after(a);
            }

            let order_before = common::order_of(&world);
            match world.attach_facet(id, facet.shared()) {
                Ok(()) => {
                    prop_assert!(!attached.contains_key(id));
                    attached.insert(id, (before, after));
                }
                Err(AttachError::Duplicate(dup)) => {
                    prop_assert_eq!(dup.as_str(), id);
                    prop_assert!(attached.contains_key(id));
                    prop_assert_eq!(common::order_of(&world), order_before);
                }
                Err(AttachError::Unsatisfiable { .. }) => {
                    prop_assert!(!attached.contains_key(id));
                    prop_assert_eq!(common::order_of(&world), order_before);
                }
                Err(AttachError::EmptyIdentifier) => {
                    prop_assert!(false, "pool ids are never empty");
                }
            }
        }

        let order = common::order_of(&world);
        prop_assert_eq!(order.len(), attached.len());

        let graph = constraint_graph(&attached);
        prop_assert!(!is_cyclic_directed(&graph));
        let pos: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        for (from, to, _) in graph.all_edges() {
            prop_assert!(
                pos[from] < pos[to],
                "{} must run before {} in {:?}", from, to, order
            );
        }
    }

    #[test]
    fn test_update_runs_each_facet_once_in_order(
        plans in prop::collection::vec(arb_plan(), 1..12),
        updates in 1i32..6
    ) {
        let log = call_log();
        let mut world = World::new();
        for plan in &plans {
            let mut facet = RecordingFacet::new(POOL[plan.id], &log);
            if let Some(b) = plan.before {
                facet = facet.before(POOL[b]);
            }
            if let Some(a) = plan.after {
                facet = facet.after(POOL[a]);
            }
            let _ = world.attach_facet(POOL[plan.id], facet.shared());
        }

        let order = common::order_of(&world);
        let mut ctx = Context::new(1);
        common::run_updates(&world, &mut ctx, updates);
        let calls = common::take(&log);
        prop_assert_eq!(calls.len(), order.len() * updates as usize);
        for chunk in calls.chunks(order.len().max(1)) {
            prop_assert_eq!(chunk, order.as_slice());
        }
    }
}
