use std::time::Duration;

use serde_json::json;

use influence_layout::engine::{
    Command, EngineError, EngineFailure, EngineOptions, Event, ForceConfigPatch, LayoutEngine,
    PinUpdate,
};
use influence_layout::graph::{Dimensions, GraphError, Link, Node, parse_graph_json};
use influence_layout::placement::PlacementOptions;

const WAIT: Duration = Duration::from_secs(10);

fn next_event(engine: &LayoutEngine) -> Event {
    engine
        .recv_timeout(WAIT)
        .unwrap()
        .unwrap_or_else(|| panic!("engine went quiet"))
}

/// Collects events up to and including the next `complete`.
fn until_complete(engine: &LayoutEngine) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let event = next_event(engine);
        let done = matches!(event, Event::Complete { .. } | Event::Error { .. });
        events.push(event);
        if done {
            return events;
        }
    }
}

fn star(leaves: usize) -> (Vec<Node>, Vec<Link>) {
    let mut nodes = vec![Node::new("hub", "Hub")];
    let mut links = Vec::new();
    for index in 0..leaves {
        let id = format!("leaf{index}");
        links.push(Link::new("hub", id.as_str()));
        nodes.push(Node::new(id, format!("Leaf {index}")));
    }
    (nodes, links)
}

fn iterations(count: usize) -> Option<ForceConfigPatch> {
    Some(ForceConfigPatch {
        iterations: Some(count),
        ..ForceConfigPatch::default()
    })
}

#[test]
fn empty_graph_completes_immediately() {
    let engine = LayoutEngine::spawn().unwrap();
    let run = engine.initialize(&[], &[], None, None).unwrap();
    let events = until_complete(&engine);
    assert_eq!(
        events,
        vec![
            Event::Progress {
                run,
                progress: 1.0,
                nodes: Vec::new(),
            },
            Event::Complete {
                run,
                nodes: Vec::new(),
            },
        ]
    );
}

#[test]
fn unknown_edge_reference_is_rejected_synchronously() {
    let engine = LayoutEngine::spawn().unwrap();
    let error = engine
        .initialize(&[Node::new("a", "A")], &[Link::new("a", "z")], None, None)
        .unwrap_err();
    assert!(matches!(
        &error,
        EngineError::Validation(GraphError::UnknownEndpoint { id, .. }) if id == "z"
    ));
    assert!(error.to_string().contains("\"z\""));
    assert!(engine.recv_timeout(Duration::from_millis(50)).unwrap().is_none());
}

#[test]
fn raw_initialize_with_bad_link_reports_error_event() {
    let engine = LayoutEngine::spawn().unwrap();
    let command: Command = serde_json::from_value(json!({
        "type": "initialize",
        "nodes": [{ "id": "a", "name": "A" }],
        "links": [{ "source": "a", "target": "z" }],
    }))
    .unwrap();
    engine.send(command).unwrap();
    match next_event(&engine) {
        Event::Error {
            error: EngineFailure::Validation { message },
            ..
        } => assert!(message.contains("\"z\"")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn raw_initialize_ignores_supplied_degree() {
    let command: Command = serde_json::from_value(json!({
        "type": "initialize",
        "run": 1,
        "nodes": [{ "id": "a", "degree": 2.5 }, { "id": "b", "degree": -1 }],
        "links": [{ "source": "a", "target": "b" }],
        "config": { "iterations": 10 },
    }))
    .unwrap();
    let engine = LayoutEngine::spawn().unwrap();
    engine.send(command).unwrap();
    let Some(Event::Complete { run, nodes }) = until_complete(&engine).pop() else {
        panic!("layout did not complete");
    };
    assert_eq!(run, 1);
    assert!(nodes.iter().all(|node| node.degree == 1));
}

#[test]
fn batch_count_matches_iteration_cap() {
    let engine = LayoutEngine::spawn().unwrap();
    let (nodes, links) = star(6);
    engine
        .initialize(&nodes, &links, None, iterations(95))
        .unwrap();
    let events = until_complete(&engine);
    let progress = events
        .iter()
        .filter(|event| matches!(event, Event::Progress { .. }))
        .count();
    assert_eq!(progress, 10);
    assert!(matches!(events.last(), Some(Event::Complete { nodes, .. }) if nodes.len() == 7));
}

#[test]
fn pinned_node_stays_put_for_later_batches() {
    let engine = LayoutEngine::spawn().unwrap();
    let (nodes, links) = star(5);
    engine
        .initialize(&nodes, &links, Some(Dimensions::new(900.0, 700.0)), iterations(120))
        .unwrap();
    engine
        .update(vec![PinUpdate::pin("leaf2", 10.0, 20.0)])
        .unwrap();

    let mut checked = 0;
    for event in until_complete(&engine) {
        let Some(nodes) = event.nodes() else { continue };
        let leaf = nodes.iter().find(|node| node.id == "leaf2").unwrap();
        if leaf.fx.is_some() {
            assert_eq!((leaf.x, leaf.y), (10.0, 20.0));
            checked += 1;
        }
    }
    assert!(checked >= 5, "only {checked} snapshots carried the pin");
}

#[test]
fn placement_is_repeatable_without_jitter() {
    let options = EngineOptions {
        placement: PlacementOptions::without_jitter(),
        ..EngineOptions::default()
    };
    let (nodes, links) = star(4);
    let mut runs = Vec::new();
    for _ in 0..2 {
        let engine = LayoutEngine::spawn_with(options).unwrap();
        engine
            .initialize(&nodes, &links, None, iterations(20))
            .unwrap();
        runs.push(until_complete(&engine));
    }
    assert_eq!(runs[0], runs[1]);
}

#[test]
fn reheat_after_complete_runs_again() {
    let engine = LayoutEngine::spawn().unwrap();
    let (nodes, links) = star(3);
    engine
        .initialize(&nodes, &links, None, iterations(20))
        .unwrap();
    until_complete(&engine);

    let run = engine.reheat().unwrap();
    let events = until_complete(&engine);
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|event| event.run() == run));
}

#[test]
fn manual_tick_reports_positions() {
    let engine = LayoutEngine::spawn().unwrap();
    let (nodes, links) = star(2);
    engine
        .initialize(&nodes, &links, None, iterations(10))
        .unwrap();
    until_complete(&engine);

    engine.tick().unwrap();
    assert!(matches!(next_event(&engine), Event::Positions { nodes, .. } if nodes.len() == 3));
}

#[test]
fn engines_run_independently() {
    let first = LayoutEngine::spawn().unwrap();
    let second = LayoutEngine::spawn().unwrap();
    let (nodes, links) = star(3);
    first
        .initialize(&nodes, &links, None, iterations(30))
        .unwrap();
    second.initialize(&[], &[], None, None).unwrap();

    assert_eq!(until_complete(&second).len(), 2);
    assert_eq!(until_complete(&first).len(), 4);
}

#[test]
fn loaded_dataset_feeds_the_engine() {
    let data = parse_graph_json(
        &json!({
            "nodes": [
                { "id": 1, "name": "Plato", "community": 0, "era": "Ancient" },
                { "id": 2, "name": "Aristotle", "community": 0, "era": "Ancient" },
                { "id": "kant", "name": "Kant", "community": "modern", "birthYear": 1724 }
            ],
            "edges": [
                { "source": 1, "target": 2, "relation": "Student of" },
                { "source": "2", "target": "kant" }
            ]
        })
        .to_string(),
    )
    .unwrap();

    let engine = LayoutEngine::spawn().unwrap();
    engine
        .initialize(&data.nodes, &data.links, None, iterations(10))
        .unwrap();
    let Some(Event::Complete { nodes, .. }) = until_complete(&engine).pop() else {
        panic!("layout did not complete");
    };
    let degrees = nodes.iter().map(|node| node.degree).collect::<Vec<_>>();
    assert_eq!(degrees, vec![1, 2, 1]);
    assert!(nodes.iter().all(Node::has_finite_position));
}
