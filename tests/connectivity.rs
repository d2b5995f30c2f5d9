//! Replay tests for the connectivity graph: after an arbitrary sequence
//! of connect/disconnect calls the graph must contain exactly the edges a
//! naive set-union/set-difference simulation of the same sequence implies.

use simbus::{CommunicationType, Connectivity, ProcessingMethod};

type Key = (String, String, String, String, CommunicationType, ProcessingMethod);

#[derive(Clone)]
enum Op {
    Connect(&'static str, &'static str, &'static str, &'static str, Option<u32>),
    DisconnectEdge(&'static str, &'static str, &'static str, &'static str),
    DisconnectPort(&'static str, &'static str),
}

fn key(sa: &str, sp: &str, ra: &str, rp: &str) -> Key {
    (
        sa.to_string(),
        sp.to_string(),
        ra.to_string(),
        rp.to_string(),
        CommunicationType::Event,
        ProcessingMethod::Collective,
    )
}

fn replay(ops: &[Op]) -> (Connectivity, Vec<Key>) {
    let mut graph = Connectivity::new("a");
    let mut naive: Vec<Key> = Vec::new();

    for op in ops {
        match op {
            Op::Connect(sa, sp, ra, rp, width) => {
                graph
                    .connect(
                        sa,
                        sp,
                        ra,
                        rp,
                        *width,
                        CommunicationType::Event,
                        ProcessingMethod::Collective,
                    )
                    .unwrap();
                naive.push(key(sa, sp, ra, rp));
            }
            Op::DisconnectEdge(sa, sp, ra, rp) => {
                graph.disconnect_edge(sa, sp, ra, rp);
                naive.retain(|k| !(k.0 == *sa && k.1 == *sp && k.2 == *ra && k.3 == *rp));
            }
            Op::DisconnectPort(app, port) => {
                graph.disconnect_port(app, port);
                naive.retain(|k| !(k.0 == *app && k.1 == *port) && !(k.2 == *app && k.3 == *port));
            }
        }
    }
    (graph, naive)
}

fn assert_matches_naive(graph: &Connectivity, naive: &[Key]) {
    let edges: Vec<Key> = graph
        .edges()
        .iter()
        .map(|e| {
            (
                e.from.app.clone(),
                e.from.port.clone(),
                e.to.app.clone(),
                e.to.port.clone(),
                e.comm,
                e.method,
            )
        })
        .collect();
    assert_eq!(edges, naive);
}

#[test]
fn replay_matches_naive_simulation() {
    let ops = [
        Op::Connect("a", "out1", "b", "in1", Some(8)),
        Op::Connect("a", "out1", "c", "in1", Some(8)),
        Op::Connect("b", "out2", "a", "in2", None),
        Op::DisconnectEdge("a", "out1", "c", "in1"),
        Op::Connect("a", "out3", "c", "in3", None),
        Op::DisconnectPort("a", "out1"),
        // Re-issuing removals of things already gone must be no-ops.
        Op::DisconnectEdge("a", "out1", "b", "in1"),
        Op::DisconnectPort("a", "out1"),
    ];
    let (graph, naive) = replay(&ops);

    assert_matches_naive(&graph, &naive);
    assert_eq!(graph.num_edges(), 2);
    assert!(graph.info("out1").is_none());
    assert!(graph.is_connected("in2"));
    assert!(graph.is_connected("out3"));
}

#[test]
fn disconnect_everything_leaves_empty_graph() {
    let ops = [
        Op::Connect("a", "out", "b", "in", None),
        Op::Connect("b", "out", "a", "in", Some(4)),
        Op::DisconnectPort("a", "out"),
        Op::DisconnectPort("b", "out"),
    ];
    let (graph, naive) = replay(&ops);

    assert!(naive.is_empty());
    assert_matches_naive(&graph, &naive);
    assert!(graph.info("out").is_none());
    assert!(graph.info("in").is_none());
}

#[test]
fn reconnect_after_full_disconnect() {
    let ops = [
        Op::Connect("a", "out", "b", "in", Some(8)),
        Op::DisconnectPort("a", "out"),
        // After removal the identifier is free again, even with another width.
        Op::Connect("a", "out", "b", "in", Some(16)),
    ];
    let (graph, naive) = replay(&ops);

    assert_matches_naive(&graph, &naive);
    assert_eq!(graph.info("out").unwrap().width(), Some(16));
}
