//! # Relay Path Computation
//!
//! Pure function from a connectivity mesh to per-peer routing tables.
//!
//! ## Algorithm
//!
//! 1. Reported connections are treated as undirected edges; self-loops are
//!    ignored. Every peer that reports or is reported gets a table.
//! 2. For each unordered pair `(a, b)` with `a < b`, hop counts to `b` come
//!    from one breadth-first sweep (shared by every source in the pass). A
//!    greedy descent from `a` then steps to the smallest neighbour that is
//!    one hop closer to `b` and not already on the path. This stands in for
//!    an exhaustive depth-first search with cycle exclusion: it returns the
//!    same shortest path, and among equal-length paths the lexicographically
//!    smallest relay sequence, without enumerating every simple path.
//! 3. The route `b -> a` is the reversal of `a -> b`.
//! 4. Routes from every node visited on a descent are memoized for the rest
//!    of the pass. Nothing is cached across passes.
//!
//! Pairs in disjoint components have no entry.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Adjacency lists keyed by peer.
pub type Mesh<K> = BTreeMap<K, BTreeSet<K>>;

/// Destination -> relays in hop order. Empty means directly connected.
pub type RoutingTable<K> = BTreeMap<K, Vec<K>>;

/// Make every edge bidirectional and give every mentioned peer an entry.
#[must_use]
pub fn symmetrize<K: Ord + Clone>(mesh: &Mesh<K>) -> Mesh<K> {
    let mut graph: Mesh<K> = BTreeMap::new();
    for (peer, neighbours) in mesh {
        graph.entry(peer.clone()).or_default();
        for neighbour in neighbours {
            if neighbour == peer {
                continue;
            }
            graph
                .entry(peer.clone())
                .or_default()
                .insert(neighbour.clone());
            graph
                .entry(neighbour.clone())
                .or_default()
                .insert(peer.clone());
        }
    }
    graph
}

/// Compute the routing table of every peer in `mesh`.
#[must_use]
pub fn compute_routing_tables<K: Ord + Clone>(mesh: &Mesh<K>) -> BTreeMap<K, RoutingTable<K>> {
    let graph = symmetrize(mesh);
    let mut tables: BTreeMap<K, RoutingTable<K>> = graph
        .keys()
        .map(|peer| (peer.clone(), RoutingTable::new()))
        .collect();

    let peers: Vec<&K> = graph.keys().collect();
    let mut pass = RoutingPass::new(&graph);

    for (i, from) in peers.iter().enumerate() {
        for to in &peers[i + 1..] {
            let Some(relays) = pass.route(*from, *to) else {
                continue;
            };
            let reversed: Vec<K> = relays.iter().rev().cloned().collect();
            if let Some(table) = tables.get_mut(*from) {
                table.insert((*to).clone(), relays);
            }
            if let Some(table) = tables.get_mut(*to) {
                table.insert((*from).clone(), reversed);
            }
        }
    }

    tables
}

/// Merge `incoming` into `acc`, keeping the better route per destination.
///
/// Shorter wins; on equal length the lexicographically smaller relay list wins.
pub fn merge_tables<K: Ord + Clone>(acc: &mut RoutingTable<K>, incoming: RoutingTable<K>) {
    for (destination, relays) in incoming {
        match acc.get(&destination) {
            Some(existing)
                if existing.len() < relays.len()
                    || (existing.len() == relays.len() && *existing <= relays) => {}
            _ => {
                acc.insert(destination, relays);
            }
        }
    }
}

/// State scoped to one computation pass.
struct RoutingPass<'a, K> {
    graph: &'a Mesh<K>,
    /// Hop counts to each target, computed on first use
    distances: BTreeMap<&'a K, BTreeMap<&'a K, usize>>,
    /// (node, target) -> relays
    memo: BTreeMap<(&'a K, &'a K), Vec<K>>,
}

impl<'a, K: Ord + Clone> RoutingPass<'a, K> {
    fn new(graph: &'a Mesh<K>) -> Self {
        Self {
            graph,
            distances: BTreeMap::new(),
            memo: BTreeMap::new(),
        }
    }

    fn route(&mut self, from: &'a K, to: &'a K) -> Option<Vec<K>> {
        if let Some(known) = self.memo.get(&(from, to)) {
            return Some(known.clone());
        }

        let graph = self.graph;
        let distances = self
            .distances
            .entry(to)
            .or_insert_with(|| hop_counts(graph, to));
        let mut remaining = *distances.get(from)?;

        let mut on_path: BTreeSet<&'a K> = BTreeSet::from([from]);
        let mut visited: Vec<&'a K> = Vec::new();
        let mut tail: Vec<K> = Vec::new();
        let mut current = from;

        while remaining > 1 {
            if let Some(known) = self.memo.get(&(current, to)) {
                tail = known.clone();
                break;
            }
            let next = graph.get(current)?.iter().find(|n| {
                !on_path.contains(n) && distances.get(n) == Some(&(remaining - 1))
            })?;
            on_path.insert(next);
            visited.push(next);
            current = next;
            remaining -= 1;
        }

        let relays: Vec<K> = visited.iter().map(|k| (*k).clone()).chain(tail).collect();

        // Every suffix of a chosen route is the chosen route of its first node
        let starts = std::iter::once(from).chain(visited.iter().copied());
        for (i, node) in starts.enumerate() {
            self.memo
                .entry((node, to))
                .or_insert_with(|| relays[i..].to_vec());
        }

        Some(relays)
    }
}

/// Breadth-first hop counts from every reachable node to `target`.
fn hop_counts<'a, K: Ord>(graph: &'a Mesh<K>, target: &'a K) -> BTreeMap<&'a K, usize> {
    let mut distances = BTreeMap::from([(target, 0usize)]);
    let mut queue = VecDeque::from([target]);

    while let Some(node) = queue.pop_front() {
        let hops = distances[node] + 1;
        for neighbour in graph.get(node).into_iter().flatten() {
            if !distances.contains_key(neighbour) {
                distances.insert(neighbour, hops);
                queue.push_back(neighbour);
            }
        }
    }
    distances
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Build a mesh from `(reporter, neighbour)` pairs.
    fn mesh(reports: &[(&'static str, &'static str)]) -> Mesh<&'static str> {
        let mut mesh = Mesh::new();
        for (peer, neighbour) in reports {
            mesh.entry(*peer).or_insert_with(BTreeSet::new).insert(*neighbour);
        }
        mesh
    }

    #[test]
    fn test_line_topology() {
        let tables = compute_routing_tables(&mesh(&[("A", "B"), ("B", "C")]));

        assert_eq!(tables["A"]["C"], vec!["B"]);
        assert_eq!(tables["C"]["A"], vec!["B"]);
        assert_eq!(tables["A"]["B"], Vec::<&str>::new());
        assert_eq!(tables["B"]["A"], Vec::<&str>::new());
        assert_eq!(tables["B"]["C"], Vec::<&str>::new());
    }

    #[test]
    fn test_disjoint_components_have_no_entry() {
        let tables = compute_routing_tables(&mesh(&[("A", "B"), ("C", "D")]));

        assert!(!tables["A"].contains_key("D"));
        assert!(!tables["D"].contains_key("A"));
        assert_eq!(tables["C"]["D"], Vec::<&str>::new());
    }

    #[test]
    fn test_isolated_peer_gets_empty_table() {
        let mut reports = mesh(&[("B", "C")]);
        reports.insert("A", BTreeSet::new());
        let tables = compute_routing_tables(&reports);
        assert!(tables["A"].is_empty());
        assert_eq!(tables.len(), 3);
    }

    #[test]
    fn test_one_sided_report_is_bidirectional() {
        // C never reported but still gets a table
        let tables = compute_routing_tables(&mesh(&[("A", "B"), ("B", "C")]));
        assert_eq!(tables["C"]["A"], vec!["B"]);
    }

    #[test]
    fn test_self_loops_ignored() {
        let tables = compute_routing_tables(&mesh(&[("A", "A"), ("A", "B")]));
        assert!(!tables["A"].contains_key("A"));
        assert_eq!(tables["A"]["B"], Vec::<&str>::new());
    }

    #[test]
    fn test_equal_length_tie_break_is_lexicographic() {
        // A-X-D and A-B-D are both two hops
        let tables = compute_routing_tables(&mesh(&[
            ("A", "X"),
            ("A", "B"),
            ("X", "D"),
            ("B", "D"),
        ]));
        assert_eq!(tables["A"]["D"], vec!["B"]);
        assert_eq!(tables["D"]["A"], vec!["B"]);
    }

    #[test]
    fn test_prefers_shortest_over_lexicographic() {
        // A-B-C-E (3 hops) vs A-Z-E (2 hops)
        let tables = compute_routing_tables(&mesh(&[
            ("A", "B"),
            ("A", "Z"),
            ("B", "C"),
            ("C", "E"),
            ("Z", "E"),
        ]));
        assert_eq!(tables["A"]["E"], vec!["Z"]);
    }

    #[test]
    fn test_longer_chain() {
        let tables = compute_routing_tables(&mesh(&[
            ("1", "2"),
            ("1", "5"),
            ("2", "3"),
            ("2", "4"),
            ("3", "4"),
            ("3", "6"),
            ("6", "4"),
            ("6", "7"),
        ]));
        assert_eq!(tables["1"]["7"], vec!["2", "3", "6"]);
        assert_eq!(tables["7"]["5"], vec!["6", "3", "2", "1"]);
        assert_eq!(tables["5"]["4"], vec!["1", "2"]);
    }

    #[test]
    fn test_ring_takes_short_way_round() {
        let tables = compute_routing_tables(&mesh(&[
            ("A", "B"),
            ("B", "C"),
            ("C", "D"),
            ("D", "E"),
            ("E", "A"),
        ]));
        assert_eq!(tables["A"]["C"], vec!["B"]);
        assert_eq!(tables["A"]["D"], vec!["E"]);
        assert_eq!(tables["B"]["E"], vec!["A"]);
        assert_eq!(tables["C"]["E"], vec!["D"]);
    }

    #[test]
    fn test_merge_tables_prefers_shorter_then_smaller() {
        let mut acc: RoutingTable<&str> = BTreeMap::from([("D", vec!["X", "Y"]), ("E", vec!["M"])]);
        let incoming = BTreeMap::from([("D", vec!["Q"]), ("E", vec!["K"]), ("F", vec![])]);
        merge_tables(&mut acc, incoming);

        assert_eq!(acc["D"], vec!["Q"]);
        assert_eq!(acc["E"], vec!["K"]);
        assert_eq!(acc["F"], Vec::<&str>::new());

        merge_tables(&mut acc, BTreeMap::from([("E", vec!["Z"])]));
        assert_eq!(acc["E"], vec!["K"]);
    }

    fn arb_mesh() -> impl Strategy<Value = Mesh<u8>> {
        prop::collection::btree_map(0u8..12, prop::collection::btree_set(0u8..12, 0..4), 0..12)
    }

    proptest! {
        #[test]
        fn prop_routes_are_reversible(m in arb_mesh()) {
            let tables = compute_routing_tables(&m);
            for (from, table) in &tables {
                for (to, relays) in table {
                    let mut reversed = relays.clone();
                    reversed.reverse();
                    prop_assert_eq!(&tables[to][from], &reversed);
                }
            }
        }

        #[test]
        fn prop_routes_follow_edges_without_cycles(m in arb_mesh()) {
            let graph = symmetrize(&m);
            let tables = compute_routing_tables(&m);
            for (from, table) in &tables {
                for (to, relays) in table {
                    let hops: Vec<u8> = std::iter::once(*from)
                        .chain(relays.iter().copied())
                        .chain(std::iter::once(*to))
                        .collect();
                    let unique: BTreeSet<u8> = hops.iter().copied().collect();
                    prop_assert_eq!(unique.len(), hops.len());
                    for pair in hops.windows(2) {
                        prop_assert!(graph[&pair[0]].contains(&pair[1]));
                    }
                }
            }
        }

        #[test]
        fn prop_routes_are_shortest(m in arb_mesh()) {
            let graph = symmetrize(&m);
            let tables = compute_routing_tables(&m);
            for (from, table) in &tables {
                let distances = hop_counts(&graph, from);
                for peer in graph.keys() {
                    if peer == from {
                        continue;
                    }
                    match (table.get(peer), distances.get(peer)) {
                        (Some(relays), Some(hops)) => prop_assert_eq!(relays.len() + 1, *hops),
                        (None, None) => {}
                        _ => prop_assert!(false, "reachability mismatch {} -> {}", from, peer),
                    }
                }
            }
        }
    }
}
