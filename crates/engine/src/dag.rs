//! DAG validation — run this before executing a workflow.
//!
//! Rules enforced, in this order:
//! 1. The graph has at least one node.
//! 2. Node IDs are unique within the workflow.
//! 3. Every edge references valid node IDs (both `from` and `to`).
//! 4. No edge points from a node to itself.
//! 5. The directed graph is acyclic (topological sort must succeed).
//! 6. Treated as undirected, the graph is a single connected component.
//!
//! Returns a topologically-sorted list of node IDs on success.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::{EngineError, models::{Node, WorkflowGraph}};

/// Validate the workflow's DAG and return nodes in topological execution order.
///
/// Among nodes whose dependencies are satisfied, declaration order wins, so
/// the result is deterministic for a given graph.
///
/// # Errors
/// - [`EngineError::EmptyGraph`] if there are no nodes.
/// - [`EngineError::DuplicateNodeIds`] if two nodes share an ID.
/// - [`EngineError::UnknownNodeReference`] if an edge references a missing node.
/// - [`EngineError::SelfLoop`] if an edge starts and ends at the same node.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
/// - [`EngineError::Disconnected`] if some node can't be reached from the rest.
pub fn validate_dag(workflow: &WorkflowGraph) -> Result<Vec<String>, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Non-empty
    // -----------------------------------------------------------------------
    if workflow.nodes.is_empty() {
        return Err(EngineError::EmptyGraph);
    }

    // -----------------------------------------------------------------------
    // 2. Ensure node IDs are unique
    // -----------------------------------------------------------------------
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut duplicates: BTreeSet<&str> = BTreeSet::new();
    for node in &workflow.nodes {
        if !seen_ids.insert(node.node_id.as_str()) {
            duplicates.insert(node.node_id.as_str());
        }
    }
    if !duplicates.is_empty() {
        return Err(EngineError::DuplicateNodeIds(
            duplicates.into_iter().map(str::to_owned).collect(),
        ));
    }

    // -----------------------------------------------------------------------
    // 3. Validate edge endpoints
    // -----------------------------------------------------------------------
    for edge in &workflow.edges {
        if !seen_ids.contains(edge.from.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.from.clone(),
                side: "from",
            });
        }
        if !seen_ids.contains(edge.to.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.to.clone(),
                side: "to",
            });
        }
    }

    // -----------------------------------------------------------------------
    // 4. Reject self-loops
    // -----------------------------------------------------------------------
    if let Some(edge) = workflow.edges.iter().find(|e| e.from == e.to) {
        return Err(EngineError::SelfLoop(edge.from.clone()));
    }

    // -----------------------------------------------------------------------
    // 5. Topological sort (Kahn's algorithm)
    // -----------------------------------------------------------------------
    let adjacency = Adjacency::build(workflow);
    let mut in_degree: HashMap<&str, usize> = workflow
        .nodes
        .iter()
        .map(|n| (n.node_id.as_str(), adjacency.upstream(&n.node_id).len()))
        .collect();

    // Seed the queue with nodes that have no incoming edges.
    let mut queue: VecDeque<&str> = workflow
        .nodes
        .iter()
        .map(|n| n.node_id.as_str())
        .filter(|id| in_degree[id] == 0)
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(workflow.nodes.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.push(node_id.to_owned());

        for &neighbour in adjacency.downstream(node_id) {
            if let Some(deg) = in_degree.get_mut(neighbour) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(neighbour);
                }
            }
        }
    }

    // If we didn't visit every node the graph contains a cycle.
    if sorted.len() != workflow.nodes.len() {
        return Err(EngineError::CycleDetected {
            node_id: node_on_cycle(workflow, &adjacency, &in_degree),
        });
    }

    // -----------------------------------------------------------------------
    // 6. Weak connectivity (undirected BFS from the first node)
    // -----------------------------------------------------------------------
    let first = workflow.nodes[0].node_id.as_str();
    let mut reached: HashSet<&str> = HashSet::from([first]);
    let mut frontier: VecDeque<&str> = VecDeque::from([first]);

    while let Some(node_id) = frontier.pop_front() {
        let neighbours = adjacency
            .downstream(node_id)
            .iter()
            .chain(adjacency.upstream(node_id));
        for &neighbour in neighbours {
            if reached.insert(neighbour) {
                frontier.push_back(neighbour);
            }
        }
    }

    if reached.len() != workflow.nodes.len() {
        let isolated = workflow
            .nodes
            .iter()
            .filter(|n| !reached.contains(n.node_id.as_str()))
            .map(|n| n.node_id.clone())
            .collect();
        return Err(EngineError::Disconnected { isolated });
    }

    Ok(sorted)
}

/// Pick a node that lies on a cycle.
///
/// Every node Kahn's algorithm left behind still has a predecessor that was
/// left behind too, so walking predecessors inside that remainder must
/// eventually revisit a node, and the first revisited node is on a cycle.
fn node_on_cycle(
    workflow: &WorkflowGraph,
    adjacency: &Adjacency<'_>,
    in_degree: &HashMap<&str, usize>,
) -> String {
    let remaining = |id: &str| in_degree.get(id).is_some_and(|&d| d > 0);

    let Some(start) = workflow
        .nodes
        .iter()
        .map(|n| n.node_id.as_str())
        .find(|&id| remaining(id))
    else {
        return String::new();
    };

    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = start;
    while visited.insert(current) {
        match adjacency.upstream(current).iter().find(|&&up| remaining(up)) {
            Some(&up) => current = up,
            None => break,
        }
    }
    current.to_owned()
}

// ---------------------------------------------------------------------------
// Adjacency
// ---------------------------------------------------------------------------

/// Forward and reverse adjacency lists borrowed from a graph.
#[derive(Debug)]
struct Adjacency<'a> {
    downstream: HashMap<&'a str, Vec<&'a str>>,
    upstream: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> Adjacency<'a> {
    fn build(workflow: &'a WorkflowGraph) -> Self {
        let mut downstream: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut upstream: HashMap<&str, Vec<&str>> = HashMap::new();

        for node in &workflow.nodes {
            downstream.entry(node.node_id.as_str()).or_default();
            upstream.entry(node.node_id.as_str()).or_default();
        }
        for edge in &workflow.edges {
            downstream
                .entry(edge.from.as_str())
                .or_default()
                .push(edge.to.as_str());
            upstream
                .entry(edge.to.as_str())
                .or_default()
                .push(edge.from.as_str());
        }

        Self {
            downstream,
            upstream,
        }
    }

    fn downstream(&self, node_id: &str) -> &[&'a str] {
        self.downstream.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn upstream(&self, node_id: &str) -> &[&'a str] {
        self.upstream.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// ValidatedGraph
// ---------------------------------------------------------------------------

/// A workflow graph that passed [`validate_dag`], with its dependency
/// structure precomputed.
///
/// The scheduler only accepts this type, so an invalid graph can't reach
/// execution.
#[derive(Debug, Clone)]
pub struct ValidatedGraph {
    graph: WorkflowGraph,
    order: Vec<String>,
    /// node index -> predecessor node indices, in edge declaration order.
    predecessors: Vec<Vec<usize>>,
    /// node index -> successor node indices, in edge declaration order.
    successors: Vec<Vec<usize>>,
    index: HashMap<String, usize>,
}

impl ValidatedGraph {
    /// Validate `graph` and take ownership of it.
    pub fn new(graph: WorkflowGraph) -> Result<Self, EngineError> {
        let order = validate_dag(&graph)?;

        let index: HashMap<String, usize> = graph
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.node_id.clone(), i))
            .collect();

        let mut predecessors = vec![Vec::new(); graph.nodes.len()];
        let mut successors = vec![Vec::new(); graph.nodes.len()];
        for edge in &graph.edges {
            let (from, to) = (index[&edge.from], index[&edge.to]);
            // Parallel duplicate edges add nothing to the dependency structure.
            if !predecessors[to].contains(&from) {
                predecessors[to].push(from);
                successors[from].push(to);
            }
        }

        Ok(Self {
            graph,
            order,
            predecessors,
            successors,
            index,
        })
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Topological order computed by the validator.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.graph.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.graph.nodes[index]
    }

    pub fn index_of(&self, node_id: &str) -> Option<usize> {
        self.index.get(node_id).copied()
    }

    /// Direct predecessors of the node at `index`.
    pub fn predecessors(&self, index: usize) -> &[usize] {
        &self.predecessors[index]
    }

    /// Direct successors of the node at `index`.
    pub fn successors(&self, index: usize) -> &[usize] {
        &self.successors[index]
    }

    /// Nodes without predecessors, in declaration order.
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(|&i| self.predecessors[i].is_empty())
    }

    /// `true` when the node has two or more predecessors.
    pub fn is_convergence(&self, index: usize) -> bool {
        self.predecessors[index].len() > 1
    }

    pub fn into_inner(self) -> WorkflowGraph {
        self.graph
    }
}

impl TryFrom<WorkflowGraph> for ValidatedGraph {
    type Error = EngineError;

    fn try_from(graph: WorkflowGraph) -> Result<Self, Self::Error> {
        Self::new(graph)
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Edge;

    fn make_node(id: &str) -> Node {
        Node::new(id, "agent")
    }

    fn make_workflow(nodes: Vec<Node>, edges: Vec<Edge>) -> WorkflowGraph {
        WorkflowGraph::new("test", nodes, edges)
    }

    fn nodes(ids: &[&str]) -> Vec<Node> {
        ids.iter().map(|id| make_node(id)).collect()
    }

    fn edges(pairs: &[(&str, &str)]) -> Vec<Edge> {
        pairs.iter().map(|(f, t)| Edge::new(*f, *t)).collect()
    }

    fn assert_topological(workflow: &WorkflowGraph, sorted: &[String]) {
        assert_eq!(sorted.len(), workflow.nodes.len());
        let pos = |id: &str| sorted.iter().position(|s| s == id).unwrap();
        for edge in &workflow.edges {
            assert!(
                pos(&edge.from) < pos(&edge.to),
                "{} must precede {} in {:?}",
                edge.from,
                edge.to,
                sorted
            );
        }
    }

    #[test]
    fn valid_linear_dag_returns_sorted_order() {
        // A → B → C
        let workflow = make_workflow(nodes(&["a", "b", "c"]), edges(&[("a", "b"), ("b", "c")]));

        let sorted = validate_dag(&workflow).expect("should be valid");
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn declaration_order_does_not_have_to_be_topological() {
        let workflow = make_workflow(nodes(&["c", "b", "a"]), edges(&[("a", "b"), ("b", "c")]));
        let sorted = validate_dag(&workflow).expect("should be valid");
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn valid_diamond_dag() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let workflow = make_workflow(
            nodes(&["a", "b", "c", "d"]),
            edges(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]),
        );

        let sorted = validate_dag(&workflow).expect("should be valid");
        // 'a' must be first, 'd' must be last.
        assert_eq!(sorted.first().unwrap(), "a");
        assert_eq!(sorted.last().unwrap(), "d");
        assert_topological(&workflow, &sorted);
    }

    #[test]
    fn wide_fan_in_with_several_roots_is_topological() {
        let workflow = make_workflow(
            nodes(&["merge", "r1", "r2", "r3", "mid", "tail"]),
            edges(&[
                ("r1", "mid"),
                ("r2", "merge"),
                ("mid", "merge"),
                ("r3", "merge"),
                ("merge", "tail"),
                ("r1", "tail"),
            ]),
        );
        let sorted = validate_dag(&workflow).expect("should be valid");
        assert_topological(&workflow, &sorted);
    }

    #[test]
    fn single_node_no_edges_is_valid() {
        let workflow = make_workflow(vec![make_node("solo")], vec![]);
        let sorted = validate_dag(&workflow).expect("single node should be valid");
        assert_eq!(sorted, vec!["solo"]);
    }

    #[test]
    fn empty_graph_is_rejected() {
        let workflow = make_workflow(vec![], vec![]);
        assert_eq!(validate_dag(&workflow), Err(EngineError::EmptyGraph));
    }

    #[test]
    fn duplicate_node_ids_are_all_listed() {
        let workflow = make_workflow(
            nodes(&["b", "a", "b", "a", "c", "a"]),
            edges(&[("ghost", "a")]), // duplicates are reported before edges are checked
        );
        assert_eq!(
            validate_dag(&workflow),
            Err(EngineError::DuplicateNodeIds(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn edge_referencing_missing_node_is_rejected() {
        let workflow = make_workflow(
            vec![make_node("a")],
            edges(&[("a", "ghost")]), // ghost doesn't exist
        );
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::UnknownNodeReference { node_id, side: "to" }) if node_id == "ghost"
        ));

        let workflow = make_workflow(vec![make_node("a")], edges(&[("phantom", "a")]));
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::UnknownNodeReference { node_id, side: "from" }) if node_id == "phantom"
        ));
    }

    #[test]
    fn self_loop_is_rejected() {
        let workflow = make_workflow(nodes(&["a", "b"]), edges(&[("a", "b"), ("b", "b")]));
        assert_eq!(
            validate_dag(&workflow),
            Err(EngineError::SelfLoop("b".into()))
        );
    }

    #[test]
    fn cycle_is_detected() {
        // A → B → C → A  (cycle!)
        let workflow = make_workflow(
            nodes(&["a", "b", "c"]),
            edges(&[("a", "b"), ("b", "c"), ("c", "a")]), // back-edge
        );
        let err = validate_dag(&workflow).unwrap_err();
        assert!(matches!(
            &err,
            EngineError::CycleDetected { node_id } if ["a", "b", "c"].contains(&node_id.as_str())
        ));
    }

    #[test]
    fn cycle_behind_a_valid_prefix_names_a_node_on_the_cycle() {
        // root → x → y → z → y, plus z → tail. Only y and z are on the cycle.
        let workflow = make_workflow(
            nodes(&["root", "x", "tail", "y", "z"]),
            edges(&[("root", "x"), ("x", "y"), ("y", "z"), ("z", "y"), ("z", "tail")]),
        );
        match validate_dag(&workflow) {
            Err(EngineError::CycleDetected { node_id }) => {
                assert!(node_id == "y" || node_id == "z", "got {node_id}");
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn cycle_is_reported_even_when_disconnected() {
        // A lone root plus an unreachable two-node cycle: cycle wins.
        let workflow = make_workflow(nodes(&["a", "p", "q"]), edges(&[("p", "q"), ("q", "p")]));
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::CycleDetected { .. })
        ));
    }

    #[test]
    fn disconnected_components_are_rejected() {
        // a → b   and   c → d
        let workflow = make_workflow(
            nodes(&["a", "b", "c", "d", "e"]),
            edges(&[("a", "b"), ("c", "d")]),
        );
        assert_eq!(
            validate_dag(&workflow),
            Err(EngineError::Disconnected {
                isolated: vec!["c".into(), "d".into(), "e".into()]
            })
        );
    }

    #[test]
    fn weak_connectivity_ignores_edge_direction() {
        // a → c ← b : b is only reachable against the edge direction.
        let workflow = make_workflow(nodes(&["a", "b", "c"]), edges(&[("a", "c"), ("b", "c")]));
        let sorted = validate_dag(&workflow).expect("weakly connected graph is valid");
        assert_topological(&workflow, &sorted);
    }

    #[test]
    fn validated_graph_exposes_dependency_structure() {
        let workflow = make_workflow(
            nodes(&["a", "b", "c", "d"]),
            edges(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d"), ("c", "d")]),
        );
        let validated = ValidatedGraph::try_from(workflow).expect("valid");

        let d = validated.index_of("d").unwrap();
        assert!(validated.is_convergence(d));
        assert_eq!(validated.predecessors(d).len(), 2);
        assert_eq!(validated.roots().collect::<Vec<_>>(), vec![0]);
        assert_eq!(validated.successors(0).len(), 2);
        assert_eq!(validated.order().last().map(String::as_str), Some("d"));
        assert_eq!(validated.len(), 4);
    }

    #[test]
    fn validated_graph_rejects_invalid_input() {
        let err = ValidatedGraph::new(make_workflow(vec![], vec![])).unwrap_err();
        assert_eq!(err, EngineError::EmptyGraph);
    }
}
