//! Task construction for a node about to be dispatched.
//!
//! One pure policy covers every node shape, branching on how many
//! predecessors the node has:
//!
//! | predecessors | task                                   | context                    |
//! |--------------|----------------------------------------|----------------------------|
//! | 0 (root)     | the run's initial message              | empty                      |
//! | 1 (chain)    | node's fixed task, else upstream answer| upstream answer if fixed   |
//! | 2+ (merge)   | node's fixed task, else synthesis text | every upstream answer      |

use std::collections::BTreeMap;

use agents::AgentResult;

use crate::models::Node;

/// Task text and labelled upstream outputs for one agent call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTask {
    pub task: String,
    pub context: BTreeMap<String, String>,
}

/// Build the input for `node`.
///
/// `predecessors` lists each direct predecessor with its recorded result, in
/// edge declaration order. Convergence contexts are keyed by the
/// predecessor's branch name (or node id when it has none); if two
/// predecessors would share a key, the later one falls back to its node id.
pub fn build_node_task(
    node: &Node,
    predecessors: &[(&Node, &AgentResult)],
    initial_message: &str,
    synthesis_instruction: &str,
) -> NodeTask {
    match predecessors {
        [] => NodeTask {
            task: initial_message.to_owned(),
            context: BTreeMap::new(),
        },
        [(upstream, result)] => match &node.task {
            Some(task) => NodeTask {
                task: task.clone(),
                context: BTreeMap::from([(
                    upstream.branch_key().to_owned(),
                    result.answer.clone(),
                )]),
            },
            None => NodeTask {
                task: result.answer.clone(),
                context: BTreeMap::new(),
            },
        },
        _ => {
            let mut context = BTreeMap::new();
            for (upstream, result) in predecessors {
                let key = unique_key(&context, upstream);
                context.insert(key, result.answer.clone());
            }
            NodeTask {
                task: node
                    .task
                    .clone()
                    .unwrap_or_else(|| synthesis_instruction.to_owned()),
                context,
            }
        }
    }
}

fn unique_key(context: &BTreeMap<String, String>, upstream: &Node) -> String {
    let preferred = upstream.branch_key();
    if !context.contains_key(preferred) {
        return preferred.to_owned();
    }
    if !context.contains_key(&upstream.node_id) {
        return upstream.node_id.clone();
    }
    (2..)
        .map(|n| format!("{}_{n}", upstream.node_id))
        .find(|k| !context.contains_key(k))
        .unwrap_or_else(|| upstream.node_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYNTH: &str = "Synthesize the results";

    #[test]
    fn root_gets_the_initial_message() {
        let node = Node::new("root", "a").with_task("ignored for roots");
        let task = build_node_task(&node, &[], "research rust", SYNTH);
        assert_eq!(task.task, "research rust");
        assert!(task.context.is_empty());
    }

    #[test]
    fn chain_node_forwards_the_upstream_answer() {
        let up = Node::new("a", "x");
        let node = Node::new("b", "y");
        let result = AgentResult::completed("findings");

        let task = build_node_task(&node, &[(&up, &result)], "start", SYNTH);
        assert_eq!(task.task, "findings");
        assert!(task.context.is_empty());
    }

    #[test]
    fn chain_node_with_fixed_task_sees_upstream_in_context() {
        let up = Node::new("a", "x").with_branch("research");
        let node = Node::new("b", "y").with_task("Summarize");
        let result = AgentResult::completed("findings");

        let task = build_node_task(&node, &[(&up, &result)], "start", SYNTH);
        assert_eq!(task.task, "Summarize");
        assert_eq!(task.context.get("research").map(String::as_str), Some("findings"));
    }

    #[test]
    fn convergence_node_gets_every_branch_by_name() {
        let web = Node::new("b", "x").with_branch("web");
        let docs = Node::new("c", "x");
        let merge = Node::new("d", "y");
        let (rw, rd) = (AgentResult::completed("from web"), AgentResult::completed("from docs"));

        let task = build_node_task(&merge, &[(&web, &rw), (&docs, &rd)], "start", SYNTH);
        assert_eq!(task.task, SYNTH);
        assert_eq!(task.context.len(), 2);
        assert_eq!(task.context["web"], "from web");
        assert_eq!(task.context["c"], "from docs");
    }

    #[test]
    fn convergence_node_fixed_task_overrides_synthesis() {
        let (a, b) = (Node::new("a", "x"), Node::new("b", "x"));
        let merge = Node::new("m", "y").with_task("Compare both answers");
        let r = AgentResult::completed("r");
        let task = build_node_task(&merge, &[(&a, &r), (&b, &r)], "start", SYNTH);
        assert_eq!(task.task, "Compare both answers");
    }

    #[test]
    fn colliding_branch_names_fall_back_to_node_ids() {
        let a = Node::new("a", "x").with_branch("same");
        let b = Node::new("b", "x").with_branch("same");
        let c = Node::new("same", "x");
        let merge = Node::new("m", "y");
        let (ra, rb, rc) = (
            AgentResult::completed("A"),
            AgentResult::completed("B"),
            AgentResult::completed("C"),
        );

        let task = build_node_task(&merge, &[(&a, &ra), (&b, &rb), (&c, &rc)], "s", SYNTH);
        assert_eq!(task.context.len(), 3);
        assert_eq!(task.context["same"], "A");
        assert_eq!(task.context["b"], "B");
        assert_eq!(task.context["same_2"], "C");
    }
}
