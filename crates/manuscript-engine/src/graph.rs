//! View dependency graph.
//!
//! A transform depends on every declared view its SQL reads from; a sink
//! depends on its `from` view. References must point backwards in
//! declaration order, so the graph is acyclic by construction and the
//! compile order is a topological order that breaks ties by declaration
//! position.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use manuscript_types::PipelineSpec;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::PipelineError;

/// A declared entity, by its index within its own list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Source(usize),
    Transform(usize),
    Sink(usize),
}

#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<Entity, ()>,
    names: Vec<String>,
}

impl DependencyGraph {
    /// Build the graph from the validated spec and the rendered SQL of
    /// every transform.
    ///
    /// # Errors
    ///
    /// Returns a config error for a forward or self reference, or a sink
    /// reading from something that is not a source or transform.
    pub fn build(spec: &PipelineSpec, rendered: &[String]) -> Result<Self, PipelineError> {
        let mut graph = DiGraph::new();
        let mut names = Vec::new();
        let mut views: HashMap<&str, NodeIndex> = HashMap::new();

        for (i, source) in spec.sources.iter().enumerate() {
            let node = graph.add_node(Entity::Source(i));
            names.push(source.name.clone());
            views.insert(source.name.as_str(), node);
        }

        let transform_nodes: Vec<NodeIndex> = spec
            .transforms
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let node = graph.add_node(Entity::Transform(i));
                names.push(t.name.clone());
                views.insert(t.name.as_str(), node);
                node
            })
            .collect();

        for ((transform, node), sql) in spec.transforms.iter().zip(&transform_nodes).zip(rendered) {
            for relation in referenced_relations(sql) {
                let Some(&dep) = views.get(relation.as_str()) else {
                    continue;
                };
                if dep == *node {
                    return Err(PipelineError::config(format!(
                        "transform '{}' references itself",
                        transform.name
                    )));
                }
                if dep > *node {
                    return Err(PipelineError::config(format!(
                        "transform '{}' references '{relation}' before it is declared",
                        transform.name
                    )));
                }
                graph.update_edge(dep, *node, ());
            }
        }

        for (i, sink) in spec.sinks.iter().enumerate() {
            let node = graph.add_node(Entity::Sink(i));
            names.push(sink.name.clone());
            let Some(&dep) = views.get(sink.from.as_str()) else {
                return Err(PipelineError::config(format!(
                    "sink '{}' reads from '{}', which is not a declared source or transform",
                    sink.name, sink.from
                )));
            };
            graph.add_edge(dep, node, ());
        }

        Ok(Self { graph, names })
    }

    /// Topological order, lowest declaration position first among ready nodes.
    #[must_use]
    pub fn compile_order(&self) -> Vec<Entity> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(Reverse(i)) = ready.pop() {
            let node = NodeIndex::new(i);
            order.push(self.graph[node]);
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.push(Reverse(next.index()));
                }
            }
        }
        order
    }

    /// Names a declared entity reads from, in declaration order.
    #[must_use]
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        let Some(pos) = self.names.iter().position(|n| n == name) else {
            return Vec::new();
        };
        let mut deps: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(pos), Direction::Incoming)
            .map(NodeIndex::index)
            .collect();
        deps.sort_unstable();
        deps.into_iter().map(|i| self.names[i].as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word { text: String, quoted: bool },
    Punct(char),
}

fn tokenize(sql: &str) -> Vec<Token> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                i += 1;
                while i < chars.len() {
                    if chars[i] == c {
                        if chars.get(i + 1) == Some(&c) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }
            '`' => {
                let mut text = String::new();
                i += 1;
                while i < chars.len() {
                    if chars[i] == '`' {
                        if chars.get(i + 1) == Some(&'`') {
                            text.push('`');
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    text.push(chars[i]);
                    i += 1;
                }
                i += 1;
                tokens.push(Token::Word { text, quoted: true });
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Word {
                    text: chars[start..i].iter().collect(),
                    quoted: false,
                });
            }
            c if c.is_whitespace() => i += 1,
            c => {
                tokens.push(Token::Punct(c));
                i += 1;
            }
        }
    }
    tokens
}

fn is_keyword(token: &Token, keywords: &[&str]) -> bool {
    match token {
        Token::Word { text, quoted: false } => keywords.iter().any(|k| text.eq_ignore_ascii_case(k)),
        _ => false,
    }
}

const RELATION_KEYWORDS: &[&str] = &["FROM", "JOIN"];
const NOT_A_RELATION: &[&str] = &["LATERAL", "UNNEST", "TABLE", "SELECT"];
const CLAUSE_KEYWORDS: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "HAVING", "UNION", "INTERSECT", "EXCEPT", "LIMIT",
    "WINDOW", "SELECT", "MATCH_RECOGNIZE",
];

/// Unqualified relation names read by a query: identifiers in `FROM` and
/// `JOIN` position, including comma-separated `FROM` lists. String
/// literals and comments are ignored; dotted catalog references are not
/// reported.
#[must_use]
pub fn referenced_relations(sql: &str) -> Vec<String> {
    let tokens = tokenize(sql);
    let mut relations: Vec<String> = Vec::new();
    let mut depth = 0usize;
    let mut from_depths: Vec<usize> = Vec::new();
    let mut expect_relation = false;

    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if is_keyword(token, RELATION_KEYWORDS) {
            if from_depths.last() != Some(&depth) {
                from_depths.push(depth);
            }
            expect_relation = true;
        } else if expect_relation {
            expect_relation = false;
            if let Token::Word { text, .. } = token {
                if !is_keyword(token, NOT_A_RELATION) {
                    if tokens.get(i + 1) == Some(&Token::Punct('.')) {
                        // Skip the rest of the qualified name.
                        while tokens.get(i + 1) == Some(&Token::Punct('.')) {
                            i += 2;
                        }
                    } else if !relations.contains(text) {
                        relations.push(text.clone());
                    }
                }
            } else if *token == Token::Punct('(') {
                depth += 1;
            }
        } else {
            match token {
                Token::Punct('(') => depth += 1,
                Token::Punct(')') => {
                    while from_depths.last() == Some(&depth) {
                        from_depths.pop();
                    }
                    depth = depth.saturating_sub(1);
                }
                Token::Punct(',') if from_depths.last() == Some(&depth) => expect_relation = true,
                _ if is_keyword(token, CLAUSE_KEYWORDS) => {
                    if from_depths.last() == Some(&depth) {
                        from_depths.pop();
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    relations
}
