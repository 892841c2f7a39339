//! DOT trace output
//!
//! Writes numbered DOT snapshots of element graphs into the configured
//! trace directory. Captured elements render filled so a failing rule's
//! match is visible at a glance. Output is deterministic: vertices and
//! edges are emitted in id order.

use std::fmt::{Debug, Write as _};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::graph::{ElementGraph, ElementId};

pub struct TraceWriter {
    dir: PathBuf,
    counter: u64,
}

impl TraceWriter {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        Ok(Self { dir, counter: 0 })
    }

    /// Write the next snapshot, returning its path.
    pub fn write_graph<N: Debug, S: Debug>(
        &mut self,
        name: &str,
        graph: &ElementGraph<N, S>,
        highlights: &[ElementId],
    ) -> Result<PathBuf> {
        let file = format!("{:04}-{}.dot", self.counter, sanitize(name));
        self.counter += 1;

        let path = self.dir.join(file);
        fs::write(&path, render_dot(graph, highlights))?;

        Ok(path)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

fn render_dot<N: Debug, S: Debug>(graph: &ElementGraph<N, S>, highlights: &[ElementId]) -> String {
    let mut out = String::from("digraph flow {\n  rankdir=TB;\n");

    for id in graph.vertices() {
        let label = match graph.element(id) {
            Some(element) => escape(&format!("{element:?}")),
            None if id == graph.head() => "head".to_string(),
            None => "tail".to_string(),
        };

        let style = if highlights.contains(&id) {
            ", style=filled, fillcolor=lightgoldenrod"
        } else if graph.is_bookend(id) {
            ", shape=point"
        } else {
            ""
        };

        let _ = writeln!(out, "  n{} [label=\"{}\"{}];", id.index(), label, style);
    }

    for scope in graph.scopes() {
        let (source, target) = graph.scope_endpoints(scope).expect("scope endpoints");
        let label = escape(&format!("{:?}", graph.scope(scope).expect("scope")));

        let _ = writeln!(
            out,
            "  n{} -> n{} [label=\"{}\"];",
            source.index(),
            target.index(),
            label
        );
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (ElementGraph<&'static str, &'static str>, Vec<ElementId>) {
        let mut graph = ElementGraph::new();
        let a = graph.add_element("a");
        let b = graph.add_element("b");
        graph.add_scope(graph.head(), a, "h").unwrap();
        graph.add_scope(a, b, "ab").unwrap();
        graph.add_scope(b, graph.tail(), "t").unwrap();

        (graph, vec![a, b])
    }

    #[test]
    fn test_render_is_deterministic_and_highlights() {
        let (graph, ids) = sample();

        let first = render_dot(&graph, &[ids[0]]);
        let second = render_dot(&graph, &[ids[0]]);

        assert_eq!(first, second);
        assert!(first.contains("fillcolor=lightgoldenrod"));
        assert!(first.contains("label=\"\\\"a\\\"\"")); // Debug of &str quotes it
        assert!(first.contains("-> n"));
    }

    #[test]
    fn test_writer_numbers_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let (graph, _) = sample();

        let mut writer = TraceWriter::new(dir.path()).unwrap();
        let first = writer.write_graph("before rule", &graph, &[]).unwrap();
        let second = writer.write_graph("after rule", &graph, &[]).unwrap();

        assert!(first.file_name().unwrap().to_str().unwrap().starts_with("0000-before-rule"));
        assert!(second.file_name().unwrap().to_str().unwrap().starts_with("0001-after-rule"));
        assert!(fs::read_to_string(first).unwrap().starts_with("digraph flow {"));
    }
}
