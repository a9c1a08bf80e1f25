//! Splitting a relationship chart into reorderable parts and putting it back together.
//!
//! # Summary
//!
//! A chart is read as five runs of lines:
//!
//! * the *header*, up to and including the line after the first node-attribute line,
//! * *people*, one line per person node (the only reorderable part),
//! * *edges*, every line containing an arrow,
//! * *groups*, multi-line `subgraph` blocks kept as single records,
//! * *families*, everything else (family nodes, blank lines, the closing brace).
//!
//! [Document::assemble_with] concatenates them back in that fixed order. Since edges
//! and groups name nodes by identifier, any permutation of people is still a valid chart.
use itertools::Itertools;

use crate::error::{Error, Kind, OrErrExt};

/// The line markers the segmenter recognizes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Dialect {
    /// Ends the header (after one more line).
    pub node_marker: &'static str,
    pub edge_token: &'static str,
    pub person_prefixes: &'static [&'static str],
    pub group_open: &'static str,
    pub group_close: &'static str,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            node_marker: "node ",
            edge_token: " -> ",
            person_prefixes: &["  I", "  \"I"],
            group_open: "  subgraph",
            group_close: "  }",
        }
    }
}

/// A segmented chart. Every item borrows from the source and keeps its line terminator.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Document<'s> {
    pub header: Vec<&'s str>,
    pub people: Vec<&'s str>,
    pub edges: Vec<&'s str>,
    pub groups: Vec<&'s str>,
    pub families: Vec<&'s str>,
}

impl<'s> Document<'s> {
    /// Reassemble the document with its parsed people ordering.
    pub fn assemble(&self) -> String {
        self.assemble_with(&self.people)
    }

    /// Reassemble the document with `people` in place of the parsed ordering.
    pub fn assemble_with(&self, people: &[&'s str]) -> String {
        self.header
            .iter()
            .chain(people)
            .chain(&self.edges)
            .chain(&self.groups)
            .chain(&self.families)
            .join("")
    }
}

pub fn parse(src: &str) -> Result<Document<'_>, Error> {
    parse_with(src, &Dialect::default())
}

pub fn parse_with<'s>(src: &'s str, dialect: &Dialect) -> Result<Document<'s>, Error> {
    let lines = src.split_inclusive('\n').collect::<Vec<_>>();
    let mut starts = Vec::with_capacity(lines.len());
    let mut pos = 0;
    for line in lines.iter() {
        starts.push(pos);
        pos += line.len();
    }

    let marker = lines
        .iter()
        .position(|l| l.contains(dialect.node_marker))
        .or_err(Kind::MissingMarker { marker: dialect.node_marker.to_string() })?;
    let body_start = (marker + 2).min(lines.len());

    let mut doc = Document { header: lines[..body_start].to_vec(), ..Default::default() };

    let mut j = body_start;
    while j < lines.len() {
        let line = lines[j];
        if line.contains(dialect.edge_token) {
            doc.edges.push(line);
        } else if dialect.person_prefixes.iter().any(|p| line.starts_with(p)) {
            doc.people.push(line);
        } else if line.starts_with(dialect.group_open) {
            // an unterminated group runs to the end of the input
            let end = (j..lines.len())
                .find(|k| lines[*k].starts_with(dialect.group_close))
                .unwrap_or(lines.len() - 1);
            doc.groups.push(&src[starts[j]..starts[end] + lines[end].len()]);
            j = end;
        } else {
            doc.families.push(line);
        }
        j += 1;
    }

    Ok(doc)
}
