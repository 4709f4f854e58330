//! Canonical text form of a graph, the input to graph digests and signatures.
//!
//! Each triple renders as `<subject> <predicate> object`, with the object in
//! the `Display` form of [`Object`](crate::term::Object). Resources are
//! bracketed and escaped, so spaces or line breaks inside a URN cannot make
//! two different triples share a line. Lines are sorted bytewise, duplicates
//! removed and joined with `\n`, so the form depends only on the set of
//! triples and not on insertion order or on the graph name. Signature
//! triples are left out, so a warrant's own signature is never part of what
//! it signs.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use crate::consts::SIGNATURE;
use crate::quadstore::{Quad, QuadStore};
use crate::term::write_resource;

#[derive(Debug, Clone)]
pub struct GraphCanonicalizer {
    excluded: Vec<String>,
}

impl Default for GraphCanonicalizer {
    fn default() -> Self {
        Self {
            excluded: vec![SIGNATURE.to_string()],
        }
    }
}

impl GraphCanonicalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also leave out triples with `predicate`.
    pub fn exclude(mut self, predicate: impl Into<String>) -> Self {
        self.excluded.push(predicate.into());
        self
    }

    pub fn line(quad: &Quad) -> String {
        let mut line = String::new();
        // writing into a String cannot fail
        let _ = write_resource(&mut line, &quad.subject);
        line.push(' ');
        let _ = write_resource(&mut line, &quad.predicate);
        let _ = write!(line, " {}", quad.object);
        line
    }

    pub fn canonicalize<'a>(&self, quads: impl IntoIterator<Item = &'a Quad>) -> String {
        let lines: BTreeSet<String> = quads
            .into_iter()
            .filter(|q| !self.excluded.iter().any(|p| *p == q.predicate))
            .map(Self::line)
            .collect();
        lines.into_iter().collect::<Vec<_>>().join("\n")
    }

    /// Canonical form of the graph named `graph`.
    pub fn canonicalize_graph(&self, store: &QuadStore, graph: &str) -> String {
        self.canonicalize(store.graph(graph))
    }

    /// Lowercase hex SHA-256 of the canonical form.
    pub fn digest<'a>(&self, quads: impl IntoIterator<Item = &'a Quad>) -> String {
        hex::encode(Sha256::digest(self.canonicalize(quads).as_bytes()))
    }

    pub fn digest_graph(&self, store: &QuadStore, graph: &str) -> String {
        self.digest(store.graph(graph))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Object;

    #[test]
    fn order_and_duplicates_do_not_matter() {
        let a = vec![
            Quad::new("g", "s", "p", Object::literal("1")),
            Quad::new("g", "s", "q", Object::resource("o")),
        ];
        let b = vec![a[1].clone(), a[0].clone(), a[1].clone()];
        let c = GraphCanonicalizer::new();
        assert_eq!(c.canonicalize(&a), c.canonicalize(&b));
        assert_eq!(c.canonicalize(&a), "<s> <p> \"1\"\n<s> <q> <o>");
    }

    #[test]
    fn graph_name_is_not_part_of_the_form() {
        let c = GraphCanonicalizer::new();
        let a = [Quad::new("g1", "s", "p", Object::resource("o"))];
        let b = [Quad::new("g2", "s", "p", Object::resource("o"))];
        assert_eq!(c.digest(&a), c.digest(&b));
    }

    #[test]
    fn signature_triples_are_excluded() {
        let c = GraphCanonicalizer::new();
        let base = vec![Quad::new("g", "w", "p", Object::literal("x"))];
        let mut signed = base.clone();
        signed.push(Quad::new("g", "w", SIGNATURE, Object::literal("sig")));
        assert_eq!(c.digest(&base), c.digest(&signed));
    }

    #[test]
    fn literal_and_resource_differ() {
        let c = GraphCanonicalizer::new();
        let a = [Quad::new("g", "s", "p", Object::resource("o"))];
        let b = [Quad::new("g", "s", "p", Object::literal("o"))];
        assert_ne!(c.digest(&a), c.digest(&b));
    }

    #[test]
    fn whitespace_in_resources_cannot_shift_terms() {
        let c = GraphCanonicalizer::new();
        let a = [Quad::new("g", "s", "p q", Object::resource("o"))];
        let b = [Quad::new("g", "s p", "q", Object::resource("o"))];
        assert_ne!(c.digest(&a), c.digest(&b));

        let quoted = [Quad::new("g", "s", "p", Object::resource("\"x\""))];
        let literal = [Quad::new("g", "s", "p", Object::literal("x"))];
        assert_ne!(c.digest(&quoted), c.digest(&literal));

        let injected = [Quad::new("g", "s", "p", Object::resource("o>\n<s> <p> <x"))];
        assert_eq!(c.canonicalize(&injected).lines().count(), 1);
    }

    #[test]
    fn empty_graph_has_the_empty_digest() {
        let c = GraphCanonicalizer::new();
        assert_eq!(
            c.digest_graph(&QuadStore::new(), "nothing"),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
