//! Append-only, indexed store of (graph, subject, predicate, object) facts.
//!
//! Every quad gets a row number in insertion order. Four inverted indexes
//! map each term to the set of rows holding it in that position, so a
//! pattern query intersects at most four row sets and never scans the whole
//! store unless every position is a wildcard.
//!
//! Basic example
//!
//! ```no_run
//! use aff4::{Object, Quad, QuadStore};
//!
//! let mut store = QuadStore::new();
//! store.add(Quad::new("g", "aff4://s", "aff4://p", Object::literal("x")));
//! let hits = store.query(None, Some("aff4://s"), None, None);
//! assert_eq!(hits.len(), 1);
//! ```

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::errors::Aff4Error;
use crate::term::Object;
use crate::Result;

/// One fact, scoped to a named graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quad {
    pub graph: String,
    pub subject: String,
    pub predicate: String,
    pub object: Object,
}

impl Quad {
    pub fn new(
        graph: impl Into<String>,
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<Object>,
    ) -> Self {
        Self {
            graph: graph.into(),
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

type Rows = BTreeSet<usize>;

#[derive(Debug, Clone, Default)]
pub struct QuadStore {
    quads: Vec<Quad>,
    by_graph: HashMap<String, Rows>,
    by_subject: HashMap<String, Rows>,
    by_predicate: HashMap<String, Rows>,
    by_object: HashMap<Object, Rows>,
}

fn index<K: Hash + Eq>(map: &mut HashMap<K, Rows>, key: K, row: usize) {
    map.entry(key).or_default().insert(row);
}

/// Rows for one query position: `None` for a wildcard, `Some(None)` for a
/// concrete term the store has never seen.
fn lookup<'a, K, Q>(map: &'a HashMap<K, Rows>, key: Option<&Q>) -> Option<Option<&'a Rows>>
where
    K: std::borrow::Borrow<Q> + Hash + Eq,
    Q: Hash + Eq + ?Sized,
{
    key.map(|k| map.get(k))
}

impl QuadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a quad. Duplicates are kept; queries may return them more than once.
    pub fn add(&mut self, quad: Quad) {
        let row = self.quads.len();
        index(&mut self.by_graph, quad.graph.clone(), row);
        index(&mut self.by_subject, quad.subject.clone(), row);
        index(&mut self.by_predicate, quad.predicate.clone(), row);
        index(&mut self.by_object, quad.object.clone(), row);
        self.quads.push(quad);
    }

    /// Convenience form of [`QuadStore::add`].
    pub fn insert(
        &mut self,
        graph: &str,
        subject: &str,
        predicate: &str,
        object: impl Into<Object>,
    ) {
        self.add(Quad::new(graph, subject, predicate, object));
    }

    pub fn len(&self) -> usize {
        self.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    /// All quads in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Quad> {
        self.quads.iter()
    }

    /// Quads matching the pattern, in insertion order. `None` is a wildcard.
    pub fn query(
        &self,
        graph: Option<&str>,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&Object>,
    ) -> Vec<&Quad> {
        let positions = [
            lookup(&self.by_graph, graph),
            lookup(&self.by_subject, subject),
            lookup(&self.by_predicate, predicate),
            lookup(&self.by_object, object),
        ];
        let mut sets = Vec::with_capacity(4);
        for pos in positions.into_iter().flatten() {
            match pos {
                Some(rows) => sets.push(rows),
                // A concrete term that was never indexed matches nothing.
                None => return Vec::new(),
            }
        }
        if sets.is_empty() {
            return self.quads.iter().collect();
        }
        sets.sort_by_key(|rows| rows.len());
        let (smallest, rest) = sets.split_at(1);
        smallest[0]
            .iter()
            .filter(|row| rest.iter().all(|rows| rows.contains(*row)))
            .map(|&row| &self.quads[row])
            .collect()
    }

    /// Quads of one named graph.
    pub fn graph(&self, name: &str) -> Vec<&Quad> {
        self.query(Some(name), None, None, None)
    }

    /// Names of all graphs, sorted.
    pub fn graph_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_graph.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Distinct objects of `(subject, predicate)`, in first-seen order.
    pub fn objects(&self, graph: Option<&str>, subject: &str, predicate: &str) -> Vec<&Object> {
        let mut seen = Vec::new();
        for q in self.query(graph, Some(subject), Some(predicate), None) {
            if !seen.contains(&&q.object) {
                seen.push(&q.object);
            }
        }
        seen
    }

    /// Subjects having `predicate = object`, deduplicated and sorted.
    pub fn subjects(&self, graph: Option<&str>, predicate: &str, object: &Object) -> Vec<&str> {
        let subjects: BTreeSet<&str> = self
            .query(graph, None, Some(predicate), Some(object))
            .into_iter()
            .map(|q| q.subject.as_str())
            .collect();
        subjects.into_iter().collect()
    }

    /// The single value of `(subject, predicate)`, if any.
    ///
    /// Repeated identical facts count once; two different values are an
    /// [`Aff4Error::Ambiguous`] error.
    pub fn value(
        &self,
        graph: Option<&str>,
        subject: &str,
        predicate: &str,
    ) -> Result<Option<&Object>> {
        let objects = self.objects(graph, subject, predicate);
        match objects.len() {
            0 => Ok(None),
            1 => Ok(Some(objects[0])),
            count => Err(Aff4Error::Ambiguous {
                subject: subject.to_string(),
                predicate: predicate.to_string(),
                count,
            }),
        }
    }

    /// Like [`QuadStore::value`] but a missing fact is an error.
    pub fn require(&self, graph: Option<&str>, subject: &str, predicate: &str) -> Result<&Object> {
        self.value(graph, subject, predicate)?
            .ok_or_else(|| Aff4Error::MissingFact {
                subject: subject.to_string(),
                predicate: predicate.to_string(),
            })
    }

    /// Required resource-valued fact.
    pub fn require_resource(
        &self,
        graph: Option<&str>,
        subject: &str,
        predicate: &str,
    ) -> Result<&str> {
        self.require(graph, subject, predicate)?
            .as_resource()
            .ok_or_else(|| Aff4Error::invalid_fact(subject, predicate, "expected a resource"))
    }

    /// Required integer-valued literal.
    pub fn require_u64(&self, graph: Option<&str>, subject: &str, predicate: &str) -> Result<u64> {
        self.require(graph, subject, predicate)?
            .as_u64()
            .ok_or_else(|| {
                Aff4Error::invalid_fact(subject, predicate, "expected an unsigned integer literal")
            })
    }
}

impl Extend<Quad> for QuadStore {
    fn extend<T: IntoIterator<Item = Quad>>(&mut self, iter: T) {
        for q in iter {
            self.add(q);
        }
    }
}

impl FromIterator<Quad> for QuadStore {
    fn from_iter<T: IntoIterator<Item = Quad>>(iter: T) -> Self {
        let mut store = QuadStore::new();
        store.extend(iter);
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QuadStore {
        let mut s = QuadStore::new();
        s.insert("g1", "a", "p", Object::literal("1"));
        s.insert("g1", "a", "q", Object::resource("b"));
        s.insert("g2", "b", "p", Object::literal("1"));
        s.insert("g2", "a", "p", Object::literal("2"));
        s
    }

    #[test]
    fn absent_term_short_circuits() {
        let s = sample();
        assert!(s.query(Some("nope"), None, None, None).is_empty());
        assert!(s.query(None, None, None, Some(&Object::literal("9"))).is_empty());
    }

    #[test]
    fn wildcards_return_everything_in_order() {
        let s = sample();
        let all = s.query(None, None, None, None);
        assert_eq!(all.len(), 4);
        assert_eq!(all[2].subject, "b");
    }

    #[test]
    fn intersection() {
        let s = sample();
        let hits = s.query(None, Some("a"), Some("p"), None);
        assert_eq!(hits.len(), 2);
        let hits = s.query(Some("g2"), None, Some("p"), Some(&Object::literal("1")));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].subject, "b");
    }

    #[test]
    fn value_and_ambiguity() {
        let mut s = sample();
        assert_eq!(
            s.value(Some("g1"), "a", "p").unwrap(),
            Some(&Object::literal("1"))
        );
        assert!(matches!(
            s.value(None, "a", "p"),
            Err(Aff4Error::Ambiguous { count: 2, .. })
        ));
        // an identical duplicate is not ambiguous
        s.insert("g1", "a", "q", Object::resource("b"));
        assert_eq!(s.require_resource(None, "a", "q").unwrap(), "b");
        assert!(matches!(
            s.require(None, "a", "zzz"),
            Err(Aff4Error::MissingFact { .. })
        ));
    }

    #[test]
    fn graph_names_sorted() {
        assert_eq!(sample().graph_names(), vec!["g1", "g2"]);
    }
}
