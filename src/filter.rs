//! Filter and `FilterTable`: the immutable data model produced by the parser.
//!
//! A `Filter` is a scoring predicate over an object; a `FilterTable` is the
//! ordered collection of filters that make up one search, plus the index of
//! the designated `APPLICATION` filter whose score the caller ultimately
//! wants (spec §3).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Maximum length of a filter name (spec §4.1).
pub const MAX_NAME: usize = 256;
/// Maximum length of an entry-point function name.
pub const MAX_FUNC: usize = 128;
/// Maximum number of `REQUIRES` dependencies per filter.
pub const MAX_DEPS: usize = 64;

/// What a filter does to the object it receives, and the expected size of
/// the result (spec §3, `OUT_OBJECT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OutputKind {
    /// The object passes through unchanged.
    Unmodified,
    /// The filter produces a brand new object.
    New,
    /// The filter clones the input object.
    Clone,
    /// The filter copies only the attribute set, not the object body.
    CopyAttr,
}

/// A single filter's entry-point function names.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EntryPoints {
    pub init: Option<String>,
    pub eval: Option<String>,
    pub fini: Option<String>,
}

/// Index of a filter within a `FilterTable`.
pub type FilterId = usize;

/// Immutable filter record (spec §3). Built once by the parser and never
/// mutated afterward; the optimizer and execution driver only ever hold
/// `FilterId`s into the owning `FilterTable`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Filter {
    pub name: String,
    /// Object is dropped if its score is strictly less than this threshold.
    pub threshold: i32,
    /// User preference weight; secondary tie-break key in the optimizers.
    pub merit: i32,
    pub args: Vec<String>,
    pub requires: Vec<String>,
    pub in_object_size: Option<u64>,
    pub out_object: Option<(OutputKind, u64)>,
    pub entry_points: EntryPoints,
}

impl Filter {
    fn new(name: impl Into<String>) -> Self {
        Filter {
            name: name.into(),
            threshold: -1,
            merit: 0,
            args: Vec::new(),
            requires: Vec::new(),
            in_object_size: None,
            out_object: None,
            entry_points: EntryPoints::default(),
        }
    }

    /// Content signature used as the attribute-cache key: a hash of the
    /// filter's code identity (here, its name and eval entry point), its
    /// arguments, and its declared dependency names (spec §4.8). Two
    /// filters with identical name/args/deps/eval hash identically, which
    /// is what lets the cache survive a permutation reorder.
    pub fn signature(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.name.hash(&mut hasher);
        self.entry_points.eval.hash(&mut hasher);
        self.args.hash(&mut hasher);
        self.requires.hash(&mut hasher);
        hasher.finish()
    }
}

/// The terminal filter name recognized by the parser (spec §3).
pub const APPLICATION: &str = "APPLICATION";

/// Ordered collection of filters produced by the parser.
#[derive(Debug, Clone, Default)]
pub struct FilterTable {
    filters: Vec<Filter>,
}

impl FilterTable {
    pub fn new() -> Self {
        FilterTable { filters: Vec::new() }
    }

    pub(crate) fn push(&mut self, filter: Filter) -> FilterId {
        let id = self.filters.len();
        self.filters.push(filter);
        id
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn get(&self, id: FilterId) -> &Filter {
        &self.filters[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    pub fn id_of(&self, name: &str) -> Option<FilterId> {
        self.filters.iter().position(|f| f.name == name)
    }

    /// Index of the `APPLICATION` filter, if one was declared.
    pub fn application(&self) -> Option<FilterId> {
        self.id_of(APPLICATION)
    }

    pub(crate) fn new_filter_record(name: impl Into<String>) -> Filter {
        Filter::new(name)
    }
}
