//! Old-to-new port and region mappings used when copying regions.

use std::collections::HashMap;

use crate::graph::{InputRef, Origin, OutputRef, RegionId};

/// Maps ports and regions of a copied subgraph to their copies.
///
/// Callers seed it with the values that operands outside the copied set
/// should read (for example the enclosing node's operands when inlining a
/// branch) and read back the copies of anything they still need afterwards.
#[derive(Debug, Default, Clone)]
pub struct SubstitutionMap {
    origins: HashMap<Origin, Origin>,
    regions: HashMap<RegionId, RegionId>,
    inputs: HashMap<InputRef, InputRef>,
    outputs: HashMap<OutputRef, OutputRef>,
}

impl SubstitutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_origin(&mut self, from: Origin, to: Origin) {
        self.origins.insert(from, to);
    }

    pub fn origin(&self, origin: Origin) -> Option<Origin> {
        self.origins.get(&origin).copied()
    }

    pub fn insert_region(&mut self, from: RegionId, to: RegionId) {
        self.regions.insert(from, to);
    }

    pub fn region(&self, region: RegionId) -> Option<RegionId> {
        self.regions.get(&region).copied()
    }

    pub fn insert_input(&mut self, from: InputRef, to: InputRef) {
        self.inputs.insert(from, to);
    }

    pub fn input(&self, input: InputRef) -> Option<InputRef> {
        self.inputs.get(&input).copied()
    }

    pub fn insert_output(&mut self, from: OutputRef, to: OutputRef) {
        self.outputs.insert(from, to);
    }

    pub fn output(&self, output: OutputRef) -> Option<OutputRef> {
        self.outputs.get(&output).copied()
    }
}
