//! Gamma reductions.

use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId, Origin, OutputRef, RegionId};
use crate::normal_form::Flag;
use crate::operation::{OpKind, Operation};
use crate::substitution::SubstitutionMap;

pub(crate) fn normalize_node(graph: &mut Graph, node: NodeId) -> Result<bool> {
    if graph.flag(OpKind::Gamma, Flag::PredicateReduction) {
        if let Some(alternative) = constant_predicate(graph, node) {
            inline_alternative(graph, node, alternative)?;
            return Ok(true);
        }
    }
    if graph.flag(OpKind::Gamma, Flag::InvariantReduction) {
        return bypass_invariants(graph, node);
    }
    Ok(false)
}

fn constant_predicate(graph: &Graph, node: NodeId) -> Option<usize> {
    let predicate = graph.node(node).inputs().first()?.origin();
    let producer = graph.node(predicate.node()?);
    match producer.operation() {
        Operation::ControlConstant { value, .. } => Some(*value as usize),
        _ => None,
    }
}

/// The result of `region` feeding `output`.
fn bound_result(graph: &Graph, region: RegionId, output: OutputRef) -> Option<Origin> {
    graph.node(output.node).output(output.index)
        .results()
        .iter()
        .find(|r| r.region == region)
        .map(|r| graph.region(region).result(r.index).origin())
}

/// Copy the selected alternative into the gamma's region and route the
/// gamma's users to the copies.
fn inline_alternative(graph: &mut Graph, node: NodeId, alternative: usize) -> Result<()> {
    let n = graph.node(node);
    let region = n.region();
    let sub = *n.subregions().get(alternative).ok_or_else(|| {
        Error::Malformed(format!("{node:?} has no alternative {alternative}"))
    })?;

    let mut smap = SubstitutionMap::new();
    for (index, argument) in graph.region(sub).arguments().iter().enumerate() {
        if let Some(input) = argument.input() {
            smap.insert_origin(
                Origin::argument(sub, index),
                graph.node(node).input(input.index).origin(),
            );
        }
    }
    graph.copy_region(sub, region, &mut smap, false, false)?;

    let mut replacements = Vec::new();
    for index in 0..graph.node(node).noutputs() {
        let output = OutputRef { node, index };
        let inner = bound_result(graph, sub, output).ok_or_else(|| {
            Error::Malformed(format!("{output:?} has no result in alternative {alternative}"))
        })?;
        let outer = smap
            .origin(inner)
            .ok_or_else(|| Error::Malformed(format!("{inner:?} was not copied")))?;
        replacements.push(outer);
    }
    tracing::trace!(?node, alternative, "inlined constant-predicate gamma");
    graph.replace_node(node, &replacements)
}

/// Route users of exit variables that forward the same entry variable in
/// every alternative straight to that entry variable's origin.
fn bypass_invariants(graph: &mut Graph, node: NodeId) -> Result<bool> {
    let subregions = graph.node(node).subregions().to_vec();
    let mut changed = false;
    for index in 0..graph.node(node).noutputs() {
        let output = OutputRef { node, index };
        if graph.users(Origin::Output(output)).is_empty() {
            continue;
        }
        let mut forwarded = None;
        let mut invariant = true;
        for &sub in &subregions {
            let input = match bound_result(graph, sub, output) {
                Some(Origin::Argument(argument)) => graph.region(sub).argument(argument.index).input(),
                _ => None,
            };
            match (input, forwarded) {
                (Some(input), None) => forwarded = Some(input),
                (Some(input), Some(previous)) if input == previous => {}
                _ => {
                    invariant = false;
                    break;
                }
            }
        }
        let Some(input) = forwarded.filter(|_| invariant) else {
            continue;
        };
        let origin = graph.node(node).input(input.index).origin();
        graph.divert_users(Origin::Output(output), origin)?;
        changed = true;
    }
    Ok(changed)
}
