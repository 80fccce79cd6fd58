//! Combinational evaluation of a wiring module: propagate values along the
//! recorded bit-range edges (and through mux leaves) to compute output port
//! values from input port values. Leaf blocks other than muxes are opaque;
//! their outputs read as zero. Used by tests and the CLI to check wirings
//! without a behavioral simulator.

use fxhash::FxHashMap;

use crate::spec::Direction;

use super::{Block, HasPorts, LeafKind, Module, PortRef, Source};

fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

type Key = (Option<usize>, String);

fn read(values: &FxHashMap<Key, u128>, key: &Key) -> u128 {
    values.get(key).copied().unwrap_or(0)
}

/// Evaluate `module` with the given values on its input ports. Returns the
/// value of every output port of the module.
pub fn eval_module(module: &Module, inputs: &[(&str, u128)]) -> FxHashMap<String, u128> {
    let mut values: FxHashMap<Key, u128> = FxHashMap::default();
    for (name, v) in inputs {
        let width = module.port(name).map(|p| p.width).unwrap_or(128);
        values.insert((None, name.to_string()), v & mask(width));
    }

    // Edges and muxes settle within a few passes; chains in the produced
    // fabrics are at most buffer -> mux -> output.
    for _ in 0..8 {
        for e in &module.edges {
            let bits = match &e.src {
                Source::Zero => 0,
                Source::Bits(src) => {
                    let key = key_of(&src.port);
                    (read(&values, &key) >> src.lo) & mask(src.hi - src.lo)
                }
            };
            let dst_key = key_of(&e.dst.port);
            let old = read(&values, &dst_key);
            let cleared = old & !(mask(e.dst.hi - e.dst.lo) << e.dst.lo);
            values.insert(dst_key, cleared | (bits << e.dst.lo));
        }

        for (i, inst) in module.instances.iter().enumerate() {
            if let Block::Leaf(leaf) = &inst.block {
                if leaf.kind != LeafKind::Mux {
                    continue;
                }
                let Some(shape) = leaf.mux else { continue };
                let sel = read(&values, &(Some(i), "sel".to_string()));
                if shape.outputs == 1 {
                    let chosen = (sel as u64).min(shape.inputs - 1);
                    let v = read(&values, &(Some(i), format!("input_{}", chosen)));
                    values.insert((Some(i), "out".to_string()), v);
                } else {
                    for j in 0..shape.outputs {
                        let src = (j + sel as u64) % shape.inputs;
                        let v = read(&values, &(Some(i), format!("in_{}", src)));
                        values.insert((Some(i), format!("out_{}", j)), v);
                    }
                }
            }
        }
    }

    module
        .ports
        .iter()
        .filter(|p| p.dir == Direction::Out)
        .map(|p| {
            let v = read(&values, &(None, p.name.clone()));
            (p.name.clone(), v & mask(p.width))
        })
        .collect()
}

fn key_of(r: &PortRef) -> Key {
    match r {
        PortRef::This(name) => (None, name.clone()),
        PortRef::Child { inst, port } => (Some(*inst), port.clone()),
    }
}
