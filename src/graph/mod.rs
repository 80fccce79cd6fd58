//! The produced module graph: a tree of named instances with typed ports
//! and a set of bit-range connections. Fabrics and wrappers build modules
//! through [`ModuleBuilder`] and hand back an immutable [`Module`]; every
//! index-arithmetic decision is recorded as an explicit bit slice so that
//! downstream emission never recomputes it.

pub mod eval;

use enum_dispatch::enum_dispatch;
use fxhash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::spec::{Direction, HwbSpec, PortType};
use crate::utils::calculation::clog2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Port {
    pub name: String,
    pub width: u32,
    pub dir: Direction,
    pub ty: PortType,
}

#[enum_dispatch]
pub trait HasPorts {
    fn ports(&self) -> &[Port];
    fn port(&self, name: &str) -> Option<&Port>;
    fn block_name(&self) -> &str;
}

/// Kinds of leaf blocks. Leaves carry only their interface; their behavior
/// is supplied by external simulation models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LeafKind {
    Mlb,
    Buffer,
    Emif,
    Activation,
    Mux,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leaf {
    pub kind: LeafKind,
    pub name: String,
    pub ports: Vec<Port>,
    /// Behavioral parameters of mux leaves: (input count, lane width,
    /// rotating output count). A 1-output mux selects; an N-output mux
    /// rotates its inputs by the select value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mux: Option<MuxShape>,
    #[serde(skip)]
    index: FxHashMap<String, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MuxShape {
    pub inputs: u64,
    pub width: u32,
    pub outputs: u64,
}

impl Leaf {
    pub fn new(kind: LeafKind, name: impl Into<String>, ports: Vec<Port>) -> Self {
        let name = name.into();
        let index = ports
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i))
            .collect();
        Leaf {
            kind,
            name,
            ports,
            mux: None,
            index,
        }
    }

    /// Leaf with the interface of a described hardware block. CLK and RESET
    /// ports are clocking concerns and are not modeled in the graph.
    pub fn from_spec(kind: LeafKind, spec: &HwbSpec) -> Self {
        let ports = spec
            .ports
            .iter()
            .filter(|p| !matches!(p.ty, PortType::Clk | PortType::Reset))
            .map(|p| Port {
                name: p.name.clone(),
                width: p.width,
                dir: p.direction,
                ty: p.ty,
            })
            .collect();
        Leaf::new(kind, spec.block_name.clone(), ports)
    }

    /// N-to-1 select mux: `input_0..input_{n-1}`, `sel`, `out`.
    pub fn mux_n_to_1(n: u64, width: u32) -> Self {
        let mut ports = Vec::new();
        for i in 0..n {
            ports.push(Port {
                name: format!("input_{}", i),
                width,
                dir: Direction::In,
                ty: PortType::Data,
            });
        }
        ports.push(Port {
            name: "sel".to_string(),
            width: clog2(n).max(1),
            dir: Direction::In,
            ty: PortType::C,
        });
        ports.push(Port {
            name: "out".to_string(),
            width,
            dir: Direction::Out,
            ty: PortType::Data,
        });
        let mut leaf = Leaf::new(LeafKind::Mux, format!("mux{}_1", n), ports);
        leaf.mux = Some(MuxShape {
            inputs: n,
            width,
            outputs: 1,
        });
        leaf
    }

    /// NxN barrel-rotate mux: `out_j = in_{(j + sel) mod n}`.
    pub fn mux_n_x_n(n: u64, width: u32) -> Self {
        let mut ports = Vec::new();
        for i in 0..n {
            ports.push(Port {
                name: format!("in_{}", i),
                width,
                dir: Direction::In,
                ty: PortType::Data,
            });
        }
        for i in 0..n {
            ports.push(Port {
                name: format!("out_{}", i),
                width,
                dir: Direction::Out,
                ty: PortType::Data,
            });
        }
        ports.push(Port {
            name: "sel".to_string(),
            width: clog2(n).max(1),
            dir: Direction::In,
            ty: PortType::C,
        });
        let mut leaf = Leaf::new(LeafKind::Mux, format!("mux{}x{}", n, n), ports);
        leaf.mux = Some(MuxShape {
            inputs: n,
            width,
            outputs: n,
        });
        leaf
    }
}

impl HasPorts for Leaf {
    fn ports(&self) -> &[Port] {
        &self.ports
    }
    fn port(&self, name: &str) -> Option<&Port> {
        self.index.get(name).map(|i| &self.ports[*i])
    }
    fn block_name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModuleKind {
    Interconnect,
    Wrapper,
    Datapath,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instance {
    pub name: String,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[enum_dispatch(HasPorts)]
pub enum Block {
    Leaf(Leaf),
    Module(Module),
}

/// A port endpoint: either a port of the module itself or a port of one of
/// its child instances.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PortRef {
    This(String),
    Child { inst: usize, port: String },
}

/// Half-open bit range `[lo, hi)` of a port.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BitRange {
    pub port: PortRef,
    pub lo: u32,
    pub hi: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Source {
    Bits(BitRange),
    Zero,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub src: Source,
    pub dst: BitRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Module {
    pub kind: ModuleKind,
    pub name: String,
    pub ports: Vec<Port>,
    pub instances: Vec<Instance>,
    pub edges: Vec<Edge>,
    #[serde(skip)]
    index: FxHashMap<String, usize>,
}

impl HasPorts for Module {
    fn ports(&self) -> &[Port] {
        &self.ports
    }
    fn port(&self, name: &str) -> Option<&Port> {
        self.index.get(name).map(|i| &self.ports[*i])
    }
    fn block_name(&self) -> &str {
        &self.name
    }
}

impl Module {
    pub fn instance(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    /// All ports named `<prefix>_<n>`, sorted by the integer suffix.
    pub fn ports_with_prefix(&self, prefix: &str) -> Vec<(u64, &Port)> {
        ports_with_prefix(&self.ports, prefix)
    }
}

/// Deterministic scan for numbered ports, sorted by (prefix, suffix).
pub fn ports_with_prefix<'a>(ports: &'a [Port], prefix: &str) -> Vec<(u64, &'a Port)> {
    let mut found: Vec<(u64, &Port)> = ports
        .iter()
        .filter_map(|p| {
            let rest = p.name.strip_prefix(prefix)?.strip_prefix('_')?;
            rest.parse::<u64>().ok().map(|n| (n, p))
        })
        .collect();
    found.sort_by_key(|(n, _)| *n);
    found
}

/// Builder accumulating ports, instances and connections; `finish` checks
/// structural integrity and returns the immutable module.
pub struct ModuleBuilder {
    kind: ModuleKind,
    name: String,
    ports: Vec<Port>,
    index: FxHashMap<String, usize>,
    instances: Vec<Instance>,
    edges: Vec<Edge>,
    connected_dsts: FxHashSet<(Option<usize>, String)>,
}

impl ModuleBuilder {
    pub fn new(kind: ModuleKind, name: impl Into<String>) -> Self {
        ModuleBuilder {
            kind,
            name: name.into(),
            ports: Vec::new(),
            index: FxHashMap::default(),
            instances: Vec::new(),
            edges: Vec::new(),
            connected_dsts: FxHashSet::default(),
        }
    }

    /// Get-or-create a module port. Widths of an existing port must match.
    pub fn add_port(&mut self, name: &str, width: u32, dir: Direction, ty: PortType) -> PortRef {
        if let Some(i) = self.index.get(name) {
            debug_assert_eq!(self.ports[*i].width, width, "port {} width mismatch", name);
            debug_assert_eq!(self.ports[*i].dir, dir, "port {} direction mismatch", name);
        } else {
            self.index.insert(name.to_string(), self.ports.len());
            self.ports.push(Port {
                name: name.to_string(),
                width,
                dir,
                ty,
            });
        }
        PortRef::This(name.to_string())
    }

    pub fn add_in_port(&mut self, name: &str, width: u32) -> PortRef {
        self.add_port(name, width, Direction::In, PortType::Data)
    }

    pub fn add_out_port(&mut self, name: &str, width: u32) -> PortRef {
        self.add_port(name, width, Direction::Out, PortType::Data)
    }

    /// Create `n` numbered input ports `<prefix>_<i>`.
    pub fn add_n_in_ports(&mut self, n: u64, width: u32, prefix: &str) {
        for i in 0..n {
            self.add_in_port(&format!("{}_{}", prefix, i), width);
        }
    }

    /// Create `n` numbered output ports `<prefix>_<i>`.
    pub fn add_n_out_ports(&mut self, n: u64, width: u32, prefix: &str) {
        for i in 0..n {
            self.add_out_port(&format!("{}_{}", prefix, i), width);
        }
    }

    pub fn has_port(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn add_instance(&mut self, name: impl Into<String>, block: Block) -> usize {
        self.instances.push(Instance {
            name: name.into(),
            block,
        });
        self.instances.len() - 1
    }

    pub fn instance_block(&self, inst: usize) -> &Block {
        &self.instances[inst].block
    }

    pub fn instance_name(&self, inst: usize) -> &str {
        &self.instances[inst].name
    }

    /// Width of a referenced port, or `None` when no such port exists.
    pub fn try_port_width(&self, r: &PortRef) -> Option<u32> {
        match r {
            PortRef::This(name) => self.index.get(name).map(|i| self.ports[*i].width),
            PortRef::Child { inst, port } => {
                self.instances.get(*inst)?.block.port(port).map(|p| p.width)
            }
        }
    }

    fn port_width(&self, r: &PortRef) -> u32 {
        self.try_port_width(r)
            .unwrap_or_else(|| panic!("unknown port {:?} in {}", r, self.name))
    }

    fn mark_connected(&mut self, dst: &BitRange) {
        let key = match &dst.port {
            PortRef::This(name) => (None, name.clone()),
            PortRef::Child { inst, port } => (Some(*inst), port.clone()),
        };
        self.connected_dsts.insert(key);
    }

    pub fn dst_connected(&self, inst: Option<usize>, port: &str) -> bool {
        self.connected_dsts.contains(&(inst, port.to_string()))
    }

    pub fn connect(&mut self, src: BitRange, dst: BitRange) {
        debug_assert_eq!(src.hi - src.lo, dst.hi - dst.lo, "slice width mismatch");
        self.mark_connected(&dst);
        self.edges.push(Edge {
            src: Source::Bits(src),
            dst,
        });
    }

    /// Connect two ports over their full (equal) width.
    pub fn connect_ports(&mut self, src: PortRef, dst: PortRef) {
        let w = self.port_width(&src);
        debug_assert_eq!(w, self.port_width(&dst), "full-width connect mismatch");
        self.connect(
            BitRange {
                port: src,
                lo: 0,
                hi: w,
            },
            BitRange {
                port: dst,
                lo: 0,
                hi: w,
            },
        );
    }

    pub fn tie_zero(&mut self, dst: BitRange) {
        self.mark_connected(&dst);
        self.edges.push(Edge {
            src: Source::Zero,
            dst,
        });
    }

    /// Promote every still-unconnected input of every child instance to a
    /// top-level port named `<instance>_<port>_top`.
    pub fn lift_unconnected_inputs(&mut self) {
        let mut lifts: Vec<(usize, String, u32, PortType)> = Vec::new();
        for (i, inst) in self.instances.iter().enumerate() {
            for p in inst.block.ports() {
                if p.dir == Direction::In && !self.dst_connected(Some(i), &p.name) {
                    lifts.push((i, p.name.clone(), p.width, p.ty));
                }
            }
        }
        for (i, port, width, ty) in lifts {
            let top = format!("{}_{}_top", self.instances[i].name, port);
            let src = self.add_port(&top, width, Direction::In, ty);
            self.connect_ports(
                src,
                PortRef::Child {
                    inst: i,
                    port,
                },
            );
        }
    }

    pub fn this(&self, name: &str, lo: u32, hi: u32) -> BitRange {
        BitRange {
            port: PortRef::This(name.to_string()),
            lo,
            hi,
        }
    }

    pub fn child(&self, inst: usize, port: &str, lo: u32, hi: u32) -> BitRange {
        BitRange {
            port: PortRef::Child {
                inst,
                port: port.to_string(),
            },
            lo,
            hi,
        }
    }

    pub fn finish(self) -> Module {
        for e in &self.edges {
            if let Source::Bits(src) = &e.src {
                check_range(&self, src);
            }
            check_range(&self, &e.dst);
        }
        Module {
            kind: self.kind,
            name: self.name,
            ports: self.ports,
            instances: self.instances,
            edges: self.edges,
            index: self.index,
        }
    }
}

fn check_range(b: &ModuleBuilder, r: &BitRange) {
    let width = b.port_width(&r.port);
    assert!(
        r.lo < r.hi && r.hi <= width,
        "bit range [{}, {}) out of bounds for {:?} (width {}) in {}",
        r.lo,
        r.hi,
        r.port,
        width,
        b.name
    );
}
