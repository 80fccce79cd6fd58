pub mod projection;

use serde::{Deserialize, Serialize};

use crate::error::ElabError;

/// Port direction, as written in the hardware yaml ("in" / "out").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

/// The closed set of port types a hardware block may declare. Buffer data
/// ports use `DATA` with the direction distinguishing datain from dataout.
/// `OTHER` marks ports the generator carries through without interpreting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortType {
    #[serde(rename = "CLK")]
    Clk,
    #[serde(rename = "RESET")]
    Reset,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "ADDRESS")]
    Address,
    #[serde(rename = "WEN")]
    Wen,
    #[serde(rename = "DATA")]
    Data,
    #[serde(rename = "W")]
    W,
    #[serde(rename = "I")]
    I,
    #[serde(rename = "O")]
    O,
    #[serde(rename = "W_EN")]
    WEn,
    #[serde(rename = "I_EN")]
    IEn,
    #[serde(rename = "ACC_EN")]
    AccEn,
    #[serde(rename = "MODE")]
    Mode,
    #[serde(rename = "AVALON_ADDRESS")]
    AvalonAddress,
    #[serde(rename = "AVALON_READDATA")]
    AvalonReadData,
    #[serde(rename = "AVALON_WRITEDATA")]
    AvalonWriteData,
    #[serde(rename = "AVALON_READ")]
    AvalonRead,
    #[serde(rename = "AVALON_WRITE")]
    AvalonWrite,
    #[serde(rename = "AVALON_WAITREQUEST")]
    AvalonWaitRequest,
    #[serde(rename = "AVALON_READDATAVALID")]
    AvalonReadDataValid,
    #[serde(rename = "OTHER")]
    Other,
}

impl PortType {
    /// Control-style input ports that are shared between all instances when
    /// a block is wrapped, rather than duplicated per instance.
    pub fn is_shared_control(self) -> bool {
        matches!(
            self,
            PortType::C
                | PortType::Address
                | PortType::Wen
                | PortType::WEn
                | PortType::IEn
                | PortType::AccEn
                | PortType::Mode
        )
    }
}

/// One port of a hardware block description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortSpec {
    pub name: String,
    pub width: u32,
    pub direction: Direction,
    #[serde(rename = "type")]
    pub ty: PortType,
}

/// Bit-widths per datatype at a block boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataWidths {
    #[serde(rename = "W")]
    pub w: u32,
    #[serde(rename = "I")]
    pub i: u32,
    #[serde(rename = "O")]
    pub o: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MacInfo {
    pub num_units: u64,
    pub data_widths: DataWidths,
}

/// The five access-pattern weights of an ML block. These double as the
/// native sweep capacities of the block along URW, URN, UE, UB, UG and are
/// consumed only by the mapping enumerator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessPatterns {
    #[serde(rename = "AP1")]
    pub ap1: u64,
    #[serde(rename = "AP2")]
    pub ap2: u64,
    #[serde(rename = "AP3")]
    pub ap3: u64,
    #[serde(rename = "AP4")]
    pub ap4: u64,
    #[serde(rename = "AP5")]
    pub ap5: u64,
}

/// Upper bounds on the unrolling factors the hardware supports natively.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PossibleProjections {
    #[serde(rename = "URW")]
    pub urw: u64,
    #[serde(rename = "URN")]
    pub urn: u64,
    #[serde(rename = "UB")]
    pub ub: u64,
    #[serde(rename = "UE")]
    pub ue: u64,
    #[serde(rename = "UG")]
    pub ug: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimModel {
    #[serde(rename = "MLB")]
    Mlb,
    Buffer,
    #[serde(rename = "EMIF")]
    Emif,
}

/// A hardware block description, loaded from yaml. The core only consumes
/// the port list and the derived datatype widths; behavioral models live
/// outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HwbSpec {
    pub block_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_model: Option<SimModel>,
    #[serde(rename = "MAC_info", default, skip_serializing_if = "Option::is_none")]
    pub mac_info: Option<MacInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_patterns: Option<AccessPatterns>,
    #[serde(default)]
    pub output_accumulator: bool,
    pub ports: Vec<PortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub possible_projections: Option<PossibleProjections>,
}

impl HwbSpec {
    /// All ports matching a type and (optionally) a direction, in
    /// declaration order.
    pub fn ports_of_type(
        &self,
        ty: PortType,
        dir: Option<Direction>,
    ) -> impl Iterator<Item = &PortSpec> {
        self.ports
            .iter()
            .filter(move |p| p.ty == ty && dir.map_or(true, |d| p.direction == d))
    }

    /// Summed width of all ports matching a type and direction.
    pub fn sum_port_width(&self, ty: PortType, dir: Direction) -> u32 {
        self.ports_of_type(ty, Some(dir)).map(|p| p.width).sum()
    }

    pub fn port(&self, name: &str) -> Option<&PortSpec> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn require_port_type(&self, ty: PortType, dir: Direction) -> Result<&PortSpec, ElabError> {
        self.ports_of_type(ty, Some(dir))
            .next()
            .ok_or_else(|| ElabError::PortTypeMissing {
                block: self.block_name.clone(),
                direction: match dir {
                    Direction::In => "in",
                    Direction::Out => "out",
                },
                port_type: port_type_name(ty),
            })
    }

    /// Width of the read side of a buffer-like block.
    pub fn data_out_width(&self) -> u32 {
        self.sum_port_width(PortType::Data, Direction::Out)
    }

    /// Width of the write side of a buffer-like block.
    pub fn data_in_width(&self) -> u32 {
        self.sum_port_width(PortType::Data, Direction::In)
    }
}

pub fn port_type_name(ty: PortType) -> &'static str {
    match ty {
        PortType::Clk => "CLK",
        PortType::Reset => "RESET",
        PortType::C => "C",
        PortType::Address => "ADDRESS",
        PortType::Wen => "WEN",
        PortType::Data => "DATA",
        PortType::W => "W",
        PortType::I => "I",
        PortType::O => "O",
        PortType::WEn => "W_EN",
        PortType::IEn => "I_EN",
        PortType::AccEn => "ACC_EN",
        PortType::Mode => "MODE",
        PortType::AvalonAddress => "AVALON_ADDRESS",
        PortType::AvalonReadData => "AVALON_READDATA",
        PortType::AvalonWriteData => "AVALON_WRITEDATA",
        PortType::AvalonRead => "AVALON_READ",
        PortType::AvalonWrite => "AVALON_WRITE",
        PortType::AvalonWaitRequest => "AVALON_WAITREQUEST",
        PortType::AvalonReadDataValid => "AVALON_READDATAVALID",
        PortType::Other => "OTHER",
    }
}
