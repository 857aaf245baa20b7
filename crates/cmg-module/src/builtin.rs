//! Built-in modules.
//!
//! A small set of modules that exercise every capability of the engine:
//!
//! | registration | capability | context type |
//! |--------------|------------|--------------|
//! | `//color/source/buffer` | renderer | - |
//! | `//color/curve/lut` | context + renderer | `cLUT` / `cL16` |
//! | `//color/curve/basic` | context | `cLUT` |
//! | `//color/curve/fallback` | fallback | - |
//! | `//color/convert/quantize` | converter `cLUT` -> `cL16` | `cL16` |
//! | `//color/sink/display` | renderer | - |
//!
//! The curve renderer consumes `cL16` while the curve context producers emit
//! `cLUT`, so resolving a curve node always goes through the converter.

use cmg_core::{ApiKind, Batch, Blob, ContextType, Error, Result, RunStatus, Ticket};

use crate::api::{ContextConverter, ContextProducer, FallbackProvider, NodeView, Renderer, Runtime};
use crate::descriptor::Descriptor;
use crate::registry::Registry;

/// Connector type used by every built-in connector.
pub const DATA_CONNECTOR: &str = "//color/data";

/// Float curve table context type.
pub const CURVE_TABLE: &str = "cLUT";

/// Quantized 16-bit curve table context type.
pub const CURVE_TABLE_16: &str = "cL16";

const DEFAULT_SIZE: usize = 256;
const MAX_SIZE: usize = 65536;

/// Registers every built-in module.
pub fn register_all(registry: &Registry) -> Result<()> {
    registry.register_renderer(SourceRenderer::new()?)?;
    registry.register_context(CurveContext::new()?)?;
    registry.register_renderer(CurveRenderer::new()?)?;
    registry.register_context(BasicCurveContext::new()?)?;
    registry.register_fallback(CurveFallback::new()?)?;
    registry.register_converter(CurveQuantizer::new()?)?;
    registry.register_renderer(SinkRenderer::new()?)?;
    Ok(())
}

/// Emits the data stored on its socket, windowed by the ticket range.
pub struct SourceRenderer {
    desc: Descriptor,
}

impl SourceRenderer {
    /// Creates the module.
    pub fn new() -> Result<Self> {
        Ok(Self {
            desc: Descriptor::new("//color/source/buffer")?
                .named("Buffer source")
                .with_socket("out", DATA_CONNECTOR),
        })
    }
}

impl Renderer for SourceRenderer {
    fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    fn run(&self, rt: &mut dyn Runtime, ticket: &mut Ticket) -> Result<RunStatus> {
        let Some(data) = rt.socket_data() else {
            return Ok(RunStatus::Empty);
        };
        let len = ticket.length().unwrap_or(data.pixels());
        let window = data.window(ticket.position(), len);
        if window.pixels() == 0 {
            return Ok(RunStatus::Empty);
        }
        ticket.set_output(window);
        Ok(RunStatus::Done)
    }
}

/// Builds a power curve table from the `gamma` and `size` options.
pub struct CurveContext {
    desc: Descriptor,
}

impl CurveContext {
    /// Creates the module.
    pub fn new() -> Result<Self> {
        Ok(Self {
            desc: Descriptor::new("//color/curve/lut")?
                .named("Tone curve")
                .with_context_type(CURVE_TABLE)?,
        })
    }
}

impl ContextProducer for CurveContext {
    fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    fn produce_context(&self, node: &NodeView<'_>) -> Result<Vec<u8>> {
        let gamma = node.options.get_f64("gamma").unwrap_or(1.0);
        if !gamma.is_finite() || gamma <= 0.0 {
            return Err(Error::generation(
                node.registration.as_str(),
                format!("gamma {gamma} is not a positive number"),
            ));
        }
        let size = table_size(node)?;
        Ok(encode_curve(size, |x| x.powf(gamma)))
    }
}

/// Identity curve, used when the regular curve cannot be built.
pub struct BasicCurveContext {
    desc: Descriptor,
}

impl BasicCurveContext {
    /// Creates the module.
    pub fn new() -> Result<Self> {
        Ok(Self {
            desc: Descriptor::new("//color/curve/basic")?
                .named("Identity curve")
                .with_context_type(CURVE_TABLE)?,
        })
    }
}

impl ContextProducer for BasicCurveContext {
    fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    fn produce_context(&self, node: &NodeView<'_>) -> Result<Vec<u8>> {
        Ok(encode_curve(table_size(node)?, |x| x))
    }

    // gamma is ignored, so it must not split the cache
    fn hash_text(&self, node: &NodeView<'_>) -> Option<String> {
        Some(format!("size={}", table_size(node).unwrap_or(DEFAULT_SIZE)))
    }
}

/// Points failing curve nodes at the identity curve.
pub struct CurveFallback {
    desc: Descriptor,
}

impl CurveFallback {
    /// Creates the module.
    pub fn new() -> Result<Self> {
        Ok(Self {
            desc: Descriptor::new("//color/curve")?.named("Curve fallback"),
        })
    }
}

impl FallbackProvider for CurveFallback {
    fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    fn fallback(&self, node: &NodeView<'_>, kind: ApiKind) -> Option<String> {
        let already_basic = node.registration.as_str() == "//color/curve/basic";
        (kind == ApiKind::Context && !already_basic).then(|| "//color/curve/basic".to_string())
    }
}

/// Quantizes a float curve table to 16 bits.
pub struct CurveQuantizer {
    desc: Descriptor,
    source: ContextType,
}

impl CurveQuantizer {
    /// Creates the module.
    pub fn new() -> Result<Self> {
        Ok(Self {
            desc: Descriptor::new("//color/convert/quantize")?
                .named("Curve quantizer")
                .with_context_type(CURVE_TABLE_16)?,
            source: ContextType::new(CURVE_TABLE)?,
        })
    }
}

impl ContextConverter for CurveQuantizer {
    fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    fn source_type(&self) -> &ContextType {
        &self.source
    }

    fn convert(&self, input: &Blob, node: &NodeView<'_>) -> Result<Vec<u8>> {
        if input.context_type() != &self.source {
            return Err(Error::generation(
                node.registration.as_str(),
                format!("cannot quantize '{}' context", input.context_type()),
            ));
        }
        let table = decode_f32(input.as_bytes());
        let mut out = Vec::with_capacity(table.len() * 2);
        for v in table {
            let q = (v.clamp(0.0, 1.0) * 65535.0).round() as u16;
            out.extend_from_slice(&q.to_le_bytes());
        }
        Ok(out)
    }
}

/// Applies the node's 16-bit curve to its input.
pub struct CurveRenderer {
    desc: Descriptor,
}

impl CurveRenderer {
    /// Creates the module.
    pub fn new() -> Result<Self> {
        Ok(Self {
            desc: Descriptor::new("//color/curve/lut")?
                .named("Tone curve renderer")
                .with_context_type(CURVE_TABLE_16)?
                .with_plug("in", DATA_CONNECTOR)
                .with_socket("out", DATA_CONNECTOR),
        })
    }
}

impl Renderer for CurveRenderer {
    fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    fn run(&self, rt: &mut dyn Runtime, ticket: &mut Ticket) -> Result<RunStatus> {
        if rt.pull_input(0, ticket)? == RunStatus::Empty {
            return Ok(RunStatus::Empty);
        }
        let Some(mut batch) = ticket.take_output() else {
            return Ok(RunStatus::Empty);
        };

        let context = rt.resolve_context()?;
        let table = decode_u16(context.as_bytes());
        if table.len() < 2 {
            let node = rt.node();
            return Err(Error::run(node.registration.as_str(), "curve table is too short"));
        }
        apply_curve(&table, &mut batch);
        ticket.set_output(batch);
        Ok(RunStatus::Done)
    }
}

/// Passes its input through unchanged.
pub struct SinkRenderer {
    desc: Descriptor,
}

impl SinkRenderer {
    /// Creates the module.
    pub fn new() -> Result<Self> {
        Ok(Self {
            desc: Descriptor::new("//color/sink/display")?
                .named("Display sink")
                .with_plug("in", DATA_CONNECTOR)
                .with_socket("out", DATA_CONNECTOR),
        })
    }
}

impl Renderer for SinkRenderer {
    fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    fn run(&self, rt: &mut dyn Runtime, ticket: &mut Ticket) -> Result<RunStatus> {
        rt.pull_input(0, ticket)
    }
}

fn table_size(node: &NodeView<'_>) -> Result<usize> {
    let Some(size) = node.options.get_f64("size") else {
        return Ok(DEFAULT_SIZE);
    };
    if size < 2.0 || size > MAX_SIZE as f64 || size.fract() != 0.0 {
        return Err(Error::generation(
            node.registration.as_str(),
            format!("table size {size} is outside 2..={MAX_SIZE}"),
        ));
    }
    Ok(size as usize)
}

fn encode_curve(size: usize, f: impl Fn(f64) -> f64) -> Vec<u8> {
    let last = (size - 1) as f64;
    let mut out = Vec::with_capacity(size * 4);
    for i in 0..size {
        let v = f(i as f64 / last) as f32;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn decode_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn decode_u16(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect()
}

fn apply_curve(table: &[u16], batch: &mut Batch) {
    let last = (table.len() - 1) as f32;
    for s in batch.samples_mut() {
        let x = s.clamp(0.0, 1.0) * last;
        let i = (x.floor() as usize).min(table.len() - 2);
        let t = x - i as f32;
        let a = f32::from(table[i]) / 65535.0;
        let b = f32::from(table[i + 1]) / 65535.0;
        *s = a + (b - a) * t;
    }
}
