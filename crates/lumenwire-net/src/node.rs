//! Output node tree
//!
//! An [`OutputNode`] gates frames (enabled flag, fps cap), transforms the
//! color buffer once (mode, gamma tier, brightness) and hands the result to
//! its own sink and then to each child. Children transform again with their
//! own settings.

use lumenwire_core::{
    color::Argb, FrameThrottle, FrameTransform, GammaTable, OutputConfig, OutputMode,
};
use once_cell::sync::Lazy;
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Instant;

use crate::packet::{Packet, SendOutcome};

static LINEAR_TABLE: Lazy<Arc<GammaTable>> = Lazy::new(|| Arc::new(GammaTable::default()));

/// Per-frame send counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl FrameStats {
    /// Count one outcome
    pub fn record(&mut self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Sent => self.sent += 1,
            SendOutcome::Skipped(_) => self.skipped += 1,
            SendOutcome::Failed => self.failed += 1,
        }
    }

    /// Attempts made, successful or not
    pub fn attempted(&self) -> usize {
        self.sent + self.failed
    }
}

impl AddAssign for FrameStats {
    fn add_assign(&mut self, other: Self) {
        self.sent += other.sent;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Something that puts a transformed frame on the wire
pub trait OutputSink: Send {
    /// Stamp and send one frame
    fn send_frame_at(&mut self, colors: &[Argb], gamma: &GammaTable, now: Instant) -> FrameStats;

    /// Packets owned by this sink, for status reporting
    fn packets(&self) -> &[Packet] {
        &[]
    }
}

/// One node of the output tree
pub struct OutputNode {
    name: String,
    enabled: bool,
    transform: FrameTransform,
    throttle: FrameThrottle,
    gamma_table: Arc<GammaTable>,
    sink: Option<Box<dyn OutputSink>>,
    children: Vec<OutputNode>,
    scratch: Vec<Argb>,
}

impl OutputNode {
    /// Enabled, normal mode, unthrottled, identity transform
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            transform: FrameTransform::default(),
            throttle: FrameThrottle::default(),
            gamma_table: LINEAR_TABLE.clone(),
            sink: None,
            children: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Node with node-level controls taken from `config`
    pub fn from_config(name: impl Into<String>, config: &OutputConfig) -> Self {
        let mut node = Self::new(name);
        node.enabled = config.enabled;
        node.transform = config.transform();
        node.throttle = FrameThrottle::new(config.fps);
        node
    }

    /// Attach the sink this node sends through
    pub fn with_sink(mut self, sink: impl OutputSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn with_child(mut self, child: OutputNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn mode(&self) -> OutputMode {
        self.transform.mode
    }

    pub fn set_mode(&mut self, mode: OutputMode) {
        self.transform.mode = mode;
    }

    pub fn fps(&self) -> u32 {
        self.throttle.fps()
    }

    /// Frame cap, 0 = unthrottled (capped at 300)
    pub fn set_fps(&mut self, fps: u32) {
        self.throttle.set_fps(fps);
    }

    pub fn gamma(&self) -> u32 {
        self.transform.gamma
    }

    pub fn set_gamma(&mut self, gamma: u32) {
        self.transform.gamma = gamma;
    }

    pub fn brightness(&self) -> f32 {
        self.transform.brightness
    }

    pub fn set_brightness(&mut self, brightness: f32) {
        self.transform.brightness = brightness.clamp(0.0, 1.0);
    }

    pub fn transform(&self) -> &FrameTransform {
        &self.transform
    }

    /// Lookup table packets of this node are stamped with
    pub fn gamma_table(&self) -> &Arc<GammaTable> {
        &self.gamma_table
    }

    pub fn set_gamma_table(&mut self, table: Arc<GammaTable>) {
        self.gamma_table = table;
    }

    pub fn last_frame(&self) -> Option<Instant> {
        self.throttle.last_frame()
    }

    pub fn sink(&self) -> Option<&dyn OutputSink> {
        self.sink.as_deref()
    }

    pub fn add_child(&mut self, child: OutputNode) {
        self.children.push(child);
    }

    pub fn children(&self) -> &[OutputNode] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [OutputNode] {
        &mut self.children
    }

    /// Every packet in this subtree, depth first
    pub fn packets(&self) -> Vec<&Packet> {
        let mut all: Vec<&Packet> = self
            .sink
            .as_ref()
            .map(|s| s.packets().iter().collect())
            .unwrap_or_default();
        for child in &self.children {
            all.extend(child.packets());
        }
        all
    }

    /// Send a frame now
    pub fn send(&mut self, colors: &[Argb]) -> Option<FrameStats> {
        self.send_at(colors, Instant::now())
    }

    /// Send a frame at `now`.
    ///
    /// Returns `None` when the node is disabled or the frame was throttled;
    /// dropped frames are never queued.
    pub fn send_at(&mut self, colors: &[Argb], now: Instant) -> Option<FrameStats> {
        if !self.enabled {
            return None;
        }
        if !self.throttle.admit(now) {
            tracing::trace!("{}: frame throttled", self.name);
            return None;
        }

        let frame = self.transform.apply(colors, &mut self.scratch);
        let mut stats = FrameStats::default();
        if let Some(sink) = self.sink.as_mut() {
            stats += sink.send_frame_at(frame, &self.gamma_table, now);
        }
        for child in &mut self.children {
            if let Some(child_stats) = child.send_at(frame, now) {
                stats += child_stats;
            }
        }
        Some(stats)
    }
}

impl std::fmt::Debug for OutputNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputNode")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("transform", &self.transform)
            .field("fps", &self.throttle.fps())
            .field("has_sink", &self.sink.is_some())
            .field("children", &self.children)
            .finish()
    }
}
