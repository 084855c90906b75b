//! Depth-source heuristic.
//!
//! The host renders its scene into framebuffers the runtime knows nothing
//! about. To hand effects a usable depth buffer, every depth attachment the
//! host binds is recorded together with how much geometry was drawn into
//! it, and once per cooldown window the busiest candidate whose size matches
//! the presentation surface becomes the depth source.
//!
//! [`DepthSourceTracker`] only keeps the bookkeeping and makes decisions;
//! [`apply_depth_update`] turns a decision into device calls.

use std::collections::BTreeMap;

use crate::config::DepthHeuristicConfig;

use super::device::{
    AttachmentInfo, AttachmentKey, DepthAttachment, DeviceFormat, FramebufferDesc, GraphicsDevice,
};
use super::resources::SurfaceResources;

/// Identity of a depth source. `Default` is the depth buffer of the host's
/// presentation surface and sorts before every attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DepthSourceKey {
    Default,
    Attachment(AttachmentKey),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthSourceInfo {
    pub width: u32,
    pub height: u32,
    pub level: u32,
    pub format: DeviceFormat,
    /// Draw calls observed since the last selection.
    pub draw_calls: u32,
    /// Vertices drawn since the last selection.
    pub vertices: u64,
}

impl DepthSourceInfo {
    pub fn new(info: AttachmentInfo) -> Self {
        Self {
            width: info.width,
            height: info.height,
            level: info.level,
            format: info.format,
            draw_calls: 0,
            vertices: 0,
        }
    }

    pub fn attachment_info(&self) -> AttachmentInfo {
        AttachmentInfo {
            width: self.width,
            height: self.height,
            level: self.level,
            format: self.format,
        }
    }

    fn same_storage(&self, other: &DepthSourceInfo) -> bool {
        self.width == other.width && self.height == other.height && self.format == other.format
    }
}

/// Outcome of one [`DepthSourceTracker::update`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DepthUpdate {
    /// Inside the cooldown window; nothing was scored.
    Cooldown,
    /// Too much activity during the last window. The selection went back to
    /// the default source and the shared depth texture should be dropped.
    ForceReset,
    /// The current source stays.
    Keep,
    /// A new source was selected.
    Switch {
        to: DepthSourceKey,
        info: DepthSourceInfo,
        /// The shared depth texture must be reallocated to `info`.
        reallocate: bool,
    },
}

#[derive(Clone, Debug)]
pub struct DepthSourceTracker {
    config: DepthHeuristicConfig,
    sources: BTreeMap<DepthSourceKey, DepthSourceInfo>,
    current: DepthSourceKey,
    cooldown: u32,
    traffic: u32,
    activity: bool,
    /// Host draw calls summed over the current window.
    window_draw_calls: u64,
}

impl DepthSourceTracker {
    pub fn new(config: DepthHeuristicConfig) -> Self {
        Self {
            config,
            sources: BTreeMap::new(),
            current: DepthSourceKey::Default,
            cooldown: 0,
            traffic: 0,
            activity: false,
            window_draw_calls: 0,
        }
    }

    /// Installs (or replaces) the entry for the presentation surface's own
    /// depth buffer.
    pub fn set_default(&mut self, width: u32, height: u32, format: DeviceFormat) {
        self.sources.insert(
            DepthSourceKey::Default,
            DepthSourceInfo::new(AttachmentInfo {
                width,
                height,
                level: 0,
                format,
            }),
        );
    }

    /// Records a newly seen attachment. Returns false for keys that are
    /// already known, which are left untouched.
    pub fn register(&mut self, key: AttachmentKey, info: AttachmentInfo) -> bool {
        let key = DepthSourceKey::Attachment(key);
        if self.sources.contains_key(&key) {
            return false;
        }
        log::trace!(
            "new depth source candidate {key:?}: {}x{} {:?}",
            info.width,
            info.height,
            info.format
        );
        self.sources.insert(key, DepthSourceInfo::new(info));
        true
    }

    pub fn is_known(&self, key: AttachmentKey) -> bool {
        self.sources.contains_key(&DepthSourceKey::Attachment(key))
    }

    /// Counts one draw call against `key`. Unknown keys are ignored.
    pub fn observe_draw(&mut self, key: DepthSourceKey, vertices: u32) {
        if let Some(entry) = self.sources.get_mut(&key) {
            entry.draw_calls += 1;
            entry.vertices += u64::from(vertices);
        }
    }

    /// Feeds the activity signal. Any non-zero amount marks the current
    /// frame as active.
    pub fn note_activity(&mut self, bytes: usize) {
        if bytes > 0 {
            self.activity = true;
        }
    }

    pub fn current(&self) -> DepthSourceKey {
        self.current
    }

    pub fn source(&self, key: DepthSourceKey) -> Option<&DepthSourceInfo> {
        self.sources.get(&key)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Returns the selection to the default source. Candidates are kept.
    pub fn reset_selection(&mut self) {
        self.current = DepthSourceKey::Default;
        self.cooldown = 0;
        self.traffic = 0;
        self.activity = false;
        self.clear_counters();
    }

    /// Runs once per presented frame.
    ///
    /// `surface` is the presentation surface size, `total_draw_calls` the
    /// frame's draw call count and `has_depth_texture` whether the shared
    /// depth texture currently exists. Candidate counters and the draw call
    /// total both cover the whole window, so the draw call share stays in
    /// `[0, 1]`.
    pub fn update(
        &mut self,
        surface: (u32, u32),
        total_draw_calls: u32,
        has_depth_texture: bool,
    ) -> DepthUpdate {
        let active = std::mem::take(&mut self.activity);
        self.window_draw_calls += u64::from(total_draw_calls);

        if self.cooldown > 0 {
            self.cooldown -= 1;
            if active {
                self.traffic += 1;
            }
            return DepthUpdate::Cooldown;
        }

        self.cooldown = self.config.cooldown_frames;
        let traffic = std::mem::take(&mut self.traffic);
        if traffic > self.config.traffic_threshold {
            self.current = DepthSourceKey::Default;
            self.clear_counters();
            return DepthUpdate::ForceReset;
        }

        let chosen = self
            .score_candidates(surface)
            .unwrap_or(DepthSourceKey::Default);
        let Some(info) = self.sources.get(&chosen).copied() else {
            return DepthUpdate::Keep;
        };

        if chosen == self.current && has_depth_texture {
            return DepthUpdate::Keep;
        }

        let reallocate = !has_depth_texture
            || self
                .sources
                .get(&self.current)
                .is_none_or(|previous| !previous.same_storage(&info));
        self.current = chosen;
        DepthUpdate::Switch {
            to: chosen,
            info,
            reallocate,
        }
    }

    /// Picks the highest scoring candidate matching the surface size and
    /// clears every counter. On equal scores the first entry in key order
    /// stays selected.
    fn score_candidates(&mut self, (width, height): (u32, u32)) -> Option<DepthSourceKey> {
        let total = std::mem::take(&mut self.window_draw_calls).max(1) as f32;
        let weight = self.config.draw_call_weight;
        let tolerance = self.config.size_tolerance;
        let mut best: Option<(DepthSourceKey, f32)> = None;

        for (&key, entry) in self.sources.iter_mut() {
            let (draw_calls, vertices) = (entry.draw_calls, entry.vertices);
            entry.draw_calls = 0;
            entry.vertices = 0;
            if draw_calls == 0 {
                continue;
            }
            let score = vertices as f32 * (weight - draw_calls as f32 / total);
            let fits = within(entry.width, width, tolerance) && within(entry.height, height, tolerance);
            if fits && best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((key, score));
            }
        }

        best.map(|(key, _)| key)
    }

    fn clear_counters(&mut self) {
        self.window_draw_calls = 0;
        for entry in self.sources.values_mut() {
            entry.draw_calls = 0;
            entry.vertices = 0;
        }
    }
}

/// Strictly inside `(reference * (1 - tolerance), reference * (1 + tolerance))`.
fn within(value: u32, reference: u32, tolerance: f32) -> bool {
    let value = value as f32;
    let reference = reference as f32;
    value > reference * (1.0 - tolerance) && value < reference * (1.0 + tolerance)
}

// ── Applying decisions ───────────────────────────────────────────────────

/// Carries out `update` on the shared surfaces.
pub fn apply_depth_update(
    surface: &mut SurfaceResources,
    device: &mut dyn GraphicsDevice,
    update: &DepthUpdate,
) {
    match *update {
        DepthUpdate::Cooldown | DepthUpdate::Keep => {}
        DepthUpdate::ForceReset => {
            log::debug!("activity spike, depth source reset to default framebuffer");
            surface.recreate_depth_texture(device, None);
            drop_depth_source_framebuffer(surface, device);
        }
        DepthUpdate::Switch {
            to,
            info,
            reallocate,
        } => {
            if reallocate || surface.depth_texture.is_none() {
                surface.recreate_depth_texture(device, Some(&info.attachment_info()));
            }

            drop_depth_source_framebuffer(surface, device);
            let DepthSourceKey::Attachment(key) = to else {
                log::debug!("switched depth source to default framebuffer");
                return;
            };

            log::debug!(
                "switched depth source to {:?} {} ({}x{})",
                key.kind,
                key.id,
                info.width,
                info.height
            );
            let desc = FramebufferDesc {
                color: Vec::new(),
                depth_stencil: Some(DepthAttachment::Host(key, info.level)),
            };
            match device.create_framebuffer(&desc) {
                Ok(fb) => surface.depth_source_framebuffer = Some(fb),
                Err(e) => log::debug!("failed to create depth source framebuffer: {e:#}"),
            }
        }
    }
}

fn drop_depth_source_framebuffer(surface: &mut SurfaceResources, device: &mut dyn GraphicsDevice) {
    if let Some(fb) = surface.depth_source_framebuffer.take() {
        device.delete_framebuffer(fb);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn info(width: u32, height: u32) -> AttachmentInfo {
        AttachmentInfo {
            width,
            height,
            level: 0,
            format: DeviceFormat::Depth24Stencil8,
        }
    }

    fn tracker() -> DepthSourceTracker {
        let mut tracker = DepthSourceTracker::new(DepthHeuristicConfig::default());
        tracker.set_default(1920, 1080, DeviceFormat::Depth24Stencil8);
        tracker
    }

    #[test]
    fn test_first_update_selects_busiest_matching_candidate() {
        let mut tracker = tracker();
        let small = AttachmentKey::texture(5);
        let full = AttachmentKey::renderbuffer(9);
        tracker.register(small, info(512, 512));
        tracker.register(full, info(1920, 1080));

        for _ in 0..10 {
            tracker.observe_draw(DepthSourceKey::Attachment(small), 10_000);
        }
        for _ in 0..5 {
            tracker.observe_draw(DepthSourceKey::Attachment(full), 300);
        }

        match tracker.update((1920, 1080), 15, true) {
            DepthUpdate::Switch { to, reallocate, .. } => {
                assert_eq!(to, DepthSourceKey::Attachment(full));
                assert!(!reallocate);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(tracker.current(), DepthSourceKey::Attachment(full));
        assert_eq!(tracker.source(DepthSourceKey::Attachment(full)).map(|s| s.draw_calls), Some(0));
    }

    #[test]
    fn test_busiest_candidate_survives_later_windows() {
        let mut tracker = tracker();
        let scene = AttachmentKey::texture(1);
        let hud = AttachmentKey::texture(2);
        tracker.register(scene, info(1920, 1080));
        tracker.register(hud, info(1920, 1080));

        for frame in 0..64 {
            for _ in 0..100 {
                tracker.observe_draw(DepthSourceKey::Attachment(scene), 1000);
            }
            for _ in 0..2 {
                tracker.observe_draw(DepthSourceKey::Attachment(hud), 6);
            }
            tracker.update((1920, 1080), 102, true);
            assert_eq!(
                tracker.current(),
                DepthSourceKey::Attachment(scene),
                "frame {frame}"
            );
        }
    }

    #[test]
    fn test_force_reset_discards_window_counts() {
        let mut tracker = tracker();
        let key = AttachmentKey::texture(4);
        tracker.register(key, info(1920, 1080));
        tracker.update((1920, 1080), 0, true);
        for _ in 0..30 {
            tracker.observe_draw(DepthSourceKey::Attachment(key), 500);
            tracker.note_activity(64);
            tracker.update((1920, 1080), 1, true);
        }
        assert_eq!(tracker.update((1920, 1080), 1, true), DepthUpdate::ForceReset);
        assert_eq!(tracker.source(DepthSourceKey::Attachment(key)).map(|s| s.draw_calls), Some(0));
        assert_eq!(tracker.source(DepthSourceKey::Attachment(key)).map(|s| s.vertices), Some(0));
    }

    #[test]
    fn test_cooldown_skips_scoring() {
        let mut tracker = tracker();
        assert_eq!(tracker.update((1920, 1080), 1, true), DepthUpdate::Keep);
        for _ in 0..30 {
            assert_eq!(tracker.update((1920, 1080), 1, true), DepthUpdate::Cooldown);
        }
        assert_eq!(tracker.update((1920, 1080), 1, true), DepthUpdate::Keep);
    }

    #[test]
    fn test_missing_depth_texture_forces_switch() {
        let mut tracker = tracker();
        match tracker.update((1920, 1080), 1, false) {
            DepthUpdate::Switch { to, reallocate, .. } => {
                assert_eq!(to, DepthSourceKey::Default);
                assert!(reallocate);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_activity_during_cooldown_forces_reset() {
        let mut tracker = tracker();
        let key = AttachmentKey::texture(3);
        tracker.register(key, info(1920, 1080));
        tracker.observe_draw(DepthSourceKey::Attachment(key), 100);
        assert!(matches!(tracker.update((1920, 1080), 1, true), DepthUpdate::Switch { .. }));

        for _ in 0..30 {
            tracker.note_activity(1500);
            tracker.update((1920, 1080), 1, true);
        }
        assert_eq!(tracker.update((1920, 1080), 1, true), DepthUpdate::ForceReset);
        assert_eq!(tracker.current(), DepthSourceKey::Default);
    }

    #[test]
    fn test_quiet_window_does_not_reset() {
        let mut tracker = tracker();
        tracker.update((1920, 1080), 1, true);
        for i in 0..30 {
            if i % 3 == 0 {
                tracker.note_activity(10);
            }
            tracker.update((1920, 1080), 1, true);
        }
        assert_eq!(tracker.update((1920, 1080), 1, true), DepthUpdate::Keep);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut tracker = tracker();
        let key = AttachmentKey::renderbuffer(2);
        assert!(tracker.register(key, info(100, 100)));
        assert!(!tracker.register(key, info(200, 200)));
        assert_eq!(tracker.source(DepthSourceKey::Attachment(key)).map(|s| s.width), Some(100));
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_equal_scores_keep_first_key() {
        let mut tracker = tracker();
        let a = AttachmentKey::texture(1);
        let b = AttachmentKey::texture(2);
        tracker.register(b, info(1920, 1080));
        tracker.register(a, info(1920, 1080));
        tracker.observe_draw(DepthSourceKey::Attachment(a), 50);
        tracker.observe_draw(DepthSourceKey::Attachment(b), 50);
        match tracker.update((1920, 1080), 2, true) {
            DepthUpdate::Switch { to, .. } => assert_eq!(to, DepthSourceKey::Attachment(a)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_tolerance_bounds_are_exclusive() {
        assert!(within(1000, 1000, 0.05));
        assert!(within(1049, 1000, 0.05));
        assert!(!within(1051, 1000, 0.05));
        assert!(!within(949, 1000, 0.05));
        assert!(!within(0, 1000, 0.05));
    }

    proptest! {
        #[test]
        fn never_selects_mismatched_sizes(
            width in 1u32..4000,
            height in 1u32..4000,
            vertices in 1u32..1_000_000,
        ) {
            let mut tracker = tracker();
            let key = AttachmentKey::texture(7);
            tracker.register(key, info(width, height));
            tracker.observe_draw(DepthSourceKey::Attachment(key), vertices);

            let update = tracker.update((1920, 1080), 1, true);
            let fits = within(width, 1920, 0.05) && within(height, 1080, 0.05);
            if fits {
                prop_assert!(matches!(update, DepthUpdate::Switch { .. }), "expected switch, got {:?}", update);
            } else {
                prop_assert_eq!(update, DepthUpdate::Keep);
                prop_assert_eq!(tracker.current(), DepthSourceKey::Default);
            }
        }
    }
}
