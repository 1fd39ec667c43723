// THEORY:
// The `active_zone` module is the event layer of the engine. The host places
// fixed rectangles over the frame; every update measures how much of the motion
// mask falls inside each rectangle and turns threshold crossings into discrete
// "movement started" / "movement stopped" events.
//
// Key architectural principles:
// 1.  **Edge-triggered**: a zone raises its handler only when its
//     movement-detected flag flips. Staying above (or below) the threshold for
//     many frames produces no further events.
// 2.  **Caller-owned identity**: zone ids are chosen by the host. Duplicates are
//     accepted with a warning; lookups return the first zone with the id.
// 3.  **Fill factor, not fill ratio**: the count of "on" pixels is divided by the
//     zone's pixel width plus pixel height, not its area. The sampled pixel range
//     is inclusive at both ends. Both quirks are part of the observable threshold
//     behavior installations are tuned against, so they are kept as-is.
// 4.  **State beside handler**: the handler is stored next to the zone state
//     rather than inside it, so it can be called with a shared borrow of the
//     freshly updated zone.

use crate::core_modules::blob::NormRect;
use crate::core_modules::frame_buffer::FrameBuffer;
use crate::core_modules::timestamp::Timestamp;
use log::{debug, warn};

/// Host-assigned zone identifier.
pub type ZoneId = u32;

pub const DEFAULT_FILL_THRESHOLD: f64 = 0.02;

/// Handler invoked synchronously, inside the update, when a zone flips state.
pub type ZoneHandler = Box<dyn FnMut(&ActiveZone) + Send>;

/// The observable state of one monitored rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveZone {
    pub id: ZoneId,
    pub rect: NormRect,
    /// Disabled zones are not evaluated and never report movement.
    pub enabled: bool,
    /// Whether the last evaluation found movement.
    pub movement_detected: bool,
    /// Whether `movement_detected` flipped during the last update.
    pub changed: bool,
    /// When the last flip happened.
    pub changed_at: Option<Timestamp>,
    /// On-pixel count divided by (pixel width + pixel height).
    pub fill_factor: f64,
    pub fill_threshold: f64,
}

impl ActiveZone {
    pub fn new(id: ZoneId, rect: NormRect, fill_threshold: f64) -> Self {
        Self {
            id,
            rect,
            enabled: true,
            movement_detected: false,
            changed: false,
            changed_at: None,
            fill_factor: 0.0,
            fill_threshold,
        }
    }
}

struct ZoneSlot {
    zone: ActiveZone,
    on_change: Option<ZoneHandler>,
}

/// Owns the zone set and evaluates it against the motion mask.
pub struct ActiveZoneMonitor {
    slots: Vec<ZoneSlot>,
    fill_threshold: f64,
}

impl Default for ActiveZoneMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_FILL_THRESHOLD)
    }
}

impl std::fmt::Debug for ActiveZoneMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveZoneMonitor")
            .field("zones", &self.slots.iter().map(|s| &s.zone).collect::<Vec<_>>())
            .field("fill_threshold", &self.fill_threshold)
            .finish()
    }
}

impl ActiveZoneMonitor {
    pub fn new(fill_threshold: f64) -> Self {
        Self {
            slots: Vec::new(),
            fill_threshold: fill_threshold.clamp(0.0, 1.0),
        }
    }

    /// Adds a zone whose handler runs on every state flip.
    pub fn add_zone<F>(&mut self, id: ZoneId, rect: NormRect, on_change: F)
    where
        F: FnMut(&ActiveZone) + Send + 'static,
    {
        self.push(id, rect, Some(Box::new(on_change)));
    }

    /// Adds a zone without a handler. Its state can still be polled.
    pub fn add_silent_zone(&mut self, id: ZoneId, rect: NormRect) {
        self.push(id, rect, None);
    }

    /// Adds a zone with an already boxed (optional) handler.
    pub fn add_boxed_zone(&mut self, id: ZoneId, rect: NormRect, on_change: Option<ZoneHandler>) {
        self.push(id, rect, on_change);
    }

    fn push(&mut self, id: ZoneId, rect: NormRect, on_change: Option<ZoneHandler>) {
        if self.slots.iter().any(|slot| slot.zone.id == id) {
            warn!("there are already active zones with the same id: {}", id);
        }
        self.slots.push(ZoneSlot {
            zone: ActiveZone::new(id, rect, self.fill_threshold),
            on_change,
        });
    }

    /// Removes every zone carrying `id`. Returns how many were removed.
    pub fn remove_zone(&mut self, id: ZoneId) -> usize {
        let before = self.slots.len();
        self.slots.retain(|slot| slot.zone.id != id);
        before - self.slots.len()
    }

    /// First zone with the given id.
    pub fn get_zone(&self, id: ZoneId) -> Option<&ActiveZone> {
        self.slots.iter().map(|slot| &slot.zone).find(|zone| zone.id == id)
    }

    /// Enables or disables every zone carrying `id`. Returns how many were touched.
    pub fn set_zone_enabled(&mut self, id: ZoneId, enabled: bool) -> usize {
        let mut touched = 0;
        for slot in self.slots.iter_mut().filter(|slot| slot.zone.id == id) {
            slot.zone.enabled = enabled;
            touched += 1;
        }
        touched
    }

    /// Sets the fill threshold of all current and future zones, clamped to [0, 1].
    pub fn set_fill_threshold(&mut self, threshold: f64) {
        let clamped = threshold.clamp(0.0, 1.0);
        if clamped != threshold {
            warn!("zone fill threshold {} is outside [0, 1], using {}", threshold, clamped);
        }
        self.fill_threshold = clamped;
        for slot in &mut self.slots {
            slot.zone.fill_threshold = clamped;
        }
    }

    pub fn fill_threshold(&self) -> f64 {
        self.fill_threshold
    }

    pub fn zones(&self) -> impl Iterator<Item = &ActiveZone> {
        self.slots.iter().map(|slot| &slot.zone)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Evaluates every zone against `mask`, invoking handlers for zones that
    /// flipped. Returns the number of flips.
    pub fn update(&mut self, mask: &FrameBuffer, now: Timestamp) -> usize {
        let mut transitions = 0;

        for slot in &mut self.slots {
            let zone = &mut slot.zone;
            zone.changed = false;

            if !zone.enabled {
                zone.movement_detected = false;
                continue;
            }

            zone.fill_factor = fill_factor(mask, &zone.rect);
            let detected = zone.fill_factor > zone.fill_threshold;
            if detected == zone.movement_detected {
                continue;
            }

            zone.movement_detected = detected;
            zone.changed = true;
            zone.changed_at = Some(now);
            transitions += 1;
            debug!(
                "zone {} {} (fill factor {:.4})",
                zone.id,
                if detected { "entered" } else { "cleared" },
                zone.fill_factor
            );

            if let Some(on_change) = slot.on_change.as_mut() {
                on_change(&slot.zone);
            }
        }

        transitions
    }
}

/// Pixel bounds of a normalized span: `floor(start * size)` to
/// `floor((start + len) * size)`, inclusive, clamped to the image.
fn pixel_span(start: f64, len: f64, size: u32) -> Option<(u32, u32)> {
    if size == 0 {
        return None;
    }
    let max = size as i64 - 1;
    let first = ((start * size as f64).floor() as i64).clamp(0, max);
    let last = (((start + len) * size as f64).floor() as i64).min(max);
    (last >= first).then_some((first as u32, last as u32))
}

/// On-pixel count inside the zone divided by the zone's pixel width plus pixel height.
pub fn fill_factor(mask: &FrameBuffer, rect: &NormRect) -> f64 {
    let (width, height) = mask.dimensions();
    let denominator = (rect.w * width as f64).floor() + (rect.h * height as f64).floor();
    if denominator <= 0.0 {
        return 0.0;
    }

    let (Some((x0, x1)), Some((y0, y1))) = (pixel_span(rect.x, rect.w, width), pixel_span(rect.y, rect.h, height))
    else {
        return 0.0;
    };

    let mut filled = 0usize;
    for y in y0..=y1 {
        for x in x0..=x1 {
            if mask.is_on(x, y) {
                filled += 1;
            }
        }
    }
    filled as f64 / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame_buffer::{CHANNELS, MASK_ON};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn mask_with_square(size: u32, x0: u32, y0: u32, side: u32) -> FrameBuffer {
        let mut pixels = vec![0u8; (size * size) as usize * CHANNELS];
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                let i = (y * size + x) as usize * CHANNELS;
                pixels[i..i + 3].fill(MASK_ON);
            }
        }
        FrameBuffer::from_raw(size, size, pixels).unwrap()
    }

    fn stamp(frame: u64) -> Timestamp {
        Timestamp::new(Duration::from_millis(frame), frame)
    }

    fn recorder() -> (Arc<Mutex<Vec<(ZoneId, bool)>>>, impl FnMut(&ActiveZone) + Send + 'static) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (events, move |zone: &ActiveZone| {
            sink.lock().unwrap().push((zone.id, zone.movement_detected));
        })
    }

    #[test]
    fn empty_mask_reports_nothing() {
        let mut monitor = ActiveZoneMonitor::default();
        let (events, handler) = recorder();
        monitor.add_zone(1, NormRect::new(0.0, 0.0, 0.5, 0.5), handler);

        let mask = FrameBuffer::new(100, 100);
        assert_eq!(monitor.update(&mask, stamp(1)), 0);

        let zone = monitor.get_zone(1).unwrap();
        assert_eq!(zone.fill_factor, 0.0);
        assert!(!zone.movement_detected);
        assert!(!zone.changed);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn crossing_fires_exactly_once() {
        let mut monitor = ActiveZoneMonitor::default();
        let (events, handler) = recorder();
        monitor.add_zone(7, NormRect::new(0.0, 0.0, 0.5, 0.5), handler);

        let mask = mask_with_square(100, 20, 20, 10);
        assert_eq!(monitor.update(&mask, stamp(1)), 1);
        let zone = monitor.get_zone(7).unwrap();
        assert!(zone.movement_detected);
        assert!(zone.changed);
        assert_eq!(zone.changed_at, Some(stamp(1)));
        // 100 on pixels over 50 + 50.
        assert!((zone.fill_factor - 1.0).abs() < 1e-12);

        assert_eq!(monitor.update(&mask, stamp(2)), 0);
        assert!(!monitor.get_zone(7).unwrap().changed);
        assert_eq!(*events.lock().unwrap(), vec![(7, true)]);

        let clear = FrameBuffer::new(100, 100);
        assert_eq!(monitor.update(&clear, stamp(3)), 1);
        assert_eq!(*events.lock().unwrap(), vec![(7, true), (7, false)]);
        assert_eq!(monitor.get_zone(7).unwrap().changed_at, Some(stamp(3)));
    }

    #[test]
    fn fill_factor_uses_inclusive_bounds_and_perimeter_normalization() {
        // Zone covers pixels 0..=10 in both axes; a pixel at (10, 10) still counts.
        let mask = mask_with_square(100, 10, 10, 1);
        let rect = NormRect::new(0.0, 0.0, 0.1, 0.1);
        assert!((fill_factor(&mask, &rect) - 1.0 / 20.0).abs() < 1e-12);

        // Deterministic for a fixed mask and rectangle.
        assert_eq!(fill_factor(&mask, &rect), fill_factor(&mask, &rect));

        // Zones reaching past the image are clamped instead of overflowing.
        let edge = NormRect::new(0.9, 0.9, 0.5, 0.5);
        let full = mask_with_square(100, 0, 0, 100);
        assert!((fill_factor(&full, &edge) - 100.0 / 100.0).abs() < 1e-12);

        // Degenerate zones never divide by zero.
        assert_eq!(fill_factor(&full, &NormRect::new(0.5, 0.5, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn zone_touching_the_right_edge_stays_on_its_rows() {
        // Only the first pixel of row 1 is on; a zone ending at x = 1.0 must not wrap onto it.
        let mask = mask_with_square(100, 0, 1, 1);
        let right_half = NormRect::new(0.5, 0.0, 0.5, 0.01);
        assert_eq!(fill_factor(&mask, &right_half), 0.0);

        let left_column = NormRect::new(0.0, 0.0, 0.0, 0.01);
        assert!((fill_factor(&mask, &left_column) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn disabled_zones_are_skipped_and_forced_off() {
        let mut monitor = ActiveZoneMonitor::default();
        let (events, handler) = recorder();
        monitor.add_zone(3, NormRect::new(0.0, 0.0, 0.5, 0.5), handler);
        let mask = mask_with_square(100, 10, 10, 20);
        monitor.update(&mask, stamp(1));
        assert!(monitor.get_zone(3).unwrap().movement_detected);

        assert_eq!(monitor.set_zone_enabled(3, false), 1);
        assert_eq!(monitor.update(&mask, stamp(2)), 0);
        let zone = monitor.get_zone(3).unwrap();
        assert!(!zone.movement_detected);
        assert!(!zone.changed);
        assert_eq!(events.lock().unwrap().len(), 1);

        // Re-enabling over the same mask is a fresh crossing.
        monitor.set_zone_enabled(3, true);
        assert_eq!(monitor.update(&mask, stamp(3)), 1);
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn duplicate_ids_are_kept_and_lookup_returns_the_first() {
        let mut monitor = ActiveZoneMonitor::default();
        monitor.add_silent_zone(5, NormRect::new(0.0, 0.0, 0.1, 0.1));
        monitor.add_silent_zone(5, NormRect::new(0.5, 0.5, 0.1, 0.1));
        monitor.add_silent_zone(6, NormRect::new(0.2, 0.2, 0.1, 0.1));
        assert_eq!(monitor.len(), 3);
        assert_eq!(monitor.get_zone(5).unwrap().rect.x, 0.0);

        assert_eq!(monitor.remove_zone(5), 2);
        assert_eq!(monitor.len(), 1);
        assert!(monitor.get_zone(5).is_none());
        assert_eq!(monitor.remove_zone(42), 0);
    }

    #[test]
    fn fill_threshold_is_clamped_and_applied_to_all_zones() {
        let mut monitor = ActiveZoneMonitor::default();
        monitor.add_silent_zone(1, NormRect::new(0.0, 0.0, 0.5, 0.5));
        monitor.set_fill_threshold(1.5);
        assert_eq!(monitor.fill_threshold(), 1.0);
        monitor.add_silent_zone(2, NormRect::new(0.5, 0.5, 0.5, 0.5));
        assert!(monitor.zones().all(|z| z.fill_threshold == 1.0));

        // A higher threshold means the same mask no longer triggers.
        let mask = mask_with_square(100, 10, 10, 10);
        monitor.update(&mask, stamp(1));
        assert!(!monitor.get_zone(1).unwrap().movement_detected);
    }
}
