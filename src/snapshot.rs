//! Frame capture for transitions.
//!
//! A transition that wants the current picture asks the [`SnapshotQueue`]
//! for a ticket. The host pumps the queue once per frame, right after the
//! primary draw and before the overlay is composited, so a capture always
//! shows a frame rendered after the request and never shows overlay layers.
//! Readback may take more than one frame on a real GPU; tickets stay pending
//! until the renderer delivers, and transitions bound that wait with a
//! timeout.
//!
//! [`FrameSnapshot`] also carries the per-pixel analysis used by the more
//! expensive strategies: a luminance mask and a before/after difference mask.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::imageops::FilterType;
use image::{GrayImage, Luma, RgbaImage};

use crate::error::SnapshotError;
use crate::render::Renderer;
use crate::transition::TransitionToken;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

fn next_image_id() -> u64 {
    NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A captured frame. The id is unique per process and keys GPU texture caches.
#[derive(Debug)]
pub struct FrameSnapshot {
    id: u64,
    image: RgbaImage,
}

impl FrameSnapshot {
    pub fn new(image: RgbaImage) -> Result<Self, SnapshotError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(SnapshotError::EmptyFrame);
        }
        Ok(Self {
            id: next_image_id(),
            image,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Per-pixel Rec. 709 luminance with a small ordered dither.
    ///
    /// The dither breaks up flat regions so a threshold sweep dissolves
    /// them as grain instead of a single hard edge.
    pub fn luminance_mask(&self) -> MaskImage {
        let (w, h) = self.image.dimensions();
        let pixels = GrayImage::from_fn(w, h, |x, y| {
            let p = self.image.get_pixel(x, y).0;
            let l = 0.2126 * p[0] as f32 + 0.7152 * p[1] as f32 + 0.0722 * p[2] as f32;
            let dither = (x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663)) % 17;
            Luma([(l + dither as f32 - 8.0).clamp(0.0, 255.0) as u8])
        });
        MaskImage::new(pixels)
    }

    /// Per-pixel difference against `after`, normalised so the largest
    /// difference maps to 255.
    ///
    /// `after` is resampled to this snapshot's size if the viewport changed
    /// between the two captures.
    pub fn difference(&self, after: &FrameSnapshot) -> MaskImage {
        let (w, h) = self.image.dimensions();
        let resized;
        let after = if after.image.dimensions() == (w, h) {
            &after.image
        } else {
            resized = image::imageops::resize(&after.image, w, h, FilterType::Triangle);
            &resized
        };

        let raw: Vec<u8> = self
            .image
            .pixels()
            .zip(after.pixels())
            .map(|(a, b)| {
                let d: u32 = (0..3).map(|c| a.0[c].abs_diff(b.0[c]) as u32).sum();
                (d / 3) as u8
            })
            .collect();

        let max = raw.iter().copied().max().unwrap_or(0);
        let scale = if max > 0 { 255.0 / max as f32 } else { 0.0 };
        let pixels = GrayImage::from_fn(w, h, |x, y| {
            let v = raw[(y * w + x) as usize] as f32 * scale;
            Luma([v.round().min(255.0) as u8])
        });
        MaskImage::new(pixels)
    }
}

/// A single-channel mask derived from one or two snapshots.
#[derive(Debug)]
pub struct MaskImage {
    id: u64,
    pixels: GrayImage,
}

impl MaskImage {
    pub fn new(pixels: GrayImage) -> Self {
        Self {
            id: next_image_id(),
            pixels,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }

    /// Mask value at `(x, y)` in `[0, 1]`.
    pub fn value(&self, x: u32, y: u32) -> f32 {
        self.pixels.get_pixel(x, y).0[0] as f32 / 255.0
    }

    pub fn mean(&self) -> f32 {
        let n = self.pixels.len().max(1) as f32;
        self.pixels.iter().map(|&v| v as f32).sum::<f32>() / n / 255.0
    }
}

/// Claim on a future frame capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotTicket(u64);

type CaptureResult = Result<Rc<FrameSnapshot>, SnapshotError>;

#[derive(Debug)]
enum TicketState {
    /// Requested; no capture issued for it yet.
    Waiting,
    /// Covered by the capture currently in flight.
    InFlight,
    Ready(CaptureResult),
}

#[derive(Debug)]
struct Ticket {
    owner: TransitionToken,
    state: TicketState,
}

/// Outstanding capture requests, fulfilled once per frame by the host.
#[derive(Debug, Default)]
pub struct SnapshotQueue {
    tickets: BTreeMap<SnapshotTicket, Ticket>,
    capture_in_flight: bool,
    next: u64,
}

impl SnapshotQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for the next rendered frame.
    pub fn request(&mut self, owner: TransitionToken) -> SnapshotTicket {
        self.next += 1;
        let ticket = SnapshotTicket(self.next);
        self.tickets.insert(
            ticket,
            Ticket {
                owner,
                state: TicketState::Waiting,
            },
        );
        ticket
    }

    /// Drive readback: collect a finished capture, then start one for any
    /// ticket still waiting. Call after the frame's primary draw.
    pub fn pump(&mut self, renderer: &mut dyn Renderer) {
        if self.capture_in_flight {
            self.collect(renderer);
        }

        let waiting = self
            .tickets
            .values()
            .any(|t| matches!(t.state, TicketState::Waiting));
        if waiting && !self.capture_in_flight {
            renderer.request_capture();
            for ticket in self.tickets.values_mut() {
                if matches!(ticket.state, TicketState::Waiting) {
                    ticket.state = TicketState::InFlight;
                }
            }
            self.capture_in_flight = true;
            self.collect(renderer);
        }
    }

    fn collect(&mut self, renderer: &mut dyn Renderer) {
        let Some(result) = renderer.poll_capture() else {
            return;
        };
        self.capture_in_flight = false;

        let result: CaptureResult = result.and_then(FrameSnapshot::new).map(Rc::new);
        match &result {
            Ok(snapshot) => log::debug!(
                "captured frame #{} ({}x{})",
                snapshot.id(),
                snapshot.dimensions().0,
                snapshot.dimensions().1
            ),
            Err(e) => log::warn!("frame capture failed: {e}"),
        }

        for ticket in self.tickets.values_mut() {
            if matches!(ticket.state, TicketState::InFlight) {
                ticket.state = TicketState::Ready(result.clone());
            }
        }
    }

    /// Take a delivered capture. `None` while it is still pending.
    pub fn take(&mut self, ticket: SnapshotTicket) -> Option<CaptureResult> {
        match self.tickets.get(&ticket) {
            Some(Ticket {
                state: TicketState::Ready(_),
                ..
            }) => match self.tickets.remove(&ticket) {
                Some(Ticket {
                    state: TicketState::Ready(result),
                    ..
                }) => Some(result),
                _ => None,
            },
            _ => None,
        }
    }

    /// Forget every ticket held by `owner`. Returns how many were dropped.
    pub fn discard_owner(&mut self, owner: TransitionToken) -> usize {
        let before = self.tickets.len();
        self.tickets.retain(|_, t| t.owner != owner);
        before - self.tickets.len()
    }

    pub fn pending(&self) -> usize {
        self.tickets
            .values()
            .filter(|t| !matches!(t.state, TicketState::Ready(_)))
            .count()
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessRenderer;
    use image::Rgba;

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> FrameSnapshot {
        FrameSnapshot::new(RgbaImage::from_pixel(w, h, Rgba([rgb[0], rgb[1], rgb[2], 255])))
            .unwrap()
    }

    #[test]
    fn empty_frames_are_rejected() {
        assert_eq!(
            FrameSnapshot::new(RgbaImage::new(0, 10)).unwrap_err(),
            SnapshotError::EmptyFrame
        );
    }

    #[test]
    fn luminance_orders_dark_below_bright() {
        let dark = solid(8, 8, [10, 10, 10]).luminance_mask();
        let bright = solid(8, 8, [240, 240, 240]).luminance_mask();
        assert!(dark.mean() < 0.1);
        assert!(bright.mean() > 0.85);
    }

    #[test]
    fn difference_is_normalised_and_resamples() {
        let before = solid(4, 4, [0, 0, 0]);
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 1, Rgba([30, 30, 30, 255]));
        let after = FrameSnapshot::new(img).unwrap();

        let diff = before.difference(&after);
        assert_eq!(diff.pixels().get_pixel(1, 1).0[0], 255);
        assert_eq!(diff.pixels().get_pixel(0, 0).0[0], 0);

        let larger = solid(8, 8, [0, 0, 0]);
        let diff = before.difference(&larger);
        assert_eq!(diff.pixels().dimensions(), (4, 4));
        assert_eq!(diff.mean(), 0.0);
    }

    #[test]
    fn tickets_resolve_after_pump() {
        let mut renderer = HeadlessRenderer::new(64, 32);
        let mut queue = SnapshotQueue::new();
        let ticket = queue.request(TransitionToken(1));
        assert!(queue.take(ticket).is_none());

        queue.pump(&mut renderer);
        let snapshot = queue.take(ticket).unwrap().unwrap();
        assert_eq!(snapshot.dimensions(), (64, 32));
        assert!(queue.is_empty());
    }

    #[test]
    fn stalled_capture_stays_pending_then_delivers() {
        let mut renderer = HeadlessRenderer::new(16, 16);
        renderer.stall_captures(true);
        let mut queue = SnapshotQueue::new();
        let ticket = queue.request(TransitionToken(1));

        queue.pump(&mut renderer);
        queue.pump(&mut renderer);
        assert!(queue.take(ticket).is_none());
        assert_eq!(queue.pending(), 1);
        assert_eq!(renderer.capture_requests(), 1);

        renderer.stall_captures(false);
        queue.pump(&mut renderer);
        assert!(queue.take(ticket).unwrap().is_ok());
    }

    #[test]
    fn discarding_an_owner_drops_its_tickets() {
        let mut queue = SnapshotQueue::new();
        queue.request(TransitionToken(1));
        queue.request(TransitionToken(1));
        let keep = queue.request(TransitionToken(2));
        assert_eq!(queue.discard_owner(TransitionToken(1)), 2);
        assert_eq!(queue.len(), 1);

        let mut renderer = HeadlessRenderer::new(8, 8);
        queue.pump(&mut renderer);
        assert!(queue.take(keep).is_some());
    }
}
